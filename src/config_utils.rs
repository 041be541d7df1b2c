/// Configuration utilities for the application
use std::env;
use std::time::Duration;

#[derive(Debug)]
pub enum ConfigError {
    Missing(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "Missing environment variable: {key}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// Helper to get an environment variable or return a ConfigError
fn get_env_var(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name.to_string()))
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

pub fn get_database_url() -> Result<String, ConfigError> {
    get_env_var("DATABASE_URL")
}

pub fn get_bind_addr() -> String {
    env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
}

// ===== Event bus =====

/// NATS server URL. Empty or unset means the in-memory bus is used instead.
pub fn get_nats_url() -> Option<String> {
    env::var("NATS_URL").ok().filter(|s| !s.is_empty())
}

pub fn get_bus_queue_group() -> String {
    env::var("BUS_QUEUE_GROUP").unwrap_or_else(|_| "notifications".to_string())
}

// ===== Dispatch pipeline =====

pub fn get_scheduler_interval() -> Duration {
    Duration::from_secs(env_or("SCHEDULER_INTERVAL_SECS", 30))
}

pub fn get_delivery_workers() -> usize {
    env_or("DELIVERY_WORKERS", 8)
}

pub fn get_delivery_queue_size() -> usize {
    env_or("DELIVERY_QUEUE_SIZE", 1000)
}

pub fn get_default_max_retries() -> i32 {
    env_or("DEFAULT_MAX_RETRIES", 3)
}

pub fn get_backoff_base_secs() -> u64 {
    env_or("BACKOFF_BASE_SECS", 30)
}

pub fn get_backoff_cap_secs() -> u64 {
    env_or("BACKOFF_CAP_SECS", 3600)
}

pub fn get_provider_timeout() -> Duration {
    Duration::from_secs(env_or("PROVIDER_TIMEOUT_SECS", 30))
}

pub fn get_batch_max_recipients() -> usize {
    env_or("BATCH_MAX_RECIPIENTS", 1000)
}

/// Whether the in-app adapter publishes `notification.delivered` in addition
/// to `notification.sent` (the inbox insert is a synchronous delivery).
pub fn get_in_app_publish_delivered() -> bool {
    env_or("IN_APP_PUBLISH_DELIVERED", true)
}

// ===== Audit =====

pub fn get_dedup_cache_size() -> usize {
    env_or("DEDUP_CACHE_SIZE", 10_000)
}

pub fn get_dedup_cache_evict() -> usize {
    env_or("DEDUP_CACHE_EVICT", 5_000)
}

// ===== Channel providers =====

pub fn get_smtp_host() -> Option<String> {
    env::var("SMTP_HOST").ok().filter(|s| !s.is_empty())
}

pub fn get_smtp_port() -> u16 {
    env_or("SMTP_PORT", 587)
}

pub fn get_smtp_user() -> Option<String> {
    env::var("SMTP_USER").ok()
}

pub fn get_smtp_password() -> Option<String> {
    env::var("SMTP_PASSWORD").ok()
}

pub fn get_smtp_from() -> Option<String> {
    env::var("SMTP_FROM").ok()
}

pub fn get_push_gateway_url() -> Option<String> {
    env::var("PUSH_GATEWAY_URL").ok().filter(|s| !s.is_empty())
}

pub fn get_sms_gateway_url() -> Option<String> {
    env::var("SMS_GATEWAY_URL").ok().filter(|s| !s.is_empty())
}

pub fn get_webhook_signing_secret() -> Option<String> {
    env::var("WEBHOOK_SIGNING_SECRET").ok().filter(|s| !s.is_empty())
}

// ===== Registry =====

/// Consul agent base URL. Unset means the in-memory registry is used.
pub fn get_registry_url() -> Option<String> {
    env::var("REGISTRY_URL").ok().filter(|s| !s.is_empty())
}

pub fn get_registry_refresh_interval() -> Duration {
    Duration::from_secs(env_or("REGISTRY_REFRESH_SECS", 15))
}

pub fn get_service_name() -> String {
    env::var("SERVICE_NAME").unwrap_or_else(|_| "notification-audit".to_string())
}

// ===== Admin =====

pub fn get_admin_api_token() -> Option<String> {
    env::var("ADMIN_API_TOKEN").ok().filter(|s| !s.is_empty())
}
