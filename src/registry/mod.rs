//! Service registry (Consul-shaped) and client-side load balancing.
//!
//! Services register `(name, port, tags, metadata)` at startup, keep the
//! registration alive with TTL refreshes from a heartbeat worker, and
//! deregister on shutdown. `lookup` only returns instances with an active
//! TTL; consumers tolerate transient empty results by falling back to a
//! default endpoint.

pub mod balancer;
pub mod consul;
pub mod memory;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One healthy instance of a service as seen by the registry.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInstance {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, String>,
    /// Last TTL refresh, when the backend exposes it (used by the
    /// health-weighted balancing strategy).
    pub last_refresh: Option<DateTime<Utc>>,
}

impl ServiceInstance {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Registration request for this process.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub ttl: Duration,
}

#[derive(Debug)]
pub enum RegistryError {
    Unavailable(String),
    NotRegistered(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "Registry unavailable: {msg}"),
            Self::NotRegistered(id) => write!(f, "No registration for instance: {id}"),
        }
    }
}

impl std::error::Error for RegistryError {}

#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Register an instance; returns the instance id used for refreshes.
    async fn register(&self, registration: &Registration) -> Result<String, RegistryError>;

    /// Refresh the TTL for a previously registered instance.
    async fn refresh(&self, instance_id: &str) -> Result<(), RegistryError>;

    async fn deregister(&self, instance_id: &str) -> Result<(), RegistryError>;

    /// Healthy (active-TTL) instances of a service.
    async fn lookup(&self, service_name: &str) -> Result<Vec<ServiceInstance>, RegistryError>;
}

/// Lookup that degrades to a static fallback endpoint when the registry is
/// unreachable or has no healthy instances.
pub async fn lookup_with_fallback(
    registry: &dyn ServiceRegistry,
    service_name: &str,
    fallback_url: &str,
) -> Vec<ServiceInstance> {
    match registry.lookup(service_name).await {
        Ok(instances) if !instances.is_empty() => instances,
        Ok(_) => {
            tracing::debug!(service = service_name, "No healthy instances, using fallback endpoint");
            vec![fallback_instance(service_name, fallback_url)]
        }
        Err(e) => {
            tracing::warn!(service = service_name, error = %e, "Registry lookup failed, using fallback endpoint");
            vec![fallback_instance(service_name, fallback_url)]
        }
    }
}

fn fallback_instance(service_name: &str, url: &str) -> ServiceInstance {
    let parsed = url::Url::parse(url).ok();
    let host = parsed
        .as_ref()
        .and_then(|u| u.host_str().map(String::from))
        .unwrap_or_else(|| url.to_string());
    let port = parsed.as_ref().and_then(|u| u.port_or_known_default()).unwrap_or(80);

    ServiceInstance {
        id: format!("{service_name}-fallback"),
        name: service_name.to_string(),
        host,
        port,
        tags: vec!["fallback".to_string()],
        metadata: HashMap::new(),
        last_refresh: None,
    }
}

/// Keep a registration alive by refreshing its TTL on an interval. Runs
/// until the process exits; missed refreshes are logged and retried on the
/// next tick.
pub fn spawn_heartbeat(
    registry: Arc<dyn ServiceRegistry>,
    instance_id: String,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        tracing::info!(instance_id = %instance_id, "Registry heartbeat started");

        loop {
            ticker.tick().await;
            if let Err(e) = registry.refresh(&instance_id).await {
                tracing::warn!(instance_id = %instance_id, error = %e, "Registry TTL refresh failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_instance_parses_url() {
        let instance = fallback_instance("push-gateway", "http://push.internal:9100");
        assert_eq!(instance.host, "push.internal");
        assert_eq!(instance.port, 9100);
        assert_eq!(instance.base_url(), "http://push.internal:9100");
    }

    #[test]
    fn fallback_instance_defaults_port() {
        let instance = fallback_instance("sms-gateway", "http://sms.internal");
        assert_eq!(instance.port, 80);
    }
}
