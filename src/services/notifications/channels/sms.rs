//! SMS notification channel
//!
//! Same shape as the push adapter: an external SMS gateway discovered via
//! the registry, with the configured URL as fallback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{gateway_outcome, ChannelAdapter, ChannelError, ChannelResult};
use crate::config_utils;
use crate::models::Notification;
use crate::registry::balancer::{BalanceStrategy, LoadBalancer};
use crate::registry::{lookup_with_fallback, ServiceRegistry};
use crate::services::notifications::types::NotificationChannel;

const GATEWAY_SERVICE: &str = "sms-gateway";

pub struct SmsChannel {
    client: Client,
    gateway_url: Option<String>,
    registry: Arc<dyn ServiceRegistry>,
    balancer: LoadBalancer,
}

impl SmsChannel {
    pub fn new(timeout: Duration, gateway_url: Option<String>, registry: Arc<dyn ServiceRegistry>) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("notification-pipeline/1.0")
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            gateway_url,
            registry,
            balancer: LoadBalancer::new(BalanceStrategy::RoundRobin),
        }
    }

    pub fn from_env(registry: Arc<dyn ServiceRegistry>) -> Self {
        Self::new(
            config_utils::get_provider_timeout(),
            config_utils::get_sms_gateway_url(),
            registry,
        )
    }
}

#[async_trait]
impl ChannelAdapter for SmsChannel {
    fn channel_type(&self) -> NotificationChannel {
        NotificationChannel::Sms
    }

    fn is_available(&self) -> bool {
        self.gateway_url.is_some()
    }

    async fn send(&self, notification: &Notification) -> ChannelResult {
        let fallback = self
            .gateway_url
            .as_deref()
            .ok_or_else(|| ChannelError::Retriable("SMS gateway not configured".into()))?;

        let msisdn = notification.recipient.trim();
        if msisdn.is_empty() || !msisdn.chars().all(|c| c.is_ascii_digit() || c == '+') {
            return Err(ChannelError::Fatal(format!("invalid SMS recipient: {msisdn:?}")));
        }

        let instances = lookup_with_fallback(self.registry.as_ref(), GATEWAY_SERVICE, fallback).await;
        let instance = self
            .balancer
            .pick(&instances)
            .ok_or_else(|| ChannelError::Retriable("no SMS gateway instance".into()))?;

        let response = self
            .client
            .post(format!("{}/send", instance.base_url()))
            .json(&serde_json::json!({
                "to": msisdn,
                "message": notification.content,
            }))
            .send()
            .await
            .map_err(|e| ChannelError::Retriable(format!("SMS gateway request failed: {e}")))?;

        gateway_outcome(response).await
    }
}
