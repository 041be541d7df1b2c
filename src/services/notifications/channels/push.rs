//! Push notification channel
//!
//! Hands the notification to an external push gateway (the provider-facing
//! relay for FCM/APNs/Web Push). Gateway instances are discovered through
//! the service registry with the configured URL as fallback; requests are
//! load-balanced across healthy instances.

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

const GATEWAY_SERVICE: &str = "push-gateway";

pub struct PushChannel {
    client: Client,
    gateway_url: Option<String>,
    registry: Arc<dyn ServiceRegistry>,
    balancer: LoadBalancer,
}

impl PushChannel {
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
            config_utils::get_push_gateway_url(),
            registry,
        )
    }
}

#[async_trait]
impl ChannelAdapter for PushChannel {
    fn channel_type(&self) -> NotificationChannel {
        NotificationChannel::Push
    }

    fn is_available(&self) -> bool {
        self.gateway_url.is_some()
    }

    async fn send(&self, notification: &Notification) -> ChannelResult {
        let fallback = self
            .gateway_url
            .as_deref()
            .ok_or_else(|| ChannelError::Retriable("push gateway not configured".into()))?;

        if notification.recipient.trim().is_empty() {
            return Err(ChannelError::Fatal("push recipient (device token) is empty".into()));
        }

        let instances = lookup_with_fallback(self.registry.as_ref(), GATEWAY_SERVICE, fallback).await;
        let instance = self
            .balancer
            .pick(&instances)
            .ok_or_else(|| ChannelError::Retriable("no push gateway instance".into()))?;

        let response = self
            .client
            .post(format!("{}/send", instance.base_url()))
            .json(&serde_json::json!({
                "recipient": notification.recipient,
                "title": notification.subject,
                "body": notification.content,
                "priority": notification.priority,
                "data": notification.variables,
            }))
            .send()
            .await
            .map_err(|e| ChannelError::Retriable(format!("push gateway request failed: {e}")))?;

        gateway_outcome(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::memory::MemoryRegistry;
    use crate::test_helpers::TestFixtures;

    #[tokio::test]
    async fn unconfigured_gateway_is_retriable() {
        let registry: Arc<dyn ServiceRegistry> = Arc::new(MemoryRegistry::new());
        let channel = PushChannel::new(Duration::from_secs(1), None, registry);
        assert!(!channel.is_available());

        let notification = TestFixtures::notification_value("push", "device-token-1");
        assert!(matches!(channel.send(&notification).await, Err(ChannelError::Retriable(_))));
    }

    #[tokio::test]
    async fn empty_device_token_is_fatal() {
        let registry: Arc<dyn ServiceRegistry> = Arc::new(MemoryRegistry::new());
        let channel = PushChannel::new(
            Duration::from_secs(1),
            Some("http://127.0.0.1:1".into()),
            registry,
        );

        let notification = TestFixtures::notification_value("push", "  ");
        assert!(matches!(channel.send(&notification).await, Err(ChannelError::Fatal(_))));
    }
}
