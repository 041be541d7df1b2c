//! Webhook notification channel
//!
//! POSTs a JSON envelope to the recipient URL with an HMAC-SHA256 signature
//! so receivers can authenticate the payload.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use ring::hmac;

use super::{gateway_outcome, ChannelAdapter, ChannelError, ChannelResult};
use crate::config_utils;
use crate::models::Notification;
use crate::services::notifications::types::NotificationChannel;

pub struct WebhookChannel {
    client: Client,
    signing_secret: Option<String>,
}

impl WebhookChannel {
    pub fn new(timeout: Duration, signing_secret: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("notification-pipeline/1.0")
            .build()
            .expect("Failed to build HTTP client");

        Self { client, signing_secret }
    }

    pub fn from_env() -> Self {
        Self::new(
            config_utils::get_provider_timeout(),
            config_utils::get_webhook_signing_secret(),
        )
    }
}

/// `X-Signature` header value: an HMAC-SHA256 digest of the request body
/// under the deployment-wide secret, hex-encoded with a scheme prefix.
fn signature_header(secret: &str, body: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let digest = hmac::sign(&key, body.as_bytes());
    format!("sha256={}", hex::encode(digest.as_ref()))
}

/// Receiver-side check for an `X-Signature` header; the comparison is
/// constant-time so the header leaks nothing about the expected digest.
pub fn signature_matches(secret: &str, body: &str, header: &str) -> bool {
    let expected = signature_header(secret, body);
    ring::constant_time::verify_slices_are_equal(header.as_bytes(), expected.as_bytes()).is_ok()
}

#[async_trait]
impl ChannelAdapter for WebhookChannel {
    fn channel_type(&self) -> NotificationChannel {
        NotificationChannel::Webhook
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn send(&self, notification: &Notification) -> ChannelResult {
        let target = url::Url::parse(&notification.recipient)
            .map_err(|e| ChannelError::Fatal(format!("invalid webhook URL: {e}")))?;
        if !matches!(target.scheme(), "http" | "https") {
            return Err(ChannelError::Fatal(format!(
                "unsupported webhook scheme: {}",
                target.scheme()
            )));
        }

        let payload = serde_json::json!({
            "id": notification.id,
            "event_type": "notification.webhook",
            "timestamp": Utc::now(),
            "data": {
                "subject": notification.subject,
                "content": notification.content,
                "variables": notification.variables,
            },
        });
        let body = serde_json::to_string(&payload)
            .map_err(|e| ChannelError::Fatal(format!("payload serialization failed: {e}")))?;

        let mut request = self
            .client
            .post(target)
            .header("Content-Type", "application/json")
            .header("X-Delivery", notification.id.to_string());

        if let Some(secret) = &self.signing_secret {
            request = request.header("X-Signature", signature_header(secret, &body));
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| ChannelError::Retriable(format!("webhook request failed: {e}")))?;

        gateway_outcome(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::TestFixtures;

    #[test]
    fn signature_header_roundtrips_through_verification() {
        let secret = "hook-9f2c-rotate-quarterly";
        let body = r#"{"id":"0192f3","event_type":"notification.webhook","data":{"subject":"Low balance"}}"#;

        let header = signature_header(secret, body);
        assert!(header.starts_with("sha256="));
        assert_eq!(header.len(), "sha256=".len() + 64);
        assert!(signature_matches(secret, body, &header));
    }

    #[test]
    fn tampered_body_or_wrong_secret_fails_verification() {
        let secret = "hook-9f2c-rotate-quarterly";
        let body = r#"{"id":"0192f3","data":{}}"#;
        let header = signature_header(secret, body);

        assert!(!signature_matches(secret, r#"{"id":"0192f4","data":{}}"#, &header));
        assert!(!signature_matches("a-different-deployment", body, &header));
        assert!(!signature_matches(secret, body, "sha256=deadbeef"));
    }

    #[tokio::test]
    async fn malformed_recipient_url_is_fatal() {
        let channel = WebhookChannel::new(Duration::from_secs(1), None);
        let notification = TestFixtures::notification_value("webhook", "not a url");

        let result = channel.send(&notification).await;
        assert!(matches!(result, Err(ChannelError::Fatal(_))));
    }

    #[tokio::test]
    async fn non_http_scheme_is_fatal() {
        let channel = WebhookChannel::new(Duration::from_secs(1), None);
        let notification = TestFixtures::notification_value("webhook", "ftp://example.com/hook");

        let result = channel.send(&notification).await;
        assert!(matches!(result, Err(ChannelError::Fatal(_))));
    }
}
