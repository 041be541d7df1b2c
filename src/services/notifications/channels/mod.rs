//! Notification delivery channels
//!
//! One adapter per channel variant behind a common trait. Adapters are
//! black-box senders: they either succeed (optionally with a provider-side
//! id) or fail retriably (transient provider/network trouble) or fatally
//! (the notification can never be delivered as addressed).

pub mod email;
pub mod in_app;
pub mod push;
pub mod sms;
pub mod webhook;

use std::fmt;

use async_trait::async_trait;

use crate::models::Notification;

use super::types::NotificationChannel;

pub type ChannelResult = Result<ChannelSuccess, ChannelError>;

/// Successful adapter call.
#[derive(Debug, Clone)]
pub struct ChannelSuccess {
    /// Provider-assigned id, when the transport reports one.
    pub provider_id: Option<String>,
}

/// Errors that can occur during channel delivery
#[derive(Debug)]
pub enum ChannelError {
    /// Transient failure; the pipeline reschedules with backoff.
    Retriable(String),
    /// Permanent rejection; the notification moves to `failed`.
    Fatal(String),
}

impl ChannelError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Retriable(_))
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retriable(msg) => write!(f, "Retriable delivery error: {msg}"),
            Self::Fatal(msg) => write!(f, "Fatal delivery error: {msg}"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Trait for notification delivery channels
///
/// Implementing this trait allows adding new delivery channels without
/// modifying the dispatch pipeline.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Returns the channel type this implementation handles
    fn channel_type(&self) -> NotificationChannel;

    /// Check if channel is configured/available
    fn is_available(&self) -> bool;

    /// Deliver a single notification
    async fn send(&self, notification: &Notification) -> ChannelResult;
}

/// Map an HTTP response from an external gateway to a channel outcome:
/// 2xx succeeds, 4xx is a permanent rejection, everything else retries.
pub(crate) async fn gateway_outcome(response: reqwest::Response) -> ChannelResult {
    let status = response.status();

    if status.is_success() {
        let provider_id = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| body.get("id").and_then(|v| v.as_str()).map(String::from));
        return Ok(ChannelSuccess { provider_id });
    }

    let body = response.text().await.unwrap_or_default();
    if status.is_client_error() {
        Err(ChannelError::Fatal(format!("gateway rejected request ({status}): {body}")))
    } else {
        Err(ChannelError::Retriable(format!("gateway error ({status}): {body}")))
    }
}
