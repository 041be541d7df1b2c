//! Event bus abstraction.
//!
//! The platform convention is a two-token dotted subject (`user.registered`,
//! `notification.sent`) carrying a JSON envelope. The bus itself is oblivious
//! to the envelope contents and guarantees no more than at-least-once
//! delivery, so every consumer must be idempotent on `event.id`.

pub mod dedup;
pub mod memory;
pub mod nats;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event envelope carried on the bus.
///
/// Immutable after publication; subscribers receive their own copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl BusEvent {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            event_type: event_type.into(),
            source: source.into(),
            timestamp: Utc::now(),
            data,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// String payload field, if present.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }
}

/// Errors surfaced by bus implementations.
#[derive(Debug)]
pub enum BusError {
    Connection(String),
    Serialization(String),
    Closed,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "Bus connection error: {msg}"),
            Self::Serialization(msg) => write!(f, "Bus serialization error: {msg}"),
            Self::Closed => write!(f, "Bus closed"),
        }
    }
}

impl std::error::Error for BusError {}

/// Handler invoked once per matching message; may run concurrently with
/// other handlers and with itself.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Logical name, used for queue groups and tracing.
    fn name(&self) -> &'static str;

    async fn handle(&self, event: BusEvent) -> anyhow::Result<()>;
}

/// Publish/subscribe contract the services depend on.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Fire-and-forget publish; does not wait for subscribers.
    async fn publish(&self, event: BusEvent) -> Result<(), BusError>;

    /// Subscribe a handler to a subject pattern. `*` matches exactly one
    /// token, so `*.*` matches any two-token subject.
    async fn subscribe(&self, pattern: &str, handler: Arc<dyn EventHandler>) -> Result<(), BusError>;

    /// Cancel every active subscription. Part of the shutdown sequence:
    /// handlers stop receiving events before the delivery queue drains.
    async fn unsubscribe_all(&self);

    /// Release the underlying transport once all consumers are gone.
    async fn close(&self) {}
}

/// Publish where failure must not affect the caller's state change: errors
/// are logged and swallowed.
pub async fn publish_best_effort(bus: &dyn EventBus, event: BusEvent) {
    let subject = event.event_type.clone();
    if let Err(e) = bus.publish(event).await {
        tracing::warn!(subject = %subject, error = %e, "Event publication failed, state remains authoritative");
    }
}

/// Subject pattern matching with single-token wildcards.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut p = pattern.split('.');
    let mut s = subject.split('.');
    loop {
        match (p.next(), s.next()) {
            (None, None) => return true,
            (Some(pt), Some(st)) => {
                if pt != "*" && pt != st {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_any_single_token() {
        assert!(subject_matches("*.*", "user.registered"));
        assert!(subject_matches("user.*", "user.deleted"));
        assert!(subject_matches("*.registered", "user.registered"));
        assert!(subject_matches("user.registered", "user.registered"));
    }

    #[test]
    fn wildcard_does_not_span_tokens() {
        assert!(!subject_matches("*.*", "user"));
        assert!(!subject_matches("*.*", "user.profile.updated"));
        assert!(!subject_matches("user.*", "payment.completed"));
        assert!(!subject_matches("user.registered", "user.deleted"));
    }

    #[test]
    fn envelope_roundtrips_through_json() {
        let event = BusEvent::new(
            "user.registered",
            "auth",
            serde_json::json!({"user_id": "u1", "email": "a@b.c"}),
        )
        .with_metadata("correlation_id", "c-1");

        let raw = serde_json::to_vec(&event).unwrap();
        let back: BusEvent = serde_json::from_slice(&raw).unwrap();

        assert_eq!(back.id, event.id);
        assert_eq!(back.event_type, "user.registered");
        assert_eq!(back.data_str("email"), Some("a@b.c"));
        assert_eq!(back.metadata.get("correlation_id").map(String::as_str), Some("c-1"));
    }
}
