//! Lifecycle event payloads published by the delivery engine.
//!
//! All of these are best-effort: a publish failure never rolls back the
//! state change that produced it.

use crate::bus::BusEvent;
use crate::models::{Notification, NotificationBatch};

const SOURCE: &str = "notification-service";

pub fn sent(notification: &Notification) -> BusEvent {
    BusEvent::new(
        "notification.sent",
        SOURCE,
        serde_json::json!({
            "id": notification.id,
            "type": notification.kind,
            "recipient": notification.recipient,
            "status": "sent",
            "priority": notification.priority,
        }),
    )
}

pub fn failed(notification: &Notification, error: &str) -> BusEvent {
    BusEvent::new(
        "notification.failed",
        SOURCE,
        serde_json::json!({
            "id": notification.id,
            "type": notification.kind,
            "recipient": notification.recipient,
            "error": error,
        }),
    )
}

pub fn delivered(notification: &Notification) -> BusEvent {
    BusEvent::new(
        "notification.delivered",
        SOURCE,
        serde_json::json!({
            "id": notification.id,
            "type": notification.kind,
            "recipient": notification.recipient,
        }),
    )
}

pub fn clicked(notification: &Notification, user_id: &str) -> BusEvent {
    BusEvent::new(
        "notification.clicked",
        SOURCE,
        serde_json::json!({
            "id": notification.id,
            "user_id": user_id,
        }),
    )
}

pub fn batch_completed(batch: &NotificationBatch) -> BusEvent {
    BusEvent::new(
        "notification.batch_completed",
        SOURCE,
        serde_json::json!({
            "batch_id": batch.id,
            "sent": batch.sent,
            "failed": batch.failed,
        }),
    )
}
