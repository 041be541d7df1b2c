//! Domain-event triggers
//!
//! The notification service subscribes to an enumerated list of domain
//! subjects (deliberately not `*.*` — the handler surface grows with
//! product intent, not bus traffic) and synthesizes notifications from
//! them. Handlers are idempotent per `event.id` to tolerate at-least-once
//! delivery.

use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::dedup::DedupCache;
use crate::bus::{BusEvent, EventBus, EventHandler};
use crate::models::SendNotificationRequest;

use super::service::NotificationService;

/// Subjects the engine reacts to.
pub const TRIGGER_SUBJECTS: &[&str] = &[
    "user.registered",
    "user.logged_in",
    "payment.completed",
    "file.shared",
    "file.uploaded",
    "order.created",
    "task.assigned",
    "invitation.created",
    "wallet.balance_low",
    "organization.member_added",
    "device.offline",
];

pub struct NotificationTriggers {
    service: Arc<NotificationService>,
    dedup: DedupCache,
}

impl NotificationTriggers {
    pub fn new(service: Arc<NotificationService>, dedup: DedupCache) -> Self {
        Self { service, dedup }
    }

    /// Subscribe the trigger handler to every subject it reacts to.
    pub async fn register(bus: &dyn EventBus, handler: Arc<Self>) -> Result<(), crate::bus::BusError> {
        for subject in TRIGGER_SUBJECTS {
            bus.subscribe(subject, handler.clone()).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for NotificationTriggers {
    fn name(&self) -> &'static str {
        "notification-triggers"
    }

    async fn handle(&self, event: BusEvent) -> anyhow::Result<()> {
        // At-least-once delivery: replays of an already-processed event are
        // dropped here.
        if !self.dedup.insert(&event.id) {
            tracing::debug!(event_id = %event.id, "Duplicate trigger event dropped");
            return Ok(());
        }

        for request in requests_for(&event) {
            // Admission failures for synthesized notifications are logged,
            // never propagated back into the bus loop.
            if let Err(e) = self.service.send(request).await {
                tracing::warn!(
                    subject = %event.event_type,
                    event_id = %event.id,
                    error = %e,
                    "Failed to admit triggered notification"
                );
            }
        }

        Ok(())
    }
}

fn email_request(recipient: &str, subject: String, content: String) -> SendNotificationRequest {
    SendNotificationRequest {
        kind: "email".to_string(),
        recipient: recipient.to_string(),
        priority: None,
        template_id: None,
        subject: Some(subject),
        content: Some(content),
        variables: None,
        scheduled_at: None,
        expires_at: None,
        max_retries: None,
        batch_id: None,
    }
}

fn in_app_request(
    user_id: &str,
    subject: String,
    content: String,
    priority: Option<&str>,
) -> SendNotificationRequest {
    SendNotificationRequest {
        kind: "in_app".to_string(),
        recipient: user_id.to_string(),
        priority: priority.map(String::from),
        template_id: None,
        subject: Some(subject),
        content: Some(content),
        variables: None,
        scheduled_at: None,
        expires_at: None,
        max_retries: None,
        batch_id: None,
    }
}

/// Map one domain event to the notifications it produces. Events missing
/// the fields a mapping needs simply produce fewer (or no) notifications.
pub fn requests_for(event: &BusEvent) -> Vec<SendNotificationRequest> {
    let user = event.data_str("user_id");
    let email = event.data_str("email");
    let mut requests = Vec::new();

    match event.event_type.as_str() {
        "user.registered" => {
            if let Some(email) = email {
                requests.push(email_request(
                    email,
                    "Welcome!".to_string(),
                    "Your account is ready. Welcome aboard!".to_string(),
                ));
            }
        }
        "user.logged_in" => {
            if let Some(user) = user {
                requests.push(in_app_request(
                    user,
                    "Welcome back".to_string(),
                    "Good to see you again.".to_string(),
                    None,
                ));
            }
        }
        "payment.completed" => {
            let amount = event
                .data
                .get("amount")
                .map(|v| v.to_string())
                .unwrap_or_else(|| "your payment".to_string());
            if let Some(email) = email {
                requests.push(email_request(
                    email,
                    "Payment receipt".to_string(),
                    format!("We received {amount}. Thank you!"),
                ));
            }
            if let Some(user) = user {
                requests.push(in_app_request(
                    user,
                    "Payment completed".to_string(),
                    format!("Payment of {amount} completed."),
                    None,
                ));
            }
        }
        "file.shared" => {
            let file = event.data_str("file_name").unwrap_or("a file");
            let by = event.data_str("shared_by").unwrap_or("Someone");
            if let Some(target) = event.data_str("shared_with").or(user) {
                requests.push(in_app_request(
                    target,
                    "File shared with you".to_string(),
                    format!("{by} shared {file} with you."),
                    None,
                ));
            }
            if let Some(email) = email {
                requests.push(email_request(
                    email,
                    format!("{by} shared {file} with you"),
                    format!("{by} shared {file} with you. Sign in to view it."),
                ));
            }
        }
        "file.uploaded" => {
            let file = event.data_str("file_name").unwrap_or("your file");
            if let Some(user) = user {
                requests.push(in_app_request(
                    user,
                    "Upload complete".to_string(),
                    format!("{file} uploaded successfully."),
                    None,
                ));
            }
        }
        "order.created" => {
            let order = event.data_str("order_id").unwrap_or("your order");
            if let Some(email) = email {
                requests.push(email_request(
                    email,
                    "Order confirmation".to_string(),
                    format!("Order {order} has been placed."),
                ));
            }
        }
        "task.assigned" => {
            let task = event.data_str("task_title").unwrap_or("a task");
            if let Some(assignee) = event.data_str("assignee_id").or(user) {
                requests.push(in_app_request(
                    assignee,
                    "Task assigned".to_string(),
                    format!("You have been assigned: {task}"),
                    None,
                ));
            }
        }
        "invitation.created" => {
            let org = event.data_str("organization_name").unwrap_or("an organization");
            if let Some(email) = email {
                requests.push(email_request(
                    email,
                    format!("You're invited to join {org}"),
                    format!("You have been invited to join {org}. Accept the invitation to get started."),
                ));
            }
        }
        "wallet.balance_low" => {
            let balance = event
                .data
                .get("balance")
                .map(|v| v.to_string())
                .unwrap_or_else(|| "low".to_string());
            if let Some(user) = user {
                requests.push(in_app_request(
                    user,
                    "Balance low".to_string(),
                    format!("Your wallet balance is {balance}. Top up to avoid interruptions."),
                    Some("high"),
                ));
            }
        }
        "organization.member_added" => {
            let org = event.data_str("organization_name").unwrap_or("an organization");
            if let Some(member) = event.data_str("member_id").or(user) {
                requests.push(in_app_request(
                    member,
                    "Added to organization".to_string(),
                    format!("You are now a member of {org}."),
                    None,
                ));
            }
        }
        "device.offline" => {
            let device = event.data_str("device_name").unwrap_or("A device");
            if let Some(user) = user {
                requests.push(in_app_request(
                    user,
                    "Device offline".to_string(),
                    format!("{device} went offline."),
                    Some("high"),
                ));
            }
        }
        other => {
            tracing::debug!(subject = other, "No trigger mapping for subject");
        }
    }

    requests
}
