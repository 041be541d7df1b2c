//! In-app notification channel
//!
//! The one local adapter: delivery is an insert into the recipient's inbox
//! rather than an external call, so a successful send *is* the delivery.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::{ChannelAdapter, ChannelError, ChannelResult, ChannelSuccess};
use crate::db::Pool;
use crate::models::{NewInAppNotification, Notification};
use crate::repository::in_app as in_app_repo;
use crate::services::notifications::types::NotificationChannel;

pub struct InAppChannel {
    pool: Pool,
}

impl InAppChannel {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelAdapter for InAppChannel {
    fn channel_type(&self) -> NotificationChannel {
        NotificationChannel::InApp
    }

    fn is_available(&self) -> bool {
        true // Local inserts need nothing beyond the store.
    }

    async fn send(&self, notification: &Notification) -> ChannelResult {
        if notification.recipient.trim().is_empty() {
            return Err(ChannelError::Fatal("in-app recipient (user id) is empty".into()));
        }

        let mut conn = self
            .pool
            .get()
            .map_err(|e| ChannelError::Retriable(format!("store unavailable: {e}")))?;

        // Action affordances ride along in the variables object.
        let action_type = notification
            .variables
            .get("action_type")
            .and_then(Value::as_str)
            .map(String::from);
        let action_url = notification
            .variables
            .get("action_url")
            .and_then(Value::as_str)
            .map(String::from);
        let action_data = notification.variables.get("action_data").cloned();

        let row = in_app_repo::create(
            &mut conn,
            NewInAppNotification {
                id: Uuid::now_v7(),
                user_id: notification.recipient.clone(),
                title: notification
                    .subject
                    .clone()
                    .unwrap_or_else(|| "Notification".to_string()),
                message: notification.content.clone(),
                kind: notification
                    .variables
                    .get("kind")
                    .and_then(Value::as_str)
                    .unwrap_or("notification")
                    .to_string(),
                category: notification
                    .variables
                    .get("category")
                    .and_then(Value::as_str)
                    .map(String::from),
                priority: notification.priority.clone(),
                action_type,
                action_url,
                action_data,
                expires_at: notification.expires_at,
            },
        )
        .map_err(|e| ChannelError::Retriable(format!("inbox insert failed: {e}")))?;

        Ok(ChannelSuccess {
            provider_id: Some(row.id.to_string()),
        })
    }
}
