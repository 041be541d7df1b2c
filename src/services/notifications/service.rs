//! Core notification service
//!
//! The admission surface of the delivery engine: validates and persists
//! notification requests, expands batches, manages templates, push
//! subscriptions and the in-app inbox, and serves stats. Dispatch itself is
//! the scheduler/worker pipeline in `dispatch`.

use std::sync::Arc;

use chrono::Utc;
use diesel::Connection;
use uuid::Uuid;

use crate::bus::{publish_best_effort, EventBus};
use crate::config_utils;
use crate::db::Pool;
use crate::models::{
    BatchAdmissionResponse, BatchRowResult, CreateTemplateRequest, NewNotification,
    NewNotificationBatch, NewNotificationTemplate, NewPushSubscription, Notification,
    NotificationBatch, NotificationStats, NotificationTemplate, PushSubscription,
    RegisterPushSubscriptionRequest, SendBatchRequest, SendNotificationRequest,
};
use crate::repository::{
    batches as batch_repo, in_app as in_app_repo, notifications as notification_repo,
    push_subscriptions as push_repo, templates as template_repo,
};
use crate::services::ServiceError;

use super::events;
use super::render;
use super::types::{NotificationChannel, NotificationPriority, NotificationStatus, PushPlatform, StatsPeriod};

/// Tolerated clock skew when validating `scheduled_at` against now.
const SCHEDULE_SKEW_SECS: i64 = 5;

pub struct NotificationService {
    pool: Pool,
    bus: Arc<dyn EventBus>,
    default_max_retries: i32,
    batch_max_recipients: usize,
}

/// Rendered bodies for one notification, computed at admission so retries
/// stay deterministic even if the template mutates later.
struct RenderedContent {
    subject: Option<String>,
    content: String,
    html_content: Option<String>,
}

impl NotificationService {
    pub fn new(pool: Pool, bus: Arc<dyn EventBus>) -> Self {
        Self {
            pool,
            bus,
            default_max_retries: config_utils::get_default_max_retries(),
            batch_max_recipients: config_utils::get_batch_max_recipients(),
        }
    }

    // ===== Admission =====

    /// Admit one notification; at most one row is persisted.
    pub async fn send(&self, request: SendNotificationRequest) -> Result<Notification, ServiceError> {
        let channel = parse_channel(&request.kind)?;
        let priority = parse_priority(request.priority.as_deref())?;
        validate_recipient(channel, &request.recipient)?;

        let now = Utc::now();
        let scheduled_at = request.scheduled_at.map(|at| at.naive_utc());
        if let Some(at) = scheduled_at {
            if at < (now - chrono::Duration::seconds(SCHEDULE_SKEW_SECS)).naive_utc() {
                return Err(ServiceError::Validation(
                    "scheduled_at must not be in the past".to_string(),
                ));
            }
        }
        let expires_at = request.expires_at.map(|at| at.naive_utc());
        if let Some(expires) = expires_at {
            let reference = scheduled_at.unwrap_or_else(|| now.naive_utc());
            if expires <= reference {
                return Err(ServiceError::Validation(
                    "expires_at must be after the scheduled send time".to_string(),
                ));
            }
        }

        let max_retries = request.max_retries.unwrap_or(self.default_max_retries);
        if max_retries < 0 {
            return Err(ServiceError::Validation("max_retries must be >= 0".to_string()));
        }

        let variables = request.variables.clone().unwrap_or_else(|| serde_json::json!({}));

        let mut conn = self.pool.get()?;
        let rendered = self.resolve_content(&mut conn, &request, channel, &variables)?;

        let row = notification_repo::create(
            &mut conn,
            NewNotification {
                id: Uuid::now_v7(),
                kind: channel.as_str().to_string(),
                priority: priority.as_str().to_string(),
                recipient: request.recipient.trim().to_string(),
                template_id: request.template_id,
                subject: rendered.subject,
                content: rendered.content,
                html_content: rendered.html_content,
                variables,
                status: NotificationStatus::Pending.as_str().to_string(),
                scheduled_at,
                expires_at,
                max_retries,
                batch_id: request.batch_id,
            },
        )?;

        tracing::info!(
            notification_id = %row.id,
            channel = %row.kind,
            priority = %row.priority,
            "Notification admitted"
        );
        Ok(row)
    }

    /// Expand a batch into one notification per recipient. Row-level
    /// validation failures are recorded per recipient and never block the
    /// rest; the batch row and all admitted notifications commit together.
    pub async fn send_batch(&self, request: SendBatchRequest) -> Result<BatchAdmissionResponse, ServiceError> {
        let channel = parse_channel(&request.kind)?;
        let priority = parse_priority(request.priority.as_deref())?;

        if request.recipients.is_empty() {
            return Err(ServiceError::Validation("batch requires at least one recipient".to_string()));
        }
        if request.recipients.len() > self.batch_max_recipients {
            return Err(ServiceError::Validation(format!(
                "batch exceeds {} recipients",
                self.batch_max_recipients
            )));
        }

        let scheduled_at = request.scheduled_at.map(|at| at.naive_utc());
        let mut conn = self.pool.get()?;

        let template = template_repo::get(&mut conn, request.template_id)
            .map_err(|_| ServiceError::NotFound(format!("template {} not found", request.template_id)))?;

        let total = request.recipients.len() as i32;
        let (batch, results, admitted, failed) = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                let batch = batch_repo::create(
                    conn,
                    NewNotificationBatch {
                        id: Uuid::now_v7(),
                        template_id: Some(template.id),
                        kind: channel.as_str().to_string(),
                        total,
                        status: batch_repo::STATUS_PENDING.to_string(),
                        scheduled_at,
                    },
                )?;

                let mut results = Vec::with_capacity(request.recipients.len());
                let mut admitted = 0;
                let mut failed = 0;

                for recipient in &request.recipients {
                    let variables = recipient.variables.clone().unwrap_or_else(|| serde_json::json!({}));

                    if let Err(e) = validate_recipient(channel, &recipient.recipient) {
                        failed += 1;
                        results.push(BatchRowResult {
                            recipient: recipient.recipient.clone(),
                            success: false,
                            notification_id: None,
                            error: Some(e.to_string()),
                        });
                        continue;
                    }

                    let row = notification_repo::create(
                        conn,
                        NewNotification {
                            id: Uuid::now_v7(),
                            kind: channel.as_str().to_string(),
                            priority: priority.as_str().to_string(),
                            recipient: recipient.recipient.trim().to_string(),
                            template_id: Some(template.id),
                            subject: template.subject.as_deref().map(|s| render::render(s, &variables)),
                            content: render::render(&template.content, &variables),
                            html_content: template
                                .html_content
                                .as_deref()
                                .map(|h| render::render(h, &variables)),
                            variables,
                            status: NotificationStatus::Pending.as_str().to_string(),
                            scheduled_at,
                            expires_at: None,
                            max_retries: self.default_max_retries,
                            batch_id: Some(batch.id),
                        },
                    )?;

                    admitted += 1;
                    results.push(BatchRowResult {
                        recipient: recipient.recipient.clone(),
                        success: true,
                        notification_id: Some(row.id),
                        error: None,
                    });
                }

                // Admission failures count as terminal rows immediately.
                if failed > 0 {
                    batch_repo::add_failed(conn, batch.id, failed)?;
                }

                Ok((batch, results, admitted, failed))
            })
            .map_err(ServiceError::from)?;

        // An all-invalid batch is already complete.
        if let Some(completed) = batch_repo::try_complete(&mut conn, batch.id)? {
            publish_best_effort(self.bus.as_ref(), events::batch_completed(&completed)).await;
        }

        tracing::info!(batch_id = %batch.id, total, admitted, failed, "Batch admitted");
        Ok(BatchAdmissionResponse {
            batch_id: batch.id,
            total,
            admitted,
            failed,
            results,
        })
    }

    fn resolve_content(
        &self,
        conn: &mut crate::db::DbConnection,
        request: &SendNotificationRequest,
        channel: NotificationChannel,
        variables: &serde_json::Value,
    ) -> Result<RenderedContent, ServiceError> {
        if let Some(template_id) = request.template_id {
            let template = template_repo::get(conn, template_id)
                .map_err(|_| ServiceError::NotFound(format!("template {template_id} not found")))?;

            if template.kind != channel.as_str() {
                return Err(ServiceError::Validation(format!(
                    "template {} is for channel {}, not {}",
                    template_id,
                    template.kind,
                    channel.as_str()
                )));
            }

            return Ok(RenderedContent {
                subject: request
                    .subject
                    .clone()
                    .or(template.subject.clone())
                    .map(|s| render::render(&s, variables)),
                content: render::render(&template.content, variables),
                html_content: template.html_content.as_deref().map(|h| render::render(h, variables)),
            });
        }

        let content = request
            .content
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                ServiceError::Validation("content or template_id is required".to_string())
            })?;

        Ok(RenderedContent {
            subject: request.subject.as_deref().map(|s| render::render(s, variables)),
            content: render::render(content, variables),
            html_content: None,
        })
    }

    // ===== Lifecycle callbacks =====

    pub async fn get_notification(&self, id: Uuid) -> Result<Notification, ServiceError> {
        let mut conn = self.pool.get()?;
        notification_repo::get(&mut conn, id)
            .map_err(|_| ServiceError::NotFound(format!("notification {id} not found")))
    }

    /// Explicit cancellation; only `pending` rows can be cancelled.
    pub async fn cancel(&self, id: Uuid) -> Result<Notification, ServiceError> {
        let mut conn = self.pool.get()?;
        if notification_repo::cancel(&mut conn, id)? {
            return Ok(notification_repo::get(&mut conn, id)?);
        }

        // Distinguish "unknown id" from "wrong state".
        match notification_repo::get(&mut conn, id) {
            Ok(row) => Err(ServiceError::Validation(format!(
                "only pending notifications can be cancelled (status is {})",
                row.status
            ))),
            Err(_) => Err(ServiceError::NotFound(format!("notification {id} not found"))),
        }
    }

    /// Delivery receipt from a provider: `sent -> delivered`.
    pub async fn confirm_delivered(&self, id: Uuid) -> Result<Notification, ServiceError> {
        let (transitioned, row) = {
            let mut conn = self.pool.get()?;
            let transitioned = notification_repo::mark_delivered(&mut conn, id)?;
            let row = notification_repo::get(&mut conn, id)
                .map_err(|_| ServiceError::NotFound(format!("notification {id} not found")))?;
            (transitioned, row)
        };

        if transitioned {
            publish_best_effort(self.bus.as_ref(), events::delivered(&row)).await;
            if let Some(batch_id) = row.batch_id {
                let mut conn = self.pool.get()?;
                batch_repo::increment_delivered(&mut conn, batch_id)?;
            }
            Ok(row)
        } else if row.status == NotificationStatus::Delivered.as_str() {
            // Receipt replays are fine; the state is already terminal.
            Ok(row)
        } else {
            Err(ServiceError::Validation(format!(
                "delivery receipt requires status sent (status is {})",
                row.status
            )))
        }
    }

    /// User interaction callback; publishes `notification.clicked`.
    pub async fn record_click(&self, id: Uuid, user_id: &str) -> Result<(), ServiceError> {
        let row = self.get_notification(id).await?;
        publish_best_effort(self.bus.as_ref(), events::clicked(&row, user_id)).await;
        Ok(())
    }

    // ===== Templates =====

    pub async fn create_template(
        &self,
        request: CreateTemplateRequest,
    ) -> Result<NotificationTemplate, ServiceError> {
        let channel = parse_channel(&request.kind)?;
        if request.name.trim().is_empty() {
            return Err(ServiceError::Validation("template name must not be empty".to_string()));
        }
        if request.content.trim().is_empty() {
            return Err(ServiceError::Validation("template content must not be empty".to_string()));
        }

        // Variable list: caller-supplied, or derived from the bodies.
        let variables = match &request.variables {
            Some(list) => list.clone(),
            None => {
                let mut tokens = render::extract_tokens(&request.content);
                for extra in [&request.subject, &request.html_content].into_iter().flatten() {
                    for token in render::extract_tokens(extra) {
                        if !tokens.contains(&token) {
                            tokens.push(token);
                        }
                    }
                }
                tokens
            }
        };

        let mut conn = self.pool.get()?;
        let template = template_repo::create(
            &mut conn,
            NewNotificationTemplate {
                id: Uuid::now_v7(),
                name: request.name.trim().to_string(),
                kind: channel.as_str().to_string(),
                subject: request.subject,
                content: request.content,
                html_content: request.html_content,
                variables: serde_json::json!(variables),
            },
        )?;

        Ok(template)
    }

    pub async fn get_template(&self, id: Uuid) -> Result<NotificationTemplate, ServiceError> {
        let mut conn = self.pool.get()?;
        template_repo::get(&mut conn, id)
            .map_err(|_| ServiceError::NotFound(format!("template {id} not found")))
    }

    pub async fn list_templates(&self) -> Result<Vec<NotificationTemplate>, ServiceError> {
        let mut conn = self.pool.get()?;
        Ok(template_repo::list(&mut conn)?)
    }

    // ===== Batches =====

    pub async fn get_batch(&self, id: Uuid) -> Result<NotificationBatch, ServiceError> {
        let mut conn = self.pool.get()?;
        batch_repo::get(&mut conn, id).map_err(|_| ServiceError::NotFound(format!("batch {id} not found")))
    }

    // ===== Push subscriptions =====

    pub async fn register_push_subscription(
        &self,
        request: RegisterPushSubscriptionRequest,
    ) -> Result<PushSubscription, ServiceError> {
        let platform = PushPlatform::from_str(&request.platform)
            .ok_or_else(|| ServiceError::Validation(format!("invalid platform: {}", request.platform)))?;
        if request.user_id.trim().is_empty() {
            return Err(ServiceError::Validation("user_id must not be empty".to_string()));
        }
        if request.device_token.trim().is_empty() {
            return Err(ServiceError::Validation("device_token must not be empty".to_string()));
        }

        let mut conn = self.pool.get()?;
        let subscription = push_repo::upsert(
            &mut conn,
            NewPushSubscription {
                id: Uuid::now_v7(),
                user_id: request.user_id.trim().to_string(),
                platform: platform.as_str().to_string(),
                device_token: request.device_token,
                endpoint: request.endpoint,
                p256dh_key: request.p256dh_key,
                auth_key: request.auth_key,
                topics: request.topics.into_iter().map(Some).collect(),
                is_active: true,
            },
        )?;

        Ok(subscription)
    }

    pub async fn unregister_push_subscription(&self, user_id: &str, device_token: &str) -> Result<(), ServiceError> {
        let mut conn = self.pool.get()?;
        let touched = push_repo::deactivate(&mut conn, user_id, device_token)?;
        if touched == 0 {
            return Err(ServiceError::NotFound("push subscription not found".to_string()));
        }
        Ok(())
    }

    // ===== In-app inbox =====

    pub async fn list_in_app(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
        unread_only: bool,
    ) -> Result<Vec<crate::models::InAppNotification>, ServiceError> {
        let limit = limit.clamp(1, 100);
        let offset = offset.max(0);
        let mut conn = self.pool.get()?;
        Ok(in_app_repo::list_for_user(&mut conn, user_id, limit, offset, unread_only)?)
    }

    pub async fn mark_read(&self, id: Uuid, user_id: &str) -> Result<(), ServiceError> {
        let mut conn = self.pool.get()?;
        if !in_app_repo::mark_read(&mut conn, id, user_id)? {
            return Err(ServiceError::NotFound("in-app notification not found".to_string()));
        }
        Ok(())
    }

    pub async fn set_archived(&self, id: Uuid, user_id: &str, archived: bool) -> Result<(), ServiceError> {
        let mut conn = self.pool.get()?;
        if !in_app_repo::set_archived(&mut conn, id, user_id, archived)? {
            return Err(ServiceError::NotFound("in-app notification not found".to_string()));
        }
        Ok(())
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<i64, ServiceError> {
        let mut conn = self.pool.get()?;
        Ok(in_app_repo::unread_count(&mut conn, user_id)?)
    }

    // ===== Stats =====

    pub async fn get_stats(&self, user_id: &str, period: StatsPeriod) -> Result<NotificationStats, ServiceError> {
        let since = period.window_start(Utc::now());
        let mut conn = self.pool.get()?;

        let statuses = notification_repo::statuses_for_recipient(&mut conn, user_id, since)?;
        let count_of = |status: NotificationStatus| -> i64 {
            statuses.iter().filter(|s| s.as_str() == status.as_str()).count() as i64
        };

        let (in_app_total, in_app_unread) = in_app_repo::counts_for_user(&mut conn, user_id, since)?;

        Ok(NotificationStats {
            period: period.as_str().to_string(),
            total: statuses.len() as i64,
            pending: count_of(NotificationStatus::Pending),
            sent: count_of(NotificationStatus::Sent),
            delivered: count_of(NotificationStatus::Delivered),
            failed: count_of(NotificationStatus::Failed),
            in_app_total,
            in_app_unread,
        })
    }
}

fn parse_channel(kind: &str) -> Result<NotificationChannel, ServiceError> {
    NotificationChannel::from_str(kind)
        .ok_or_else(|| ServiceError::Validation(format!("invalid notification type: {kind}")))
}

fn parse_priority(priority: Option<&str>) -> Result<NotificationPriority, ServiceError> {
    match priority {
        None => Ok(NotificationPriority::Normal),
        Some(p) => NotificationPriority::from_str(p)
            .ok_or_else(|| ServiceError::Validation(format!("invalid priority: {p}"))),
    }
}

/// Channel-specific recipient shape checks, applied at admission so the
/// pipeline never spends retries on an address that can never work.
fn validate_recipient(channel: NotificationChannel, recipient: &str) -> Result<(), ServiceError> {
    let recipient = recipient.trim();
    if recipient.is_empty() {
        return Err(ServiceError::Validation("recipient must not be empty".to_string()));
    }

    match channel {
        NotificationChannel::Email => {
            if !recipient.contains('@') || recipient.starts_with('@') || recipient.ends_with('@') {
                return Err(ServiceError::Validation(format!("invalid email recipient: {recipient}")));
            }
        }
        NotificationChannel::Webhook => {
            let parsed = url::Url::parse(recipient)
                .map_err(|_| ServiceError::Validation(format!("invalid webhook URL: {recipient}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ServiceError::Validation(format!(
                    "webhook URL must be http(s): {recipient}"
                )));
            }
        }
        // User ids and device tokens are opaque; non-empty is all we can ask.
        NotificationChannel::InApp | NotificationChannel::Push | NotificationChannel::Sms => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_validation_per_channel() {
        assert!(validate_recipient(NotificationChannel::Email, "a@b.c").is_ok());
        assert!(validate_recipient(NotificationChannel::Email, "not-an-email").is_err());
        assert!(validate_recipient(NotificationChannel::Email, "@b.c").is_err());

        assert!(validate_recipient(NotificationChannel::Webhook, "https://example.com/hook").is_ok());
        assert!(validate_recipient(NotificationChannel::Webhook, "example.com/hook").is_err());
        assert!(validate_recipient(NotificationChannel::Webhook, "ftp://example.com").is_err());

        assert!(validate_recipient(NotificationChannel::InApp, "user-1").is_ok());
        assert!(validate_recipient(NotificationChannel::InApp, "   ").is_err());
    }

    #[test]
    fn priority_defaults_to_normal() {
        assert_eq!(parse_priority(None).unwrap(), NotificationPriority::Normal);
        assert_eq!(parse_priority(Some("urgent")).unwrap(), NotificationPriority::Urgent);
        assert!(parse_priority(Some("asap")).is_err());
    }

    mod flow {
        use super::*;
        use crate::bus::memory::InMemoryBus;
        use crate::bus::EventBus;
        use crate::models::{BatchRecipient, SendBatchRequest, SendNotificationRequest};
        use crate::test_helpers::{setup_test_pool, TestFixtures};

        fn service_and_pool() -> (NotificationService, crate::db::Pool) {
            let pool = setup_test_pool();
            let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
            (NotificationService::new(pool.clone(), bus), pool)
        }

        fn send_request(kind: &str, recipient: &str) -> SendNotificationRequest {
            SendNotificationRequest {
                kind: kind.to_string(),
                recipient: recipient.to_string(),
                priority: None,
                template_id: None,
                subject: Some("Hi".to_string()),
                content: Some("Hello {{name}}".to_string()),
                variables: Some(serde_json::json!({"name": "Ada"})),
                scheduled_at: None,
                expires_at: None,
                max_retries: None,
                batch_id: None,
            }
        }

        fn unique_email(prefix: &str) -> String {
            format!("{prefix}-{}@example.test", Uuid::now_v7())
        }

        #[tokio::test]
        async fn send_renders_and_persists_a_pending_row() {
            let (service, _pool) = service_and_pool();

            // Scheduled out of the live scheduler's reach so the row stays
            // pending for the assertions.
            let mut request = send_request("email", &unique_email("admit"));
            request.scheduled_at = Some(Utc::now() + chrono::Duration::hours(1));
            let row = service.send(request).await.unwrap();
            assert_eq!(row.status, "pending");
            assert_eq!(row.priority, "normal");
            assert_eq!(row.content, "Hello Ada");
            assert_eq!(row.retry_count, 0);
        }

        #[tokio::test]
        async fn send_requires_content_or_template() {
            let (service, _pool) = service_and_pool();

            let mut request = send_request("email", &unique_email("empty"));
            request.content = None;
            let err = service.send(request).await.unwrap_err();
            assert!(err.to_string().contains("content or template_id"));
        }

        #[tokio::test]
        async fn send_rejects_unknown_template_at_admission() {
            let (service, _pool) = service_and_pool();

            let mut request = send_request("email", &unique_email("tpl"));
            request.content = None;
            request.template_id = Some(Uuid::new_v4());
            assert!(matches!(
                service.send(request).await,
                Err(crate::services::ServiceError::NotFound(_))
            ));
        }

        #[tokio::test]
        async fn send_rejects_past_schedules() {
            let (service, _pool) = service_and_pool();

            let mut request = send_request("email", &unique_email("past"));
            request.scheduled_at = Some(Utc::now() - chrono::Duration::hours(1));
            assert!(service.send(request).await.is_err());
        }

        #[tokio::test]
        async fn template_send_stores_rendered_bodies() {
            let (service, pool) = service_and_pool();

            let template = {
                let mut conn = pool.get().unwrap();
                TestFixtures::create_template(&mut conn, "welcome", "email", "Welcome, {{name}}!")
            };

            let mut request = send_request("email", &unique_email("render"));
            request.content = None;
            request.subject = None;
            request.template_id = Some(template.id);
            request.variables = Some(serde_json::json!({"name": "Grace"}));

            let row = service.send(request).await.unwrap();
            assert_eq!(row.content, "Welcome, Grace!");
            assert_eq!(row.subject.as_deref(), Some("Hello Grace"));
            assert_eq!(row.template_id, Some(template.id));
        }

        #[tokio::test]
        async fn batch_admits_per_row_and_records_failures() {
            let (service, pool) = service_and_pool();

            let template = {
                let mut conn = pool.get().unwrap();
                TestFixtures::create_template(&mut conn, "batch", "email", "Hi {{name}}")
            };

            let good_a = unique_email("batch-a");
            let good_b = unique_email("batch-b");
            let response = service
                .send_batch(SendBatchRequest {
                    kind: "email".to_string(),
                    template_id: template.id,
                    recipients: vec![
                        BatchRecipient { recipient: good_a.clone(), variables: None },
                        BatchRecipient { recipient: "not-an-email".to_string(), variables: None },
                        BatchRecipient { recipient: good_b.clone(), variables: None },
                    ],
                    priority: None,
                    // Out of the live scheduler's reach: the counters below
                    // must reflect admission only.
                    scheduled_at: Some(Utc::now() + chrono::Duration::hours(1)),
                })
                .await
                .unwrap();

            assert_eq!(response.total, 3);
            assert_eq!(response.admitted, 2);
            assert_eq!(response.failed, 1);
            assert!(response.results[0].success);
            assert!(!response.results[1].success);
            assert!(response.results[2].success);

            let batch = service.get_batch(response.batch_id).await.unwrap();
            assert_eq!(batch.total, 3);
            assert_eq!(batch.failed, 1);
            assert_eq!(batch.sent, 0);
        }

        #[tokio::test]
        async fn batch_rejects_unknown_template() {
            let (service, _pool) = service_and_pool();

            let result = service
                .send_batch(SendBatchRequest {
                    kind: "email".to_string(),
                    template_id: Uuid::new_v4(),
                    recipients: vec![BatchRecipient {
                        recipient: unique_email("no-tpl"),
                        variables: None,
                    }],
                    priority: None,
                    scheduled_at: None,
                })
                .await;
            assert!(matches!(result, Err(crate::services::ServiceError::NotFound(_))));
        }

        #[tokio::test]
        async fn cancel_is_pending_only(){
            let (service, pool) = service_and_pool();

            let mut request = send_request("email", &unique_email("cancel"));
            request.scheduled_at = Some(Utc::now() + chrono::Duration::hours(1));
            let row = service.send(request).await.unwrap();
            let cancelled = service.cancel(row.id).await.unwrap();
            assert_eq!(cancelled.status, "cancelled");

            // Terminal rows reject a second cancellation.
            assert!(service.cancel(row.id).await.is_err());

            let sent = {
                let mut conn = pool.get().unwrap();
                TestFixtures::create_notification(&mut conn, "email", &unique_email("sent"), "sent")
            };
            assert!(service.cancel(sent.id).await.is_err());
        }

        #[tokio::test]
        async fn delivery_receipt_is_idempotent() {
            let (service, pool) = service_and_pool();

            let row = {
                let mut conn = pool.get().unwrap();
                TestFixtures::create_notification(&mut conn, "email", &unique_email("receipt"), "sent")
            };

            let delivered = service.confirm_delivered(row.id).await.unwrap();
            assert_eq!(delivered.status, "delivered");

            // Replayed receipt: same terminal state, no error.
            let replay = service.confirm_delivered(row.id).await.unwrap();
            assert_eq!(replay.status, "delivered");

            // A pending row has nothing to confirm.
            let pending = {
                let mut conn = pool.get().unwrap();
                TestFixtures::create_notification(&mut conn, "email", &unique_email("pend"), "sending")
            };
            assert!(service.confirm_delivered(pending.id).await.is_err());
        }

        #[tokio::test]
        async fn push_registration_roundtrip() {
            let (service, _pool) = service_and_pool();

            let user = format!("push-user-{}", Uuid::now_v7());
            let request = crate::models::RegisterPushSubscriptionRequest {
                user_id: user.clone(),
                platform: "android".to_string(),
                device_token: "tok-1".to_string(),
                endpoint: None,
                p256dh_key: None,
                auth_key: None,
                topics: vec!["billing".to_string()],
            };

            let first = service.register_push_subscription(request).await.unwrap();
            let second = service
                .register_push_subscription(crate::models::RegisterPushSubscriptionRequest {
                    user_id: user.clone(),
                    platform: "android".to_string(),
                    device_token: "tok-1".to_string(),
                    endpoint: None,
                    p256dh_key: None,
                    auth_key: None,
                    topics: vec![],
                })
                .await
                .unwrap();
            assert_eq!(first.id, second.id);

            service.unregister_push_subscription(&user, "tok-1").await.unwrap();
            assert!(matches!(
                service.unregister_push_subscription(&user, "missing").await,
                Err(crate::services::ServiceError::NotFound(_))
            ));
        }
    }
}
