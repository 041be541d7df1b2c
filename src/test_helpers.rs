//! Test helpers — DB connection setup and fixture factories.
//!
//! Every connection returned by [`setup_test_connection`] is wrapped in a
//! transaction that is **never committed**, so tests are fully isolated and
//! leave no residue in the database.

use chrono::{NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel::Connection;
use uuid::Uuid;

use crate::db::DbConnection;
use crate::models::*;
use crate::schema::*;

/// Obtain a pooled connection wrapped in a test transaction.
///
/// Uses `DATABASE_URL` (same DB the dev container already has) — safe because
/// `begin_test_transaction` ensures everything is rolled back on drop.
pub fn setup_test_connection() -> DbConnection {
    dotenv::dotenv().ok();

    let database_url = std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .expect("DATABASE_URL or TEST_DATABASE_URL must be set for tests");

    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder()
        .max_size(1)
        .build(manager)
        .expect("Failed to create test connection pool");

    let mut conn = pool.get().expect("Failed to get test connection");
    conn.begin_test_transaction()
        .expect("Failed to begin test transaction");
    conn
}

/// Create a test database pool for pipeline tests.
/// Unlike `setup_test_connection`, this returns a Pool usable with services
/// and workers. Note: tests using this pool share the same database state,
/// so fixtures must use unique recipients/users per test.
pub fn setup_test_pool() -> crate::db::Pool {
    dotenv::dotenv().ok();

    let database_url = std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .expect("DATABASE_URL or TEST_DATABASE_URL must be set for tests");

    let manager = ConnectionManager::<PgConnection>::new(database_url);
    r2d2::Pool::builder()
        .max_size(4)
        .build(manager)
        .expect("Failed to create test pool")
}

/// Bus handler that records every event it sees; subscribe it to a pattern
/// to assert on published lifecycle events.
pub struct CollectingHandler {
    pub events: std::sync::Mutex<Vec<crate::bus::BusEvent>>,
}

impl CollectingHandler {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            events: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn subjects(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    pub fn count_of(&self, subject: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == subject)
            .count()
    }
}

#[async_trait::async_trait]
impl crate::bus::EventHandler for CollectingHandler {
    fn name(&self) -> &'static str {
        "test-collector"
    }

    async fn handle(&self, event: crate::bus::BusEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Convenience factories for common test fixtures.
pub struct TestFixtures;

impl TestFixtures {
    /// Insert a minimal notification and return it.
    pub fn create_notification(
        conn: &mut DbConnection,
        kind: &str,
        recipient: &str,
        status: &str,
    ) -> Notification {
        let new_notification = NewNotification {
            id: Uuid::now_v7(),
            kind: kind.to_string(),
            priority: "normal".to_string(),
            recipient: recipient.to_string(),
            template_id: None,
            subject: Some("Test subject".to_string()),
            content: "Test content".to_string(),
            html_content: None,
            variables: serde_json::json!({}),
            status: status.to_string(),
            scheduled_at: None,
            expires_at: None,
            max_retries: 3,
            batch_id: None,
        };

        diesel::insert_into(notifications::table)
            .values(&new_notification)
            .get_result(conn)
            .expect("Failed to create test notification")
    }

    /// Insert a pending notification scheduled for a future time.
    pub fn create_notification_scheduled(
        conn: &mut DbConnection,
        kind: &str,
        recipient: &str,
        scheduled_at: NaiveDateTime,
    ) -> Notification {
        let new_notification = NewNotification {
            id: Uuid::now_v7(),
            kind: kind.to_string(),
            priority: "normal".to_string(),
            recipient: recipient.to_string(),
            template_id: None,
            subject: None,
            content: "Scheduled content".to_string(),
            html_content: None,
            variables: serde_json::json!({}),
            status: "pending".to_string(),
            scheduled_at: Some(scheduled_at),
            expires_at: None,
            max_retries: 3,
            batch_id: None,
        };

        diesel::insert_into(notifications::table)
            .values(&new_notification)
            .get_result(conn)
            .expect("Failed to create scheduled test notification")
    }

    /// A notification value that never touches the database, for adapter
    /// tests.
    pub fn notification_value(kind: &str, recipient: &str) -> Notification {
        let now = Utc::now().naive_utc();
        Notification {
            id: Uuid::now_v7(),
            kind: kind.to_string(),
            priority: "normal".to_string(),
            recipient: recipient.to_string(),
            template_id: None,
            subject: Some("Test subject".to_string()),
            content: "Test content".to_string(),
            html_content: None,
            variables: serde_json::json!({}),
            status: "sending".to_string(),
            scheduled_at: None,
            expires_at: None,
            retry_count: 0,
            max_retries: 3,
            error_message: None,
            provider_id: None,
            batch_id: None,
            created_at: now,
            sent_at: None,
            delivered_at: None,
            failed_at: None,
        }
    }

    /// Insert a template and return it.
    pub fn create_template(
        conn: &mut DbConnection,
        name: &str,
        kind: &str,
        content: &str,
    ) -> NotificationTemplate {
        let new_template = NewNotificationTemplate {
            id: Uuid::now_v7(),
            name: name.to_string(),
            kind: kind.to_string(),
            subject: Some("Hello {{name}}".to_string()),
            content: content.to_string(),
            html_content: None,
            variables: serde_json::json!(["name"]),
        };

        diesel::insert_into(notification_templates::table)
            .values(&new_template)
            .get_result(conn)
            .expect("Failed to create test template")
    }

    /// Insert a batch and return it.
    pub fn create_batch(conn: &mut DbConnection, kind: &str, total: i32) -> NotificationBatch {
        let new_batch = NewNotificationBatch {
            id: Uuid::now_v7(),
            template_id: None,
            kind: kind.to_string(),
            total,
            status: "pending".to_string(),
            scheduled_at: None,
        };

        diesel::insert_into(notification_batches::table)
            .values(&new_batch)
            .get_result(conn)
            .expect("Failed to create test batch")
    }

    /// Insert an in-app inbox row and return it.
    pub fn create_in_app(conn: &mut DbConnection, user_id: &str, title: &str) -> InAppNotification {
        let new_row = NewInAppNotification {
            id: Uuid::now_v7(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            message: "Test message".to_string(),
            kind: "notification".to_string(),
            category: None,
            priority: "normal".to_string(),
            action_type: None,
            action_url: None,
            action_data: None,
            expires_at: None,
        };

        diesel::insert_into(in_app_notifications::table)
            .values(&new_row)
            .get_result(conn)
            .expect("Failed to create test in-app notification")
    }

    /// Build a push subscription insert for the given identity triple.
    pub fn push_subscription(user_id: &str, device_token: &str, platform: &str) -> NewPushSubscription {
        NewPushSubscription {
            id: Uuid::now_v7(),
            user_id: user_id.to_string(),
            platform: platform.to_string(),
            device_token: device_token.to_string(),
            endpoint: None,
            p256dh_key: None,
            auth_key: None,
            topics: vec![],
            is_active: true,
        }
    }

    /// Build an audit event insert derived from a subject string.
    pub fn audit_event(subject: &str, source_event_id: Option<&str>) -> NewAuditEvent {
        use crate::services::audit::types::{
            classify_category, classify_event_type, classify_severity, RetentionPolicy,
        };

        let event_type = classify_event_type(subject);
        let category = classify_category(subject);
        let severity = classify_severity(subject);

        NewAuditEvent {
            id: Uuid::now_v7(),
            event_type: event_type.as_str().to_string(),
            category: category.as_str().to_string(),
            severity: severity.as_str().to_string(),
            status: "success".to_string(),
            action: subject.to_string(),
            user_id: "test-user".to_string(),
            organization_id: None,
            resource_type: None,
            resource_id: None,
            resource_name: None,
            metadata: serde_json::json!({}),
            tags: vec![],
            compliance_flags: vec![],
            retention_policy: RetentionPolicy::for_category(category).as_str().to_string(),
            source_event_id: source_event_id.map(String::from),
            timestamp: Utc::now().naive_utc(),
        }
    }

    /// Insert an open security event and return it.
    pub fn create_security_event(conn: &mut DbConnection, alert_type: &str, severity: &str) -> SecurityEvent {
        let new_event = NewSecurityEvent {
            id: Uuid::now_v7(),
            alert_type: alert_type.to_string(),
            severity: severity.to_string(),
            status: "open".to_string(),
            description: "Test security event".to_string(),
            user_id: Some("test-user".to_string()),
            metadata: serde_json::json!({}),
        };

        diesel::insert_into(security_events::table)
            .values(&new_event)
            .get_result(conn)
            .expect("Failed to create test security event")
    }
}
