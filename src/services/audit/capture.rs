//! Universal audit capture
//!
//! Subscribes to `*.*` and turns every event on the bus into one immutable
//! audit row: deduplicate against the bounded seen-set, map the envelope to
//! the canonical model, derive compliance flags and retention, persist, and
//! raise a real-time alert for high/critical events. Persistence failures
//! are logged and dropped; intake never back-pressures the bus.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::bus::dedup::DedupCache;
use crate::bus::{publish_best_effort, BusEvent, EventBus, EventHandler};
use crate::db::Pool;
use crate::models::{AuditEvent, NewAuditEvent};
use crate::repository::audit_events as audit_repo;

use super::types::{
    classify_category, classify_event_type, classify_severity, derive_compliance_flags,
    AuditSeverity, RetentionPolicy,
};

/// Pattern the capture service subscribes with: every two-token subject.
pub const CAPTURE_PATTERN: &str = "*.*";

const SOURCE: &str = "audit-service";

pub struct AuditCapture {
    pool: Pool,
    bus: Arc<dyn EventBus>,
    dedup: DedupCache,
}

impl AuditCapture {
    pub fn new(pool: Pool, bus: Arc<dyn EventBus>, dedup: DedupCache) -> Self {
        Self { pool, bus, dedup }
    }

    /// Subscribe the capture handler to the wildcard pattern.
    pub async fn register(bus: &dyn EventBus, handler: Arc<Self>) -> Result<(), crate::bus::BusError> {
        bus.subscribe(CAPTURE_PATTERN, handler).await
    }

    async fn alert_if_needed(&self, row: &AuditEvent) {
        let severity = AuditSeverity::from_str(&row.severity).unwrap_or(AuditSeverity::Low);
        if !severity.is_alerting() {
            return;
        }

        let alert = BusEvent::new(
            "audit.event_recorded",
            SOURCE,
            serde_json::json!({
                "audit_id": row.id,
                "event_type": row.event_type,
                "category": row.category,
                "severity": row.severity,
                "user_id": row.user_id,
            }),
        );
        publish_best_effort(self.bus.as_ref(), alert).await;
    }
}

#[async_trait]
impl EventHandler for AuditCapture {
    fn name(&self) -> &'static str {
        "audit-capture"
    }

    async fn handle(&self, event: BusEvent) -> anyhow::Result<()> {
        if !self.dedup.insert(&event.id) {
            tracing::debug!(event_id = %event.id, "Duplicate event dropped by seen-set");
            return Ok(());
        }

        let new_row = map_event(&event);

        let inserted = {
            let mut conn = match self.pool.get() {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!(event_id = %event.id, error = %e, "Audit store unavailable, dropping event");
                    return Ok(());
                }
            };
            match audit_repo::insert(&mut conn, new_row) {
                Ok(inserted) => inserted,
                Err(e) => {
                    tracing::error!(event_id = %event.id, error = %e, "Audit insert failed, dropping event");
                    return Ok(());
                }
            }
        };

        match inserted {
            Some(row) => {
                tracing::debug!(
                    audit_id = %row.id,
                    subject = %row.action,
                    severity = %row.severity,
                    "Audit event captured"
                );
                self.alert_if_needed(&row).await;
            }
            None => {
                // Unique source-event index already holds a row: a replica
                // or an earlier replay beat us to it.
                tracing::debug!(event_id = %event.id, "Audit row already persisted");
            }
        }

        Ok(())
    }
}

/// Map a bus envelope to the canonical audit model.
pub fn map_event(event: &BusEvent) -> NewAuditEvent {
    let subject = event.event_type.as_str();
    let (domain, _) = subject.split_once('.').unwrap_or((subject, ""));

    let event_type = classify_event_type(subject);
    let category = classify_category(subject);
    let severity = classify_severity(subject);

    let user_id = event
        .data_str("user_id")
        .or_else(|| event.data_str("shared_by"))
        .unwrap_or("system")
        .to_string();

    let resource_id = event
        .data_str("resource_id")
        .or_else(|| event.data_str("file_id"))
        .or_else(|| event.data_str("order_id"))
        .or_else(|| event.data_str("device_id"))
        .or_else(|| event.data_str("id"))
        .map(String::from);
    let resource_name = event
        .data_str("resource_name")
        .or_else(|| event.data_str("file_name"))
        .or_else(|| event.data_str("name"))
        .or_else(|| event.data_str("title"))
        .map(String::from);

    // Envelope data plus routing metadata, flattened into one object.
    let mut metadata = serde_json::Map::new();
    if let serde_json::Value::Object(data) = &event.data {
        metadata.extend(data.clone());
    }
    for (key, value) in &event.metadata {
        metadata.insert(key.clone(), serde_json::Value::String(value.clone()));
    }
    let metadata = serde_json::Value::Object(metadata);

    let compliance_flags = derive_compliance_flags(
        event_type,
        Some(domain),
        resource_name.as_deref(),
        &metadata,
    );
    let retention = RetentionPolicy::for_category(category);

    NewAuditEvent {
        id: Uuid::now_v7(),
        event_type: event_type.as_str().to_string(),
        category: category.as_str().to_string(),
        severity: severity.as_str().to_string(),
        status: "success".to_string(),
        action: subject.to_string(),
        user_id,
        organization_id: event.data_str("organization_id").map(String::from),
        resource_type: Some(domain.to_string()),
        resource_id,
        resource_name,
        metadata,
        tags: vec![Some(event.source.clone())],
        compliance_flags: compliance_flags
            .iter()
            .map(|f| Some(f.as_str().to_string()))
            .collect(),
        retention_policy: retention.as_str().to_string(),
        source_event_id: Some(event.id.clone()),
        timestamp: event.timestamp.naive_utc(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registration_maps_to_the_canonical_row() {
        let event = BusEvent::new(
            "user.registered",
            "auth",
            json!({"user_id": "u1", "email": "a@b.c"}),
        );
        let row = map_event(&event);

        assert_eq!(row.event_type, "user_register");
        assert_eq!(row.category, "authentication");
        assert_eq!(row.severity, "low");
        assert_eq!(row.retention_policy, "3_years");
        assert!(row.compliance_flags.is_empty());
        assert_eq!(row.action, "user.registered");
        assert_eq!(row.user_id, "u1");
        assert_eq!(row.source_event_id.as_deref(), Some(event.id.as_str()));
    }

    #[test]
    fn user_id_falls_back_to_shared_by_then_system() {
        let event = BusEvent::new("file.shared", "files", json!({"shared_by": "alice"}));
        assert_eq!(map_event(&event).user_id, "alice");

        let event = BusEvent::new("job.completed", "worker", json!({}));
        assert_eq!(map_event(&event).user_id, "system");
    }

    #[test]
    fn deletion_carries_gdpr_and_high_severity() {
        let event = BusEvent::new("user.deleted", "accounts", json!({"user_id": "u1"}));
        let row = map_event(&event);

        assert_eq!(row.event_type, "user_delete");
        assert_eq!(row.severity, "high");
        assert_eq!(row.compliance_flags, vec![Some("GDPR".to_string())]);
    }

    #[test]
    fn file_share_is_a_sox_flagged_permission_grant() {
        let event = BusEvent::new(
            "file.shared",
            "files",
            json!({"shared_by": "alice", "file_id": "f9", "file_name": "q.pdf"}),
        );
        let row = map_event(&event);

        assert_eq!(row.event_type, "permission_grant");
        assert_eq!(row.category, "data_access");
        assert_eq!(row.retention_policy, "1_year");
        assert_eq!(row.compliance_flags, vec![Some("SOX".to_string())]);
        assert_eq!(row.resource_id.as_deref(), Some("f9"));
        assert_eq!(row.resource_name.as_deref(), Some("q.pdf"));
        assert_eq!(row.resource_type.as_deref(), Some("file"));
    }

    use crate::bus::memory::InMemoryBus;
    use crate::bus::EventBus;
    use crate::repository::audit_events::AuditFilters;
    use crate::test_helpers::{setup_test_pool, CollectingHandler};
    use std::time::Duration;

    fn capture_with(pool: crate::db::Pool, bus: Arc<dyn EventBus>) -> AuditCapture {
        AuditCapture::new(pool, bus, DedupCache::new(100, 50))
    }

    fn rows_for_source(pool: &crate::db::Pool, source_event_id: &str) -> Vec<AuditEvent> {
        let mut conn = pool.get().unwrap();
        audit_repo::query(&mut conn, &AuditFilters::default(), 1000, 0)
            .unwrap()
            .into_iter()
            .filter(|row| row.source_event_id.as_deref() == Some(source_event_id))
            .collect()
    }

    #[tokio::test]
    async fn duplicate_envelope_persists_one_row() {
        let pool = setup_test_pool();
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
        let capture = capture_with(pool.clone(), bus);

        let mut event = BusEvent::new("user.registered", "auth", serde_json::json!({"user_id": "u1"}));
        event.id = format!("dup-{}", Uuid::new_v4());

        capture.handle(event.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        capture.handle(event.clone()).await.unwrap();

        assert_eq!(rows_for_source(&pool, &event.id).len(), 1);
    }

    #[tokio::test]
    async fn replay_past_the_seen_set_is_still_one_row() {
        // Evict the id from the seen-set, then replay: the unique source
        // index catches what the cache no longer remembers.
        let pool = setup_test_pool();
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
        let capture = AuditCapture::new(pool.clone(), bus, DedupCache::new(2, 1));

        let mut event = BusEvent::new("user.registered", "auth", serde_json::json!({"user_id": "u1"}));
        event.id = format!("replay-{}", Uuid::new_v4());

        capture.handle(event.clone()).await.unwrap();
        for i in 0..4 {
            let mut filler = BusEvent::new("job.completed", "worker", serde_json::json!({}));
            filler.id = format!("filler-{i}-{}", Uuid::new_v4());
            capture.handle(filler).await.unwrap();
        }
        capture.handle(event.clone()).await.unwrap();

        assert_eq!(rows_for_source(&pool, &event.id).len(), 1);
    }

    #[tokio::test]
    async fn high_severity_intake_publishes_an_alert() {
        let pool = setup_test_pool();
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
        let collector = CollectingHandler::new();
        bus.subscribe("audit.event_recorded", collector.clone()).await.unwrap();

        let capture = capture_with(pool.clone(), bus);

        capture
            .handle(BusEvent::new("user.deleted", "accounts", serde_json::json!({"user_id": "u1"})))
            .await
            .unwrap();
        capture
            .handle(BusEvent::new("user.registered", "auth", serde_json::json!({"user_id": "u2"})))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Only the high-severity deletion alerts.
        assert_eq!(collector.count_of("audit.event_recorded"), 1);
        let events = collector.events.lock().unwrap();
        assert_eq!(events[0].data_str("severity"), Some("high"));
        assert_eq!(events[0].data_str("user_id"), Some("u1"));
    }

    #[test]
    fn envelope_metadata_lands_in_row_metadata() {
        let event = BusEvent::new("user.registered", "auth", json!({"user_id": "u1"}))
            .with_metadata("correlation_id", "c-7");
        let row = map_event(&event);

        assert_eq!(row.metadata.get("correlation_id"), Some(&json!("c-7")));
        assert_eq!(row.metadata.get("user_id"), Some(&json!("u1")));
        assert_eq!(row.tags, vec![Some("auth".to_string())]);
    }
}
