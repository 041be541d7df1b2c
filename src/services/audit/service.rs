//! Audit service
//!
//! The direct write path (for endpoints the bus cannot cover, e.g. failed
//! authentication attempts), the query surface, the security-event
//! investigation workflow, and retention cleanup. Validation is shared with
//! the bus intake path.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::bus::{publish_best_effort, BusEvent, EventBus};
use crate::db::Pool;
use crate::models::{
    AuditEvent, AuditQuery, BatchLogResponse, BatchLogResult, CreateSecurityAlertRequest,
    LogAuditEventRequest, NewAuditEvent, NewSecurityEvent, SecurityEvent, UserAuditSummary,
};
use crate::repository::audit_events::{self as audit_repo, AuditFilters};
use crate::repository::security_events as security_repo;
use crate::services::ServiceError;

use super::types::{
    AuditCategory, AuditEventType, AuditSeverity, RetentionPolicy, SecurityEventStatus,
    derive_compliance_flags, MAX_ACTION_LEN,
};

const SOURCE: &str = "audit-service";

pub const DEFAULT_QUERY_LIMIT: i64 = 100;
pub const MAX_QUERY_LIMIT: i64 = 1000;
pub const MAX_QUERY_SPAN_DAYS: i64 = 365;
pub const MAX_BATCH_LOG: usize = 100;

pub struct AuditService {
    pool: Pool,
    bus: Arc<dyn EventBus>,
}

impl AuditService {
    pub fn new(pool: Pool, bus: Arc<dyn EventBus>) -> Self {
        Self { pool, bus }
    }

    // ===== Direct write path =====

    /// Validate and persist one directly-logged audit event.
    pub async fn log_event(&self, request: LogAuditEventRequest) -> Result<AuditEvent, ServiceError> {
        let new_row = build_row(&request)?;

        let mut conn = self.pool.get()?;
        let row = audit_repo::insert(&mut conn, new_row)?
            .ok_or_else(|| ServiceError::Database("audit insert returned no row".to_string()))?;
        drop(conn);

        let severity = AuditSeverity::from_str(&row.severity).unwrap_or(AuditSeverity::Low);
        if severity.is_alerting() {
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

        Ok(row)
    }

    /// Log up to 100 events; each validated and persisted independently so
    /// one invalid event never blocks the others. Results are positional.
    pub async fn batch_log(&self, requests: Vec<LogAuditEventRequest>) -> Result<BatchLogResponse, ServiceError> {
        if requests.is_empty() {
            return Err(ServiceError::Validation("batch must contain at least one event".to_string()));
        }
        if requests.len() > MAX_BATCH_LOG {
            return Err(ServiceError::Validation(format!(
                "batch exceeds {MAX_BATCH_LOG} events"
            )));
        }

        let mut results = Vec::with_capacity(requests.len());
        let mut successful = 0;
        let mut failed = 0;

        for request in requests {
            match self.log_event(request).await {
                Ok(row) => {
                    successful += 1;
                    results.push(BatchLogResult {
                        success: true,
                        id: Some(row.id),
                        error: None,
                    });
                }
                Err(e) => {
                    failed += 1;
                    results.push(BatchLogResult {
                        success: false,
                        id: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Ok(BatchLogResponse {
            successful_count: successful,
            failed_count: failed,
            results,
        })
    }

    // ===== Queries =====

    pub async fn query(&self, query: AuditQuery) -> Result<Vec<AuditEvent>, ServiceError> {
        let limit = query.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        if !(1..=MAX_QUERY_LIMIT).contains(&limit) {
            return Err(ServiceError::Validation(format!(
                "limit must be between 1 and {MAX_QUERY_LIMIT}"
            )));
        }
        let offset = query.offset.unwrap_or(0);
        if offset < 0 {
            return Err(ServiceError::Validation("offset must be >= 0".to_string()));
        }

        if let (Some(start), Some(end)) = (query.start, query.end) {
            if start >= end {
                return Err(ServiceError::Validation("start must be before end".to_string()));
            }
            if end - start > chrono::Duration::days(MAX_QUERY_SPAN_DAYS) {
                return Err(ServiceError::Validation(format!(
                    "time range must not exceed {MAX_QUERY_SPAN_DAYS} days"
                )));
            }
        }

        if let Some(event_type) = &query.event_type {
            if AuditEventType::from_str(event_type).is_none() {
                return Err(ServiceError::Validation(format!("invalid event_type: {event_type}")));
            }
        }
        if let Some(category) = &query.category {
            if AuditCategory::from_str(category).is_none() {
                return Err(ServiceError::Validation(format!("invalid category: {category}")));
            }
        }
        if let Some(severity) = &query.severity {
            if AuditSeverity::from_str(severity).is_none() {
                return Err(ServiceError::Validation(format!("invalid severity: {severity}")));
            }
        }

        let filters = AuditFilters {
            user_id: query.user_id,
            event_type: query.event_type,
            category: query.category,
            severity: query.severity,
            start: query.start.map(|t| t.naive_utc()),
            end: query.end.map(|t| t.naive_utc()),
        };

        let mut conn = self.pool.get()?;
        Ok(audit_repo::query(&mut conn, &filters, limit, offset)?)
    }

    pub async fn user_activity(&self, user_id: &str, days: i64) -> Result<Vec<AuditEvent>, ServiceError> {
        if !(1..=365).contains(&days) {
            return Err(ServiceError::Validation("days must be between 1 and 365".to_string()));
        }

        let filters = AuditFilters {
            user_id: Some(user_id.to_string()),
            start: Some((Utc::now() - chrono::Duration::days(days)).naive_utc()),
            ..Default::default()
        };
        let mut conn = self.pool.get()?;
        Ok(audit_repo::query(&mut conn, &filters, MAX_QUERY_LIMIT, 0)?)
    }

    /// Aggregate view plus a coarse risk score: the share of high/critical
    /// events in the window, scaled to 0..100.
    pub async fn user_summary(&self, user_id: &str, days: i64) -> Result<UserAuditSummary, ServiceError> {
        let events = self.user_activity(user_id, days).await?;

        let mut by_category = std::collections::HashMap::new();
        let mut by_severity = std::collections::HashMap::new();
        let mut alerting = 0usize;

        for event in &events {
            *by_category.entry(event.category.clone()).or_insert(0) += 1;
            *by_severity.entry(event.severity.clone()).or_insert(0) += 1;
            if matches!(event.severity.as_str(), "high" | "critical") {
                alerting += 1;
            }
        }

        let risk_score = if events.is_empty() {
            0.0
        } else {
            100.0 * alerting as f64 / events.len() as f64
        };

        Ok(UserAuditSummary {
            user_id: user_id.to_string(),
            days,
            total_events: events.len() as i64,
            by_category,
            by_severity,
            risk_score,
        })
    }

    pub async fn security_events(&self, days: i64, limit: i64) -> Result<Vec<AuditEvent>, ServiceError> {
        if !(1..=90).contains(&days) {
            return Err(ServiceError::Validation("days must be between 1 and 90".to_string()));
        }
        let since = (Utc::now() - chrono::Duration::days(days)).naive_utc();
        let mut conn = self.pool.get()?;
        Ok(audit_repo::security_events_since(&mut conn, since, limit.clamp(1, MAX_QUERY_LIMIT))?)
    }

    // ===== Security investigation workflow =====

    pub async fn create_security_alert(
        &self,
        request: CreateSecurityAlertRequest,
    ) -> Result<SecurityEvent, ServiceError> {
        if request.alert_type.trim().is_empty() {
            return Err(ServiceError::Validation("alert_type must not be empty".to_string()));
        }
        if request.description.trim().is_empty() {
            return Err(ServiceError::Validation("description must not be empty".to_string()));
        }
        let severity = match request.severity.as_deref() {
            None => AuditSeverity::Medium,
            Some(s) => AuditSeverity::from_str(s)
                .ok_or_else(|| ServiceError::Validation(format!("invalid severity: {s}")))?,
        };

        let mut conn = self.pool.get()?;
        let row = security_repo::create(
            &mut conn,
            NewSecurityEvent {
                id: Uuid::now_v7(),
                alert_type: request.alert_type.trim().to_string(),
                severity: severity.as_str().to_string(),
                status: SecurityEventStatus::Open.as_str().to_string(),
                description: request.description.trim().to_string(),
                user_id: request.user_id,
                metadata: request.metadata.unwrap_or_else(|| serde_json::json!({})),
            },
        )?;
        Ok(row)
    }

    pub async fn list_security_alerts(&self, limit: i64, offset: i64) -> Result<Vec<SecurityEvent>, ServiceError> {
        let mut conn = self.pool.get()?;
        Ok(security_repo::list(&mut conn, limit.clamp(1, MAX_QUERY_LIMIT), offset.max(0))?)
    }

    /// Move a security event along the investigation state machine.
    pub async fn update_security_status(
        &self,
        event_id: Uuid,
        target: &str,
    ) -> Result<SecurityEvent, ServiceError> {
        let to = SecurityEventStatus::from_str(target)
            .ok_or_else(|| ServiceError::Validation(format!("invalid status: {target}")))?;

        let mut conn = self.pool.get()?;
        let current = security_repo::get(&mut conn, event_id)
            .map_err(|_| ServiceError::NotFound(format!("security event {event_id} not found")))?;
        let from = SecurityEventStatus::from_str(&current.status)
            .ok_or_else(|| ServiceError::Database(format!("corrupt status: {}", current.status)))?;

        if !from.can_transition_to(to) {
            return Err(ServiceError::Validation(format!(
                "cannot move security event from {} to {}",
                from.as_str(),
                to.as_str()
            )));
        }

        if !security_repo::transition_status(&mut conn, event_id, from, to)? {
            // Lost a race with a concurrent transition.
            return Err(ServiceError::Validation(
                "security event changed concurrently, retry".to_string(),
            ));
        }

        Ok(security_repo::get(&mut conn, event_id)?)
    }

    // ===== Maintenance =====

    /// Retention cleanup. The per-row retention policy always wins over a
    /// shorter requested window; cleanup itself is an auditable action.
    pub async fn cleanup(&self, retention_days: i64) -> Result<usize, ServiceError> {
        if !(30..=2555).contains(&retention_days) {
            return Err(ServiceError::Validation(
                "retention_days must be between 30 and 2555".to_string(),
            ));
        }

        let deleted = {
            let mut conn = self.pool.get()?;
            audit_repo::cleanup(&mut conn, retention_days)?
        };

        tracing::info!(retention_days, deleted, "Audit retention cleanup completed");

        let record = LogAuditEventRequest {
            event_type: AuditEventType::SystemEvent.as_str().to_string(),
            category: AuditCategory::Compliance.as_str().to_string(),
            severity: Some(AuditSeverity::Medium.as_str().to_string()),
            status: Some("success".to_string()),
            action: "audit.retention_cleanup".to_string(),
            user_id: Some("admin".to_string()),
            organization_id: None,
            resource_type: None,
            resource_id: None,
            resource_name: None,
            metadata: Some(serde_json::json!({
                "retention_days": retention_days,
                "deleted": deleted,
            })),
            tags: vec!["maintenance".to_string()],
        };
        if let Err(e) = self.log_event(record).await {
            tracing::warn!(error = %e, "Failed to audit the cleanup run");
        }

        Ok(deleted)
    }

    pub(crate) fn pool(&self) -> &Pool {
        &self.pool
    }
}

/// Shared validation for the direct and batch write paths.
pub fn build_row(request: &LogAuditEventRequest) -> Result<NewAuditEvent, ServiceError> {
    let action = request.action.trim();
    if action.is_empty() {
        return Err(ServiceError::Validation("action cannot be empty".to_string()));
    }
    if action.len() > MAX_ACTION_LEN {
        return Err(ServiceError::Validation(format!(
            "action must be at most {MAX_ACTION_LEN} characters"
        )));
    }

    let event_type = AuditEventType::from_str(&request.event_type)
        .ok_or_else(|| ServiceError::Validation(format!("invalid event_type: {}", request.event_type)))?;
    let category = AuditCategory::from_str(&request.category)
        .ok_or_else(|| ServiceError::Validation(format!("invalid category: {}", request.category)))?;
    let severity = match request.severity.as_deref() {
        None => AuditSeverity::Low,
        Some(s) => AuditSeverity::from_str(s)
            .ok_or_else(|| ServiceError::Validation(format!("invalid severity: {s}")))?,
    };

    // Null metadata coerces to an empty object; anything non-object is the
    // caller's mistake.
    let metadata = match &request.metadata {
        None | Some(serde_json::Value::Null) => serde_json::json!({}),
        Some(value @ serde_json::Value::Object(_)) => value.clone(),
        Some(_) => {
            return Err(ServiceError::Validation("metadata must be a JSON object".to_string()));
        }
    };

    let compliance_flags = derive_compliance_flags(
        event_type,
        request.resource_type.as_deref(),
        request.resource_name.as_deref(),
        &metadata,
    );
    let retention = RetentionPolicy::for_category(category);

    Ok(NewAuditEvent {
        id: Uuid::now_v7(),
        event_type: event_type.as_str().to_string(),
        category: category.as_str().to_string(),
        severity: severity.as_str().to_string(),
        status: request.status.clone().unwrap_or_else(|| "success".to_string()),
        action: action.to_string(),
        user_id: request.user_id.clone().unwrap_or_else(|| "system".to_string()),
        organization_id: request.organization_id.clone(),
        resource_type: request.resource_type.clone(),
        resource_id: request.resource_id.clone(),
        resource_name: request.resource_name.clone(),
        metadata,
        tags: request.tags.iter().cloned().map(Some).collect(),
        compliance_flags: compliance_flags
            .iter()
            .map(|f| Some(f.as_str().to_string()))
            .collect(),
        retention_policy: retention.as_str().to_string(),
        source_event_id: None,
        timestamp: Utc::now().naive_utc(),
    })
}
