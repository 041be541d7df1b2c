//! Audit Event Repository
//!
//! Append-only: there is no update path for audit rows, and deletion is the
//! retention cleanup only. Bus-ingested rows carry the originating
//! `source_event_id` under a unique index, so replayed events collapse to a
//! single row no matter how many replicas saw them.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbConnection;
use crate::models::{AuditEvent, NewAuditEvent};
use crate::schema::audit_events;
use crate::services::audit::types::RetentionPolicy;

/// Insert one audit row. Returns `None` when a row for the same source
/// event already exists (idempotent bus intake).
pub fn insert(
    conn: &mut DbConnection,
    new_event: NewAuditEvent,
) -> Result<Option<AuditEvent>, diesel::result::Error> {
    diesel::insert_into(audit_events::table)
        .values(&new_event)
        .on_conflict(audit_events::source_event_id)
        .do_nothing()
        .get_result(conn)
        .optional()
}

pub fn get(conn: &mut DbConnection, event_id: Uuid) -> Result<AuditEvent, diesel::result::Error> {
    audit_events::table.find(event_id).first(conn)
}

#[derive(Debug, Default)]
pub struct AuditFilters {
    pub user_id: Option<String>,
    pub event_type: Option<String>,
    pub category: Option<String>,
    pub severity: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

/// Filtered query, newest first.
pub fn query(
    conn: &mut DbConnection,
    filters: &AuditFilters,
    limit: i64,
    offset: i64,
) -> Result<Vec<AuditEvent>, diesel::result::Error> {
    let mut query = audit_events::table.into_boxed();

    if let Some(user) = &filters.user_id {
        query = query.filter(audit_events::user_id.eq(user.clone()));
    }
    if let Some(event_type) = &filters.event_type {
        query = query.filter(audit_events::event_type.eq(event_type.clone()));
    }
    if let Some(category) = &filters.category {
        query = query.filter(audit_events::category.eq(category.clone()));
    }
    if let Some(severity) = &filters.severity {
        query = query.filter(audit_events::severity.eq(severity.clone()));
    }
    if let Some(start) = filters.start {
        query = query.filter(audit_events::timestamp.ge(start));
    }
    if let Some(end) = filters.end {
        query = query.filter(audit_events::timestamp.lt(end));
    }

    query
        .order(audit_events::timestamp.desc())
        .limit(limit)
        .offset(offset)
        .load::<AuditEvent>(conn)
}

/// Every event in a time range (compliance reporting).
pub fn events_in_range(
    conn: &mut DbConnection,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<Vec<AuditEvent>, diesel::result::Error> {
    audit_events::table
        .filter(audit_events::timestamp.ge(start))
        .filter(audit_events::timestamp.lt(end))
        .order(audit_events::timestamp.desc())
        .load::<AuditEvent>(conn)
}

/// High/critical or security-categorised events since a cutoff.
pub fn security_events_since(
    conn: &mut DbConnection,
    since: NaiveDateTime,
    limit: i64,
) -> Result<Vec<AuditEvent>, diesel::result::Error> {
    audit_events::table
        .filter(audit_events::timestamp.ge(since))
        .filter(
            audit_events::severity
                .eq_any(vec!["high", "critical"])
                .or(audit_events::category.eq("security")),
        )
        .order(audit_events::timestamp.desc())
        .limit(limit)
        .load::<AuditEvent>(conn)
}

/// Retention cleanup.
///
/// The effective window per row is the *longer* of the admin-requested
/// window and the row's own retention policy, so nothing inside a
/// compliance retention window is ever deleted, regardless of the request.
pub fn cleanup(conn: &mut DbConnection, requested_days: i64) -> Result<usize, diesel::result::Error> {
    let now = Utc::now().naive_utc();
    let mut deleted = 0;

    for policy in [RetentionPolicy::OneYear, RetentionPolicy::ThreeYears, RetentionPolicy::SevenYears] {
        let effective_days = requested_days.max(policy.days());
        let cutoff = now - chrono::Duration::days(effective_days);

        deleted += diesel::delete(
            audit_events::table
                .filter(audit_events::retention_policy.eq(policy.as_str()))
                .filter(audit_events::timestamp.lt(cutoff)),
        )
        .execute(conn)?;
    }

    Ok(deleted)
}
