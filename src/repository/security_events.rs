//! Security Event Repository

use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbConnection;
use crate::models::{NewSecurityEvent, SecurityEvent, SecurityEventUpdate};
use crate::schema::security_events;
use crate::services::audit::types::SecurityEventStatus;

pub fn create(
    conn: &mut DbConnection,
    new_event: NewSecurityEvent,
) -> Result<SecurityEvent, diesel::result::Error> {
    diesel::insert_into(security_events::table)
        .values(&new_event)
        .get_result(conn)
}

pub fn get(conn: &mut DbConnection, event_id: Uuid) -> Result<SecurityEvent, diesel::result::Error> {
    security_events::table.find(event_id).first(conn)
}

pub fn list(
    conn: &mut DbConnection,
    limit: i64,
    offset: i64,
) -> Result<Vec<SecurityEvent>, diesel::result::Error> {
    security_events::table
        .order(security_events::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load::<SecurityEvent>(conn)
}

/// Guarded investigation-state transition: the `WHERE` clause asserts the
/// current status, so an illegal edge never writes.
pub fn transition_status(
    conn: &mut DbConnection,
    event_id: Uuid,
    from: SecurityEventStatus,
    to: SecurityEventStatus,
) -> Result<bool, diesel::result::Error> {
    let updated = diesel::update(
        security_events::table
            .filter(security_events::id.eq(event_id))
            .filter(security_events::status.eq(from.as_str())),
    )
    .set(&SecurityEventUpdate {
        status: Some(to.as_str().to_string()),
        updated_at: Some(Utc::now().naive_utc()),
    })
    .execute(conn)?;

    Ok(updated > 0)
}
