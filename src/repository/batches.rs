//! Batch Repository
//!
//! Counter updates are atomic SQL increments so concurrent delivery workers
//! never lose updates; counters are monotonically non-decreasing.

use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbConnection;
use crate::models::{NewNotificationBatch, NotificationBatch};
use crate::schema::notification_batches;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_COMPLETED: &str = "completed";

pub fn create(
    conn: &mut DbConnection,
    new_batch: NewNotificationBatch,
) -> Result<NotificationBatch, diesel::result::Error> {
    diesel::insert_into(notification_batches::table)
        .values(&new_batch)
        .get_result(conn)
}

pub fn get(conn: &mut DbConnection, batch_id: Uuid) -> Result<NotificationBatch, diesel::result::Error> {
    notification_batches::table.find(batch_id).first(conn)
}

/// First delivery attempt for the batch: stamp `started_at` once.
pub fn mark_started(conn: &mut DbConnection, batch_id: Uuid) -> Result<(), diesel::result::Error> {
    diesel::update(
        notification_batches::table
            .filter(notification_batches::id.eq(batch_id))
            .filter(notification_batches::started_at.is_null()),
    )
    .set((
        notification_batches::started_at.eq(Utc::now().naive_utc()),
        notification_batches::status.eq(STATUS_PROCESSING),
    ))
    .execute(conn)?;
    Ok(())
}

pub fn increment_sent(conn: &mut DbConnection, batch_id: Uuid) -> Result<(), diesel::result::Error> {
    diesel::update(notification_batches::table.find(batch_id))
        .set(notification_batches::sent.eq(notification_batches::sent + 1))
        .execute(conn)?;
    Ok(())
}

pub fn increment_delivered(conn: &mut DbConnection, batch_id: Uuid) -> Result<(), diesel::result::Error> {
    diesel::update(notification_batches::table.find(batch_id))
        .set(notification_batches::delivered.eq(notification_batches::delivered + 1))
        .execute(conn)?;
    Ok(())
}

pub fn increment_failed(conn: &mut DbConnection, batch_id: Uuid) -> Result<(), diesel::result::Error> {
    diesel::update(notification_batches::table.find(batch_id))
        .set(notification_batches::failed.eq(notification_batches::failed + 1))
        .execute(conn)?;
    Ok(())
}

/// Bulk failure increment (admission-time rejects).
pub fn add_failed(conn: &mut DbConnection, batch_id: Uuid, count: i32) -> Result<(), diesel::result::Error> {
    diesel::update(notification_batches::table.find(batch_id))
        .set(notification_batches::failed.eq(notification_batches::failed + count))
        .execute(conn)?;
    Ok(())
}

/// Close the batch when every row reached a terminal state. Returns the
/// completed batch exactly once (the guarded update makes completion
/// idempotent under concurrent workers).
pub fn try_complete(
    conn: &mut DbConnection,
    batch_id: Uuid,
) -> Result<Option<NotificationBatch>, diesel::result::Error> {
    let batch = get(conn, batch_id)?;
    if batch.sent + batch.failed < batch.total {
        return Ok(None);
    }

    let closed = diesel::update(
        notification_batches::table
            .filter(notification_batches::id.eq(batch_id))
            .filter(notification_batches::status.ne(STATUS_COMPLETED)),
    )
    .set((
        notification_batches::status.eq(STATUS_COMPLETED),
        notification_batches::completed_at.eq(Utc::now().naive_utc()),
    ))
    .execute(conn)?;

    if closed > 0 {
        Ok(Some(get(conn, batch_id)?))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{setup_test_connection, TestFixtures};

    #[test]
    fn counters_accumulate() {
        let mut conn = setup_test_connection();
        let batch = TestFixtures::create_batch(&mut conn, "email", 3);

        increment_sent(&mut conn, batch.id).unwrap();
        increment_sent(&mut conn, batch.id).unwrap();
        increment_failed(&mut conn, batch.id).unwrap();

        let row = get(&mut conn, batch.id).unwrap();
        assert_eq!(row.sent, 2);
        assert_eq!(row.failed, 1);
        assert_eq!(row.delivered, 0);
    }

    #[test]
    fn completion_requires_terminal_counts() {
        let mut conn = setup_test_connection();
        let batch = TestFixtures::create_batch(&mut conn, "email", 2);

        increment_sent(&mut conn, batch.id).unwrap();
        assert!(try_complete(&mut conn, batch.id).unwrap().is_none());

        increment_failed(&mut conn, batch.id).unwrap();
        let completed = try_complete(&mut conn, batch.id).unwrap().unwrap();
        assert_eq!(completed.status, STATUS_COMPLETED);
        assert!(completed.completed_at.is_some());

        // Second close is a no-op: completion fires exactly once.
        assert!(try_complete(&mut conn, batch.id).unwrap().is_none());
    }

    #[test]
    fn mark_started_stamps_once() {
        let mut conn = setup_test_connection();
        let batch = TestFixtures::create_batch(&mut conn, "email", 1);

        mark_started(&mut conn, batch.id).unwrap();
        let first = get(&mut conn, batch.id).unwrap().started_at.unwrap();

        mark_started(&mut conn, batch.id).unwrap();
        let second = get(&mut conn, batch.id).unwrap().started_at.unwrap();
        assert_eq!(first, second);
    }
}
