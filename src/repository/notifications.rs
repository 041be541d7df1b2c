//! Notification Repository
//!
//! Database operations for the notification store. All lifecycle writes are
//! guarded transitions: the `WHERE` clause asserts the previous status, so a
//! row can never move along an edge the state machine forbids, regardless of
//! how many workers race on it.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbConnection;
use crate::models::{NewNotification, Notification, NotificationUpdate};
use crate::schema::notifications;
use crate::services::notifications::types::NotificationStatus;

pub fn create(
    conn: &mut DbConnection,
    new_notification: NewNotification,
) -> Result<Notification, diesel::result::Error> {
    diesel::insert_into(notifications::table)
        .values(&new_notification)
        .get_result(conn)
}

pub fn get(conn: &mut DbConnection, notification_id: Uuid) -> Result<Notification, diesel::result::Error> {
    notifications::table.find(notification_id).first(conn)
}

/// Due rows for the scheduler: `pending` with no schedule or a schedule in
/// the past, oldest first. Priority ordering happens in the scheduler
/// (priorities are stored as text).
pub fn due_pending(
    conn: &mut DbConnection,
    now: NaiveDateTime,
    limit: i64,
) -> Result<Vec<Notification>, diesel::result::Error> {
    notifications::table
        .filter(notifications::status.eq(NotificationStatus::Pending.as_str()))
        .filter(
            notifications::scheduled_at
                .is_null()
                .or(notifications::scheduled_at.le(now)),
        )
        .order(notifications::created_at.asc())
        .limit(limit)
        .load::<Notification>(conn)
}

/// Guarded status transition. Returns `true` when this call performed the
/// transition, `false` when the row was not in `from` (lost race, or caller
/// is out of date).
pub fn transition(
    conn: &mut DbConnection,
    notification_id: Uuid,
    from: NotificationStatus,
    update: NotificationUpdate,
) -> Result<bool, diesel::result::Error> {
    let updated = diesel::update(
        notifications::table
            .filter(notifications::id.eq(notification_id))
            .filter(notifications::status.eq(from.as_str())),
    )
    .set(&update)
    .execute(conn)?;

    Ok(updated > 0)
}

/// `pending -> sending`; the scheduler claims a row for dispatch.
pub fn claim_for_dispatch(
    conn: &mut DbConnection,
    notification_id: Uuid,
) -> Result<bool, diesel::result::Error> {
    transition(
        conn,
        notification_id,
        NotificationStatus::Pending,
        NotificationUpdate {
            status: Some(NotificationStatus::Sending.as_str().to_string()),
            ..Default::default()
        },
    )
}

/// `sending -> sent` after a successful adapter call.
pub fn mark_sent(
    conn: &mut DbConnection,
    notification_id: Uuid,
    provider_id: Option<String>,
) -> Result<bool, diesel::result::Error> {
    transition(
        conn,
        notification_id,
        NotificationStatus::Sending,
        NotificationUpdate {
            status: Some(NotificationStatus::Sent.as_str().to_string()),
            sent_at: Some(Some(Utc::now().naive_utc())),
            provider_id: Some(provider_id),
            error_message: Some(None),
            ..Default::default()
        },
    )
}

/// `sent -> delivered` on a delivery receipt.
pub fn mark_delivered(
    conn: &mut DbConnection,
    notification_id: Uuid,
) -> Result<bool, diesel::result::Error> {
    transition(
        conn,
        notification_id,
        NotificationStatus::Sent,
        NotificationUpdate {
            status: Some(NotificationStatus::Delivered.as_str().to_string()),
            delivered_at: Some(Some(Utc::now().naive_utc())),
            ..Default::default()
        },
    )
}

/// Terminal failure from either `pending` (expiry) or `sending` (fatal
/// error / retries exhausted).
pub fn mark_failed(
    conn: &mut DbConnection,
    notification_id: Uuid,
    from: NotificationStatus,
    error: &str,
    retry_count: Option<i32>,
) -> Result<bool, diesel::result::Error> {
    transition(
        conn,
        notification_id,
        from,
        NotificationUpdate {
            status: Some(NotificationStatus::Failed.as_str().to_string()),
            failed_at: Some(Some(Utc::now().naive_utc())),
            error_message: Some(Some(error.to_string())),
            retry_count,
            ..Default::default()
        },
    )
}

/// `sending -> pending` with a backoff schedule and bumped retry count.
pub fn reschedule_retry(
    conn: &mut DbConnection,
    notification_id: Uuid,
    retry_count: i32,
    next_attempt_at: NaiveDateTime,
    error: &str,
) -> Result<bool, diesel::result::Error> {
    transition(
        conn,
        notification_id,
        NotificationStatus::Sending,
        NotificationUpdate {
            status: Some(NotificationStatus::Pending.as_str().to_string()),
            scheduled_at: Some(Some(next_attempt_at)),
            retry_count: Some(retry_count),
            error_message: Some(Some(error.to_string())),
            ..Default::default()
        },
    )
}

/// `pending -> cancelled`; explicit cancellation before dispatch.
pub fn cancel(conn: &mut DbConnection, notification_id: Uuid) -> Result<bool, diesel::result::Error> {
    transition(
        conn,
        notification_id,
        NotificationStatus::Pending,
        NotificationUpdate {
            status: Some(NotificationStatus::Cancelled.as_str().to_string()),
            ..Default::default()
        },
    )
}

/// Status strings for one recipient since a window start (stats path).
pub fn statuses_for_recipient(
    conn: &mut DbConnection,
    recipient_value: &str,
    since: Option<NaiveDateTime>,
) -> Result<Vec<String>, diesel::result::Error> {
    let mut query = notifications::table
        .filter(notifications::recipient.eq(recipient_value))
        .into_boxed();

    if let Some(since) = since {
        query = query.filter(notifications::created_at.ge(since));
    }

    query.select(notifications::status).load::<String>(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{setup_test_connection, TestFixtures};

    #[test]
    fn create_and_get() {
        let mut conn = setup_test_connection();
        let notification = TestFixtures::create_notification(&mut conn, "email", "a@b.c", "pending");

        let fetched = get(&mut conn, notification.id).unwrap();
        assert_eq!(fetched.recipient, "a@b.c");
        assert_eq!(fetched.status, "pending");
        assert_eq!(fetched.retry_count, 0);
    }

    #[test]
    fn due_pending_skips_future_schedules() {
        let mut conn = setup_test_connection();
        let now = Utc::now().naive_utc();

        let due = TestFixtures::create_notification(&mut conn, "email", "due@x.y", "pending");
        let future = TestFixtures::create_notification_scheduled(
            &mut conn,
            "email",
            "later@x.y",
            now + chrono::Duration::hours(1),
        );

        let rows = due_pending(&mut conn, now, 100).unwrap();
        assert!(rows.iter().any(|n| n.id == due.id));
        assert!(!rows.iter().any(|n| n.id == future.id));
    }

    #[test]
    fn claim_is_exclusive() {
        let mut conn = setup_test_connection();
        let notification = TestFixtures::create_notification(&mut conn, "email", "a@b.c", "pending");

        assert!(claim_for_dispatch(&mut conn, notification.id).unwrap());
        // Second claim loses: the row is already `sending`.
        assert!(!claim_for_dispatch(&mut conn, notification.id).unwrap());
    }

    #[test]
    fn lifecycle_happy_path() {
        let mut conn = setup_test_connection();
        let notification = TestFixtures::create_notification(&mut conn, "email", "a@b.c", "pending");

        assert!(claim_for_dispatch(&mut conn, notification.id).unwrap());
        assert!(mark_sent(&mut conn, notification.id, Some("prov-1".into())).unwrap());
        assert!(mark_delivered(&mut conn, notification.id).unwrap());

        let row = get(&mut conn, notification.id).unwrap();
        assert_eq!(row.status, "delivered");
        assert_eq!(row.provider_id.as_deref(), Some("prov-1"));
        assert!(row.sent_at.is_some());
        assert!(row.delivered_at.is_some());
    }

    #[test]
    fn forbidden_edges_do_not_move_the_row() {
        let mut conn = setup_test_connection();
        let notification = TestFixtures::create_notification(&mut conn, "email", "a@b.c", "pending");

        // pending -> sent is not an edge; the guard rejects it.
        assert!(!mark_sent(&mut conn, notification.id, None).unwrap());
        // pending -> delivered likewise.
        assert!(!mark_delivered(&mut conn, notification.id).unwrap());

        let row = get(&mut conn, notification.id).unwrap();
        assert_eq!(row.status, "pending");
    }

    #[test]
    fn retry_reschedule_roundtrip() {
        let mut conn = setup_test_connection();
        let notification = TestFixtures::create_notification(&mut conn, "email", "a@b.c", "pending");
        let next = Utc::now().naive_utc() + chrono::Duration::seconds(45);

        assert!(claim_for_dispatch(&mut conn, notification.id).unwrap());
        assert!(reschedule_retry(&mut conn, notification.id, 1, next, "connect timeout").unwrap());

        let row = get(&mut conn, notification.id).unwrap();
        assert_eq!(row.status, "pending");
        assert_eq!(row.retry_count, 1);
        assert_eq!(row.error_message.as_deref(), Some("connect timeout"));
        assert_eq!(row.scheduled_at, Some(next));
    }

    #[test]
    fn cancel_only_from_pending() {
        let mut conn = setup_test_connection();
        let notification = TestFixtures::create_notification(&mut conn, "email", "a@b.c", "pending");

        assert!(cancel(&mut conn, notification.id).unwrap());
        let row = get(&mut conn, notification.id).unwrap();
        assert_eq!(row.status, "cancelled");

        // Terminal: nothing moves it again.
        assert!(!claim_for_dispatch(&mut conn, notification.id).unwrap());
        assert!(!cancel(&mut conn, notification.id).unwrap());
    }
}
