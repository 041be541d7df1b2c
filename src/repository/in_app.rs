//! In-App Inbox Repository

use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbConnection;
use crate::models::{InAppNotification, NewInAppNotification};
use crate::schema::in_app_notifications;

pub fn create(
    conn: &mut DbConnection,
    new_row: NewInAppNotification,
) -> Result<InAppNotification, diesel::result::Error> {
    diesel::insert_into(in_app_notifications::table)
        .values(&new_row)
        .get_result(conn)
}

/// Inbox listing, newest first. Archived rows are excluded.
pub fn list_for_user(
    conn: &mut DbConnection,
    user: &str,
    limit: i64,
    offset: i64,
    unread_only: bool,
) -> Result<Vec<InAppNotification>, diesel::result::Error> {
    let mut query = in_app_notifications::table
        .filter(in_app_notifications::user_id.eq(user))
        .filter(in_app_notifications::is_archived.eq(false))
        .into_boxed();

    if unread_only {
        query = query.filter(in_app_notifications::is_read.eq(false));
    }

    query
        .order(in_app_notifications::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load::<InAppNotification>(conn)
}

/// Mark one row read. Scoped to the owning user; idempotent (`read_at`
/// keeps its first value). Returns `false` when no row matched.
pub fn mark_read(
    conn: &mut DbConnection,
    notification_id: Uuid,
    user: &str,
) -> Result<bool, diesel::result::Error> {
    let updated = diesel::update(
        in_app_notifications::table
            .filter(in_app_notifications::id.eq(notification_id))
            .filter(in_app_notifications::user_id.eq(user))
            .filter(in_app_notifications::is_read.eq(false)),
    )
    .set((
        in_app_notifications::is_read.eq(true),
        in_app_notifications::read_at.eq(Utc::now().naive_utc()),
    ))
    .execute(conn)?;

    if updated > 0 {
        return Ok(true);
    }

    // Already read also counts as success for idempotence; only a missing
    // or foreign row is a miss.
    let exists: i64 = in_app_notifications::table
        .filter(in_app_notifications::id.eq(notification_id))
        .filter(in_app_notifications::user_id.eq(user))
        .count()
        .get_result(conn)?;
    Ok(exists > 0)
}

/// Archive / unarchive one row for its owner.
pub fn set_archived(
    conn: &mut DbConnection,
    notification_id: Uuid,
    user: &str,
    archived: bool,
) -> Result<bool, diesel::result::Error> {
    let updated = diesel::update(
        in_app_notifications::table
            .filter(in_app_notifications::id.eq(notification_id))
            .filter(in_app_notifications::user_id.eq(user)),
    )
    .set(in_app_notifications::is_archived.eq(archived))
    .execute(conn)?;
    Ok(updated > 0)
}

pub fn unread_count(conn: &mut DbConnection, user: &str) -> Result<i64, diesel::result::Error> {
    in_app_notifications::table
        .filter(in_app_notifications::user_id.eq(user))
        .filter(in_app_notifications::is_read.eq(false))
        .filter(in_app_notifications::is_archived.eq(false))
        .count()
        .get_result(conn)
}

/// `(total, unread)` for the stats endpoint, optionally windowed.
pub fn counts_for_user(
    conn: &mut DbConnection,
    user: &str,
    since: Option<chrono::NaiveDateTime>,
) -> Result<(i64, i64), diesel::result::Error> {
    let mut total_query = in_app_notifications::table
        .filter(in_app_notifications::user_id.eq(user))
        .into_boxed();
    let mut unread_query = in_app_notifications::table
        .filter(in_app_notifications::user_id.eq(user))
        .filter(in_app_notifications::is_read.eq(false))
        .into_boxed();

    if let Some(since) = since {
        total_query = total_query.filter(in_app_notifications::created_at.ge(since));
        unread_query = unread_query.filter(in_app_notifications::created_at.ge(since));
    }

    let total: i64 = total_query.count().get_result(conn)?;
    let unread: i64 = unread_query.count().get_result(conn)?;
    Ok((total, unread))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{setup_test_connection, TestFixtures};

    #[test]
    fn list_is_newest_first_and_scoped() {
        let mut conn = setup_test_connection();
        TestFixtures::create_in_app(&mut conn, "u1", "first");
        TestFixtures::create_in_app(&mut conn, "u1", "second");
        TestFixtures::create_in_app(&mut conn, "u2", "other user");

        let rows = list_for_user(&mut conn, "u1", 20, 0, false).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].created_at >= rows[1].created_at);
        assert!(rows.iter().all(|r| r.user_id == "u1"));
    }

    #[test]
    fn mark_read_is_idempotent() {
        let mut conn = setup_test_connection();
        let row = TestFixtures::create_in_app(&mut conn, "u1", "hello");

        assert!(mark_read(&mut conn, row.id, "u1").unwrap());
        let after_first = list_for_user(&mut conn, "u1", 10, 0, false).unwrap();
        let read_at = after_first[0].read_at.unwrap();

        // Second call: same terminal state, same read_at.
        assert!(mark_read(&mut conn, row.id, "u1").unwrap());
        let after_second = list_for_user(&mut conn, "u1", 10, 0, false).unwrap();
        assert!(after_second[0].is_read);
        assert_eq!(after_second[0].read_at.unwrap(), read_at);
    }

    #[test]
    fn mark_read_rejects_foreign_user() {
        let mut conn = setup_test_connection();
        let row = TestFixtures::create_in_app(&mut conn, "u1", "hello");

        assert!(!mark_read(&mut conn, row.id, "intruder").unwrap());
        let rows = list_for_user(&mut conn, "u1", 10, 0, false).unwrap();
        assert!(!rows[0].is_read);
    }

    #[test]
    fn unread_count_tracks_reads_and_archives() {
        let mut conn = setup_test_connection();
        let a = TestFixtures::create_in_app(&mut conn, "u1", "a");
        let b = TestFixtures::create_in_app(&mut conn, "u1", "b");
        TestFixtures::create_in_app(&mut conn, "u1", "c");

        assert_eq!(unread_count(&mut conn, "u1").unwrap(), 3);

        mark_read(&mut conn, a.id, "u1").unwrap();
        assert_eq!(unread_count(&mut conn, "u1").unwrap(), 2);

        set_archived(&mut conn, b.id, "u1", true).unwrap();
        assert_eq!(unread_count(&mut conn, "u1").unwrap(), 1);
    }

    #[test]
    fn archived_rows_leave_the_inbox() {
        let mut conn = setup_test_connection();
        let row = TestFixtures::create_in_app(&mut conn, "u1", "a");

        set_archived(&mut conn, row.id, "u1", true).unwrap();
        assert!(list_for_user(&mut conn, "u1", 10, 0, false).unwrap().is_empty());

        // Reopen.
        set_archived(&mut conn, row.id, "u1", false).unwrap();
        assert_eq!(list_for_user(&mut conn, "u1", 10, 0, false).unwrap().len(), 1);
    }
}
