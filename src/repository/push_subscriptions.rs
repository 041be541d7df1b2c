//! Push Subscription Repository
//!
//! Rows are unique on `(user_id, device_token, platform)`; re-registering
//! an existing device reactivates the row instead of inserting a duplicate.

use chrono::Utc;
use diesel::prelude::*;

use crate::db::DbConnection;
use crate::models::{NewPushSubscription, PushSubscription};
use crate::schema::push_subscriptions;

pub fn upsert(
    conn: &mut DbConnection,
    new_subscription: NewPushSubscription,
) -> Result<PushSubscription, diesel::result::Error> {
    diesel::insert_into(push_subscriptions::table)
        .values(&new_subscription)
        .on_conflict((
            push_subscriptions::user_id,
            push_subscriptions::device_token,
            push_subscriptions::platform,
        ))
        .do_update()
        .set((
            push_subscriptions::is_active.eq(true),
            push_subscriptions::endpoint.eq(new_subscription.endpoint.clone()),
            push_subscriptions::p256dh_key.eq(new_subscription.p256dh_key.clone()),
            push_subscriptions::auth_key.eq(new_subscription.auth_key.clone()),
            push_subscriptions::topics.eq(new_subscription.topics.clone()),
            push_subscriptions::last_used_at.eq(Utc::now().naive_utc()),
        ))
        .get_result(conn)
}

/// Deactivate a device registration. Returns the number of rows touched.
pub fn deactivate(
    conn: &mut DbConnection,
    user: &str,
    token: &str,
) -> Result<usize, diesel::result::Error> {
    diesel::update(
        push_subscriptions::table
            .filter(push_subscriptions::user_id.eq(user))
            .filter(push_subscriptions::device_token.eq(token)),
    )
    .set(push_subscriptions::is_active.eq(false))
    .execute(conn)
}

pub fn active_for_user(
    conn: &mut DbConnection,
    user: &str,
) -> Result<Vec<PushSubscription>, diesel::result::Error> {
    push_subscriptions::table
        .filter(push_subscriptions::user_id.eq(user))
        .filter(push_subscriptions::is_active.eq(true))
        .order(push_subscriptions::created_at.desc())
        .load::<PushSubscription>(conn)
}
