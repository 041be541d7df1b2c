//! Template Repository

use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbConnection;
use crate::models::{NewNotificationTemplate, NotificationTemplate};
use crate::schema::notification_templates;

pub fn create(
    conn: &mut DbConnection,
    new_template: NewNotificationTemplate,
) -> Result<NotificationTemplate, diesel::result::Error> {
    diesel::insert_into(notification_templates::table)
        .values(&new_template)
        .get_result(conn)
}

pub fn get(
    conn: &mut DbConnection,
    template_id: Uuid,
) -> Result<NotificationTemplate, diesel::result::Error> {
    notification_templates::table.find(template_id).first(conn)
}

pub fn list(conn: &mut DbConnection) -> Result<Vec<NotificationTemplate>, diesel::result::Error> {
    notification_templates::table
        .order(notification_templates::created_at.desc())
        .load::<NotificationTemplate>(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{setup_test_connection, TestFixtures};

    #[test]
    fn create_get_and_list() {
        let mut conn = setup_test_connection();
        let template = TestFixtures::create_template(&mut conn, "welcome_email", "email", "Hi {{name}}");

        let fetched = get(&mut conn, template.id).unwrap();
        assert_eq!(fetched.name, "welcome_email");
        assert_eq!(fetched.kind, "email");

        let all = list(&mut conn).unwrap();
        assert!(all.iter().any(|t| t.id == template.id));
    }

    #[test]
    fn get_unknown_is_not_found() {
        let mut conn = setup_test_connection();
        assert!(matches!(
            get(&mut conn, Uuid::new_v4()),
            Err(diesel::result::Error::NotFound)
        ));
    }
}
