use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};

use super::parse_col;
use crate::Database;
use crate::models::{NewNotification, NotificationRow};

const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, related_report_id, notification_type, title, message, is_active, created_at";

impl Database {
    pub fn insert_notification(&self, new: &NewNotification, now: DateTime<Utc>) -> Result<i64> {
        self.with_conn_mut(|conn| insert_notification_tx(conn, new, now))
    }

    /// The user's inbox: active notifications addressed to them or to
    /// everyone, newest first.
    pub fn notifications_for(&self, user_id: i64) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                 WHERE is_active = 1 AND (recipient_id = ?1 OR recipient_id IS NULL)
                 ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map([user_id], map_notification)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Every notification generated by a report, oldest first.
    pub fn notifications_for_report(&self, report_id: i64) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                 WHERE related_report_id = ?1 ORDER BY id ASC"
            ))?;
            let rows = stmt
                .query_map([report_id], map_notification)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Retire a notification. Returns false when the id is unknown.
    pub fn deactivate_notification(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed =
                conn.execute("UPDATE notifications SET is_active = 0 WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }
}

pub(crate) fn insert_notification_tx(
    conn: &Connection,
    new: &NewNotification,
    now: DateTime<Utc>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO notifications (recipient_id, related_report_id, notification_type, title, message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            new.recipient_id,
            new.related_report_id,
            new.notification_type.as_str(),
            new.title,
            new.message,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn map_notification(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        recipient_id: row.get(1)?,
        related_report_id: row.get(2)?,
        notification_type: parse_col(row, 3)?,
        title: row.get(4)?,
        message: row.get(5)?,
        is_active: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use oselya_types::models::NotificationType;

    use super::*;
    use crate::queries::fixtures::{t0, user};

    fn note(recipient: Option<i64>, title: &str) -> NewNotification {
        NewNotification {
            recipient_id: recipient,
            related_report_id: None,
            notification_type: NotificationType::SiteUpdate,
            title: title.to_string(),
            message: String::new(),
        }
    }

    #[test]
    fn inbox_mixes_targeted_and_broadcast_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let olena = user(&db, "olena");
        let taras = user(&db, "taras");

        db.insert_notification(&note(None, "broadcast"), t0()).unwrap();
        db.insert_notification(&note(Some(olena), "for olena"), t0() + Duration::hours(1))
            .unwrap();
        db.insert_notification(&note(Some(taras), "for taras"), t0() + Duration::hours(2))
            .unwrap();
        let retired = db
            .insert_notification(&note(None, "retired"), t0() + Duration::hours(3))
            .unwrap();
        assert!(db.deactivate_notification(retired).unwrap());

        let titles: Vec<String> = db
            .notifications_for(olena)
            .unwrap()
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(titles, ["for olena", "broadcast"]);
    }

    #[test]
    fn deactivating_unknown_notification_reports_false() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.deactivate_notification(42).unwrap());
    }
}
