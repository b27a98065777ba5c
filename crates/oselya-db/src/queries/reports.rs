use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Row;

use oselya_types::models::{ListingStatus, ModerationStatus, ReportReason};

use super::notifications::insert_notification_tx;
use super::{OptionalExt, parse_col};
use crate::Database;
use crate::models::{NewNotification, ReportRow, ReviewUpdate};

const REPORT_SELECT: &str = "SELECT r.id, r.listing_id, l.title, l.owner_id, l.status,
        r.reporter_id, r.reason, r.description, r.moderation_status, r.moderation_reason,
        r.reviewed_at, r.reviewed_by, r.created_at
     FROM listing_reports r
     JOIN listings l ON l.id = r.listing_id";

impl Database {
    pub fn insert_report(
        &self,
        listing_id: i64,
        reporter_id: i64,
        reason: ReportReason,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO listing_reports (listing_id, reporter_id, reason, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![listing_id, reporter_id, reason.as_str(), description, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_report(&self, id: i64) -> Result<Option<ReportRow>> {
        self.with_conn(|conn| {
            conn.query_row(&format!("{REPORT_SELECT} WHERE r.id = ?1"), [id], map_report)
                .optional()
        })
    }

    /// All reports, newest first.
    pub fn list_reports(&self) -> Result<Vec<ReportRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{REPORT_SELECT} ORDER BY r.created_at DESC, r.id DESC"))?;
            let rows = stmt
                .query_map([], map_report)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Persist a moderation decision together with its side effects.
    ///
    /// The report update, the optional listing block and every notification
    /// commit or roll back as one unit. The update only applies while the
    /// report is still in `expected`; otherwise nothing is written and the
    /// call returns false.
    pub fn apply_review(
        &self,
        report_id: i64,
        expected: ModerationStatus,
        review: &ReviewUpdate,
        block_listing: Option<i64>,
        notifications: &[NewNotification],
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE listing_reports
                 SET moderation_status = ?2, moderation_reason = ?3, reviewed_by = ?4, reviewed_at = ?5
                 WHERE id = ?1 AND moderation_status = ?6",
                rusqlite::params![
                    report_id,
                    review.status.as_str(),
                    review.moderation_reason,
                    review.reviewed_by,
                    review.reviewed_at,
                    expected.as_str(),
                ],
            )?;
            if updated == 0 {
                return Ok(false);
            }

            if let Some(listing_id) = block_listing {
                tx.execute(
                    "UPDATE listings SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status != ?2",
                    rusqlite::params![listing_id, ListingStatus::Blocked.as_str(), now],
                )?;
            }

            for notification in notifications {
                insert_notification_tx(&tx, notification, now)?;
            }

            tx.commit()?;
            Ok(true)
        })
    }
}

fn map_report(row: &Row<'_>) -> rusqlite::Result<ReportRow> {
    Ok(ReportRow {
        id: row.get(0)?,
        listing_id: row.get(1)?,
        listing_title: row.get(2)?,
        listing_owner_id: row.get(3)?,
        listing_status: parse_col(row, 4)?,
        reporter_id: row.get(5)?,
        reason: parse_col(row, 6)?,
        description: row.get(7)?,
        moderation_status: parse_col(row, 8)?,
        moderation_reason: row.get(9)?,
        reviewed_at: row.get(10)?,
        reviewed_by: row.get(11)?,
        created_at: row.get(12)?,
    })
}
