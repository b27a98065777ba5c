use anyhow::Result;
use chrono::{DateTime, Utc};

use super::listings::{LISTING_COLUMNS, map_listing};
use crate::Database;
use crate::models::FavoriteRow;

impl Database {
    /// Toggle a favorite: removes if it exists, inserts if not.
    /// Returns true when the listing is now a favorite.
    pub fn toggle_favorite(&self, user_id: i64, listing_id: i64, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM favorites WHERE user_id = ?1 AND listing_id = ?2",
                [user_id, listing_id],
            )?;
            if removed == 0 {
                tx.execute(
                    "INSERT INTO favorites (user_id, listing_id, created_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT (user_id, listing_id) DO NOTHING",
                    rusqlite::params![user_id, listing_id, now],
                )?;
            }
            tx.commit()?;
            Ok(removed == 0)
        })
    }

    pub fn is_favorite(&self, user_id: i64, listing_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM favorites WHERE user_id = ?1 AND listing_id = ?2",
                [user_id, listing_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    pub fn favorite_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT listing_id FROM favorites WHERE user_id = ?1 ORDER BY listing_id")?;
            let ids = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<i64>, _>>()?;
            Ok(ids)
        })
    }

    /// Bookmarked listings with the time they were saved, newest first.
    pub fn favorites_for(&self, user_id: i64) -> Result<Vec<FavoriteRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LISTING_COLUMNS}, f.created_at
                 FROM favorites f
                 JOIN listings l ON l.id = f.listing_id
                 WHERE f.user_id = ?1
                 ORDER BY f.created_at DESC, f.id DESC"
            ))?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(FavoriteRow {
                        listing: map_listing(row)?,
                        created_at: row.get(20)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn favorites_count(&self, user_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM favorites WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}
