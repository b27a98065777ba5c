use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};

use super::OptionalExt;
use crate::Database;
use crate::models::{ProfileRow, UserRef, UserRow};

const USER_COLUMNS: &str =
    "id, username, email, password, first_name, last_name, is_staff, created_at";

impl Database {
    // -- Users --

    /// Insert a user together with their empty profile.
    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO users (username, email, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![username, email, password_hash, now],
            )?;
            let id = tx.last_insert_rowid();
            tx.execute("INSERT INTO profiles (user_id) VALUES (?1)", [id])?;
            tx.commit()?;
            Ok(id)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                [username],
                map_user,
            )
            .optional()
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id],
                map_user,
            )
            .optional()
        })
    }

    pub fn email_taken(&self, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE lower(email) = lower(?1)",
                [email],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Returns false when no such user exists.
    pub fn set_staff(&self, username: &str, is_staff: bool) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_staff = ?2 WHERE username = ?1",
                rusqlite::params![username, is_staff],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get_user_ref(&self, id: i64) -> Result<Option<UserRef>> {
        self.with_conn(|conn| query_user_ref(conn, id))
    }

    // -- Profiles --

    /// Fetch a profile, creating the default one if the user has none yet.
    pub fn get_profile(&self, user_id: i64) -> Result<ProfileRow> {
        self.with_conn_mut(|conn| {
            conn.execute("INSERT OR IGNORE INTO profiles (user_id) VALUES (?1)", [user_id])?;
            let row = conn.query_row(
                "SELECT user_id, full_name, phone, avatar, last_seen_at FROM profiles WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok(ProfileRow {
                        user_id: row.get(0)?,
                        full_name: row.get(1)?,
                        phone: row.get(2)?,
                        avatar: row.get(3)?,
                        last_seen_at: row.get(4)?,
                    })
                },
            )?;
            Ok(row)
        })
    }

    pub fn update_profile(
        &self,
        user_id: i64,
        first_name: &str,
        last_name: &str,
        phone: &str,
    ) -> Result<()> {
        let full_name = format!("{} {}", first_name, last_name).trim().to_string();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE users SET first_name = ?2, last_name = ?3 WHERE id = ?1",
                rusqlite::params![user_id, first_name, last_name],
            )?;
            tx.execute(
                "INSERT INTO profiles (user_id, full_name, phone) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET full_name = excluded.full_name, phone = excluded.phone",
                rusqlite::params![user_id, full_name, phone],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Presence heartbeat; creates the profile if it is missing.
    pub fn touch_last_seen(&self, user_id: i64, now: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO profiles (user_id, last_seen_at) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET last_seen_at = excluded.last_seen_at",
                rusqlite::params![user_id, now],
            )?;
            Ok(())
        })
    }
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        is_staff: row.get(6)?,
        created_at: row.get(7)?,
    })
}

pub(crate) fn query_user_ref(conn: &Connection, id: i64) -> Result<Option<UserRef>> {
    conn.query_row(
        "SELECT u.id, u.username, COALESCE(p.full_name, ''), p.last_seen_at
         FROM users u
         LEFT JOIN profiles p ON p.user_id = u.id
         WHERE u.id = ?1",
        [id],
        |row| {
            Ok(UserRef {
                id: row.get(0)?,
                username: row.get(1)?,
                full_name: row.get(2)?,
                last_seen_at: row.get(3)?,
            })
        },
    )
    .optional()
}
