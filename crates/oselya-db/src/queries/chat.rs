use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};

use super::OptionalExt;
use crate::Database;
use crate::models::{ChatMessageRow, ThreadRow, UserRef};

const THREAD_SELECT: &str = "SELECT t.id, t.listing_id, l.title,
        t.landlord_id, lu.username, COALESCE(lp.full_name, ''), lp.last_seen_at,
        t.tenant_id, tu.username, COALESCE(tp.full_name, ''), tp.last_seen_at,
        t.created_at, t.updated_at
     FROM chat_threads t
     JOIN listings l ON l.id = t.listing_id
     JOIN users lu ON lu.id = t.landlord_id
     LEFT JOIN profiles lp ON lp.user_id = t.landlord_id
     JOIN users tu ON tu.id = t.tenant_id
     LEFT JOIN profiles tp ON tp.user_id = t.tenant_id";

const MESSAGE_COLUMNS: &str = "id, thread_id, sender_id, recipient_id, text, created_at, is_read";

impl Database {
    // -- Threads --

    /// Return the thread for the triple, creating it if needed.
    ///
    /// The UNIQUE(listing, landlord, tenant) constraint decides which insert
    /// wins; a losing insert is a no-op and the existing row is read back.
    /// The flag is true only for the caller whose insert created the row.
    pub fn get_or_create_thread(
        &self,
        listing_id: i64,
        landlord_id: i64,
        tenant_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(i64, bool)> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO chat_threads (listing_id, landlord_id, tenant_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT (listing_id, landlord_id, tenant_id) DO NOTHING",
                rusqlite::params![listing_id, landlord_id, tenant_id, now],
            )?;
            let id: i64 = conn.query_row(
                "SELECT id FROM chat_threads WHERE listing_id = ?1 AND landlord_id = ?2 AND tenant_id = ?3",
                [listing_id, landlord_id, tenant_id],
                |row| row.get(0),
            )?;
            Ok((id, inserted == 1))
        })
    }

    pub fn find_thread(
        &self,
        listing_id: i64,
        landlord_id: i64,
        tenant_id: i64,
    ) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id FROM chat_threads WHERE listing_id = ?1 AND landlord_id = ?2 AND tenant_id = ?3",
                [listing_id, landlord_id, tenant_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    pub fn get_thread(&self, id: i64) -> Result<Option<ThreadRow>> {
        self.with_conn(|conn| {
            conn.query_row(&format!("{THREAD_SELECT} WHERE t.id = ?1"), [id], map_thread)
                .optional()
        })
    }

    /// Threads on the user's own listings, most recently active first.
    pub fn threads_as_landlord(&self, user_id: i64) -> Result<Vec<ThreadRow>> {
        self.with_conn(|conn| query_threads(conn, "t.landlord_id = ?1", user_id))
    }

    /// Threads the user opened about someone else's listing.
    pub fn threads_as_tenant(&self, user_id: i64) -> Result<Vec<ThreadRow>> {
        self.with_conn(|conn| query_threads(conn, "t.tenant_id = ?1", user_id))
    }

    /// Threads holding at least one unread message addressed to the user.
    pub fn threads_with_unread(&self, user_id: i64) -> Result<Vec<ThreadRow>> {
        self.with_conn(|conn| {
            query_threads(
                conn,
                "t.id IN (SELECT thread_id FROM chat_messages WHERE recipient_id = ?1 AND is_read = 0)",
                user_id,
            )
        })
    }

    // -- Messages --

    /// Append a message and bump the thread's activity time in one transaction.
    pub fn insert_chat_message(
        &self,
        thread_id: i64,
        sender_id: i64,
        recipient_id: i64,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<ChatMessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO chat_messages (thread_id, sender_id, recipient_id, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![thread_id, sender_id, recipient_id, text, now],
            )?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "UPDATE chat_threads SET updated_at = ?2 WHERE id = ?1",
                rusqlite::params![thread_id, now],
            )?;
            tx.commit()?;

            Ok(ChatMessageRow {
                id,
                thread_id,
                sender_id,
                recipient_id,
                text: text.to_string(),
                created_at: now,
                is_read: false,
            })
        })
    }

    /// Messages with id strictly greater than `after_id`, ascending.
    /// Read-only: does not touch read flags.
    pub fn messages_after(&self, thread_id: i64, after_id: i64) -> Result<Vec<ChatMessageRow>> {
        self.with_conn(|conn| query_messages_after(conn, thread_id, after_id))
    }

    /// Poll a thread: return every message after `after_id` and, in the same
    /// transaction, mark the returned ones addressed to `reader_id` as read.
    ///
    /// Rows come back with the read flag as it was before this call.
    pub fn fetch_after(
        &self,
        thread_id: i64,
        reader_id: i64,
        after_id: i64,
    ) -> Result<Vec<ChatMessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let rows = query_messages_after(&tx, thread_id, after_id)?;
            if let Some(last) = rows.last() {
                tx.execute(
                    "UPDATE chat_messages SET is_read = 1
                     WHERE thread_id = ?1 AND recipient_id = ?2 AND is_read = 0
                       AND id > ?3 AND id <= ?4",
                    [thread_id, reader_id, after_id, last.id],
                )?;
            }
            tx.commit()?;
            Ok(rows)
        })
    }

    /// Mark every unread message addressed to `reader_id` in the thread as read.
    pub fn mark_thread_read(&self, thread_id: i64, reader_id: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE chat_messages SET is_read = 1
                 WHERE thread_id = ?1 AND recipient_id = ?2 AND is_read = 0",
                [thread_id, reader_id],
            )?;
            Ok(changed)
        })
    }

    pub fn unread_count(&self, user_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM chat_messages WHERE recipient_id = ?1 AND is_read = 0",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

fn query_threads(conn: &Connection, condition: &str, user_id: i64) -> Result<Vec<ThreadRow>> {
    let mut stmt = conn.prepare(&format!(
        "{THREAD_SELECT} WHERE {condition} ORDER BY t.updated_at DESC, t.id DESC"
    ))?;
    let rows = stmt
        .query_map([user_id], map_thread)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_messages_after(
    conn: &Connection,
    thread_id: i64,
    after_id: i64,
) -> Result<Vec<ChatMessageRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM chat_messages
         WHERE thread_id = ?1 AND id > ?2
         ORDER BY id ASC"
    ))?;
    let rows = stmt
        .query_map([thread_id, after_id], map_message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn map_thread(row: &Row<'_>) -> rusqlite::Result<ThreadRow> {
    Ok(ThreadRow {
        id: row.get(0)?,
        listing_id: row.get(1)?,
        listing_title: row.get(2)?,
        landlord: UserRef {
            id: row.get(3)?,
            username: row.get(4)?,
            full_name: row.get(5)?,
            last_seen_at: row.get(6)?,
        },
        tenant: UserRef {
            id: row.get(7)?,
            username: row.get(8)?,
            full_name: row.get(9)?,
            last_seen_at: row.get(10)?,
        },
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<ChatMessageRow> {
    Ok(ChatMessageRow {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        sender_id: row.get(2)?,
        recipient_id: row.get(3)?,
        text: row.get(4)?,
        created_at: row.get(5)?,
        is_read: row.get(6)?,
    })
}
