use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                username    TEXT NOT NULL UNIQUE,
                email       TEXT NOT NULL,
                password    TEXT NOT NULL,
                first_name  TEXT NOT NULL DEFAULT '',
                last_name   TEXT NOT NULL DEFAULT '',
                is_staff    INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE UNIQUE INDEX idx_users_email ON users(lower(email));

            CREATE TABLE profiles (
                user_id      INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                full_name    TEXT NOT NULL DEFAULT '',
                phone        TEXT NOT NULL DEFAULT '',
                avatar       TEXT NOT NULL DEFAULT 'profile_avatars/defolticon.png',
                last_seen_at TEXT
            );

            CREATE TABLE listings (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id         INTEGER REFERENCES users(id) ON DELETE CASCADE,
                title            TEXT NOT NULL,
                address          TEXT NOT NULL,
                price_per_month  TEXT NOT NULL,
                floor            INTEGER,
                total_floors     INTEGER,
                heating          TEXT,
                pets             TEXT,
                rooms            TEXT NOT NULL,
                area_sqm         TEXT,
                description      TEXT NOT NULL DEFAULT '',
                contact_name     TEXT NOT NULL,
                contact_phone    TEXT NOT NULL DEFAULT '',
                contact_email    TEXT NOT NULL DEFAULT '',
                status           TEXT NOT NULL DEFAULT 'published',
                views_count      INTEGER NOT NULL DEFAULT 0,
                is_active        INTEGER NOT NULL DEFAULT 1,
                created_at       TEXT NOT NULL,
                updated_at       TEXT NOT NULL
            );

            CREATE INDEX idx_listings_owner ON listings(owner_id);
            CREATE INDEX idx_listings_catalog ON listings(is_active, status, created_at);

            CREATE TABLE favorites (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                listing_id  INTEGER NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                UNIQUE(user_id, listing_id)
            );

            CREATE TABLE chat_threads (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                listing_id   INTEGER NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
                landlord_id  INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                tenant_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL,
                UNIQUE(listing_id, landlord_id, tenant_id)
            );

            CREATE INDEX idx_threads_landlord ON chat_threads(landlord_id, updated_at);
            CREATE INDEX idx_threads_tenant ON chat_threads(tenant_id, updated_at);

            CREATE TABLE chat_messages (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id     INTEGER NOT NULL REFERENCES chat_threads(id) ON DELETE CASCADE,
                sender_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                recipient_id  INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                text          TEXT NOT NULL,
                created_at    TEXT NOT NULL,
                is_read       INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_chat_messages_thread ON chat_messages(thread_id, id);
            CREATE INDEX idx_chat_messages_unread ON chat_messages(recipient_id, is_read);

            CREATE TABLE listing_reports (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                listing_id         INTEGER NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
                reporter_id        INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                reason             TEXT NOT NULL,
                description        TEXT NOT NULL,
                moderation_status  TEXT NOT NULL DEFAULT 'pending',
                moderation_reason  TEXT NOT NULL DEFAULT '',
                reviewed_at        TEXT,
                reviewed_by        INTEGER REFERENCES users(id) ON DELETE SET NULL,
                created_at         TEXT NOT NULL
            );

            CREATE TABLE notifications (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                recipient_id       INTEGER REFERENCES users(id) ON DELETE CASCADE,
                related_report_id  INTEGER REFERENCES listing_reports(id) ON DELETE SET NULL,
                notification_type  TEXT NOT NULL DEFAULT 'other',
                title              TEXT NOT NULL,
                message            TEXT NOT NULL,
                is_active          INTEGER NOT NULL DEFAULT 1,
                created_at         TEXT NOT NULL
            );

            CREATE INDEX idx_notifications_recipient ON notifications(recipient_id, is_active);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
