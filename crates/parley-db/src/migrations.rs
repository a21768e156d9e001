use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use crate::schema::table_columns;

pub const LATEST_VERSION: i64 = 3;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Chat DB: running migration v1 (directory + messages)");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                username    TEXT NOT NULL UNIQUE,
                full_name   TEXT NOT NULL DEFAULT '',
                role        TEXT NOT NULL DEFAULT 'viewer',
                is_active   INTEGER NOT NULL DEFAULT 1,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS projects (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                title           TEXT NOT NULL,
                project_lead_id INTEGER REFERENCES users(id),
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS project_pages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id      INTEGER NOT NULL REFERENCES projects(id),
                page_name       TEXT NOT NULL,
                at_tester_id    INTEGER REFERENCES users(id),
                ft_tester_id    INTEGER REFERENCES users(id),
                qa_id           INTEGER REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS user_assignments (
                project_id  INTEGER NOT NULL REFERENCES projects(id),
                user_id     INTEGER NOT NULL REFERENCES users(id),
                PRIMARY KEY (project_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS chat_messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id  INTEGER REFERENCES projects(id),
                page_id     INTEGER REFERENCES project_pages(id),
                user_id     INTEGER NOT NULL REFERENCES users(id),
                message     TEXT NOT NULL,
                mentions    TEXT NOT NULL DEFAULT '[]',
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_chat_messages_scope
                ON chat_messages(project_id, page_id, id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Chat DB: running migration v2 (replies, edit/delete, history)");
        // databases created by the main application may already have some
        // of these columns without any schema_version rows
        let existing = table_columns(conn, "chat_messages")?;
        for (column, decl) in [("reply_to", "INTEGER"), ("edited_at", "TEXT"), ("deleted_at", "TEXT")] {
            if !existing.contains(column) {
                conn.execute_batch(&format!("ALTER TABLE chat_messages ADD COLUMN {column} {decl};"))?;
            }
        }
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS chat_message_history (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id      INTEGER NOT NULL REFERENCES chat_messages(id),
                action          TEXT NOT NULL CHECK (action IN ('edit', 'delete')),
                old_message     TEXT NOT NULL,
                new_message     TEXT NOT NULL,
                user_id         INTEGER NOT NULL REFERENCES users(id),
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_chat_message_history_message
                ON chat_message_history(message_id, id);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    if version < 3 {
        info!("Chat DB: running migration v3 (notifications, activity log)");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS notifications (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id),
                type        TEXT NOT NULL,
                message     TEXT NOT NULL,
                link        TEXT,
                is_read     INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_notifications_unread
                ON notifications(user_id, is_read, created_at);

            CREATE TABLE IF NOT EXISTS activity_log (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL,
                action      TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id   INTEGER,
                details     TEXT,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            INSERT INTO schema_version (version) VALUES (3);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adopts_unversioned_schema_with_chat_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE chat_messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id  INTEGER,
                page_id     INTEGER,
                user_id     INTEGER NOT NULL,
                message     TEXT NOT NULL,
                mentions    TEXT NOT NULL DEFAULT '[]',
                reply_to    INTEGER,
                edited_at   TEXT,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );
            INSERT INTO chat_messages (user_id, message) VALUES (1, 'kept');
            ",
        )
        .unwrap();

        run(&conn).unwrap();

        let columns = table_columns(&conn, "chat_messages").unwrap();
        assert!(["reply_to", "edited_at", "deleted_at"].iter().all(|c| columns.contains(*c)));
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, LATEST_VERSION);
        let body: String = conn
            .query_row("SELECT message FROM chat_messages", [], |r| r.get(0))
            .unwrap();
        assert_eq!(body, "kept");

        // second run is a no-op
        run(&conn).unwrap();
    }
}
