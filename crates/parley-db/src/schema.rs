use std::collections::HashSet;
use std::fmt;

use anyhow::{Result, bail};
use rusqlite::Connection;

/// Columns the chat core cannot work without.
const REQUIRED_MESSAGE_COLUMNS: &[&str] = &[
    "id",
    "project_id",
    "page_id",
    "user_id",
    "message",
    "mentions",
    "created_at",
    "edited_at",
    "deleted_at",
];

/// What the connected schema supports beyond the required core. Probed once
/// when the database is opened and consulted instead of retrying failed
/// statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaCapabilities {
    /// `chat_messages.reply_to` exists.
    pub reply_to: bool,
    /// `notifications` table exists.
    pub notifications: bool,
    /// `activity_log` table exists.
    pub activity_log: bool,
}

impl SchemaCapabilities {
    pub fn probe(conn: &Connection) -> Result<Self> {
        let columns = table_columns(conn, "chat_messages")?;
        if columns.is_empty() {
            bail!("chat_messages table is missing");
        }

        let missing: Vec<&str> = REQUIRED_MESSAGE_COLUMNS
            .iter()
            .copied()
            .filter(|c| !columns.contains(*c))
            .collect();
        if !missing.is_empty() {
            bail!("chat_messages is missing required columns: {}", missing.join(", "));
        }

        if !table_exists(conn, "chat_message_history")? {
            bail!("chat_message_history table is missing");
        }

        Ok(Self {
            reply_to: columns.contains("reply_to"),
            notifications: table_exists(conn, "notifications")?,
            activity_log: table_exists(conn, "activity_log")?,
        })
    }
}

impl fmt::Display for SchemaCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "reply_to={} notifications={} activity_log={}",
            self.reply_to, self.notifications, self.activity_log
        )
    }
}

pub(crate) fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(names)
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
