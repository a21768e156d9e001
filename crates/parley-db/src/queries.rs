use crate::Database;
use crate::models::{HistoryRow, MessageRow, NewMessage, NotificationRow, PageRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, Row};

impl Database {
    // -- Users --

    pub fn create_user(&self, username: &str, full_name: &str, role: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (username, full_name, role) VALUES (?1, ?2, ?3)",
                (username, full_name, role),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, full_name, role, is_active FROM users WHERE id = ?1",
                [id],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        full_name: row.get(2)?,
                        role: row.get(3)?,
                        is_active: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Exact, case-sensitive username lookup.
    pub fn get_user_id_by_username(&self, username: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT id FROM users WHERE username = ?1", [username], |row| {
                row.get(0)
            })
            .optional()
        })
    }

    // -- Projects & pages --

    pub fn create_project(&self, title: &str, lead_id: Option<i64>) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO projects (title, project_lead_id) VALUES (?1, ?2)",
                rusqlite::params![title, lead_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn create_page(
        &self,
        project_id: i64,
        page_name: &str,
        at_tester_id: Option<i64>,
        ft_tester_id: Option<i64>,
        qa_id: Option<i64>,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO project_pages (project_id, page_name, at_tester_id, ft_tester_id, qa_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![project_id, page_name, at_tester_id, ft_tester_id, qa_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn assign_user(&self, project_id: i64, user_id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO user_assignments (project_id, user_id) VALUES (?1, ?2)",
                [project_id, user_id],
            )?;
            Ok(())
        })
    }

    pub fn project_exists(&self, project_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT id FROM projects WHERE id = ?1", [project_id], |row| row.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn get_page(&self, page_id: i64) -> Result<Option<PageRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, project_id, page_name, at_tester_id, ft_tester_id, qa_id
                 FROM project_pages WHERE id = ?1",
                [page_id],
                |row| {
                    Ok(PageRow {
                        id: row.get(0)?,
                        project_id: row.get(1)?,
                        page_name: row.get(2)?,
                        at_tester_id: row.get(3)?,
                        ft_tester_id: row.get(4)?,
                        qa_id: row.get(5)?,
                    })
                },
            )
            .optional()
        })
    }

    /// True when the user leads the project or is assigned to it.
    pub fn is_project_member(&self, project_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT p.id FROM projects p
                     LEFT JOIN user_assignments ua ON ua.project_id = p.id AND ua.user_id = ?2
                     WHERE p.id = ?1 AND (p.project_lead_id = ?2 OR ua.user_id IS NOT NULL)
                     LIMIT 1",
                    [project_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Messages --

    /// Insert a message and return its id. `reply_to` is dropped when the
    /// schema has no column for it.
    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<i64> {
        let with_reply = self.schema().reply_to;
        self.with_conn_mut(|conn| {
            if with_reply {
                conn.execute(
                    "INSERT INTO chat_messages (project_id, page_id, user_id, message, mentions, reply_to)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        msg.project_id,
                        msg.page_id,
                        msg.user_id,
                        msg.message,
                        msg.mentions,
                        msg.reply_to
                    ],
                )?;
            } else {
                conn.execute(
                    "INSERT INTO chat_messages (project_id, page_id, user_id, message, mentions)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        msg.project_id,
                        msg.page_id,
                        msg.user_id,
                        msg.message,
                        msg.mentions
                    ],
                )?;
            }
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        let sql = format!("{} WHERE m.id = ?1", self.message_select());
        self.with_conn(|conn| conn.query_row(&sql, [id], map_message_row).optional())
    }

    /// Messages newer than `last_id` in one scope, oldest first. A page id
    /// selects that page; otherwise a project id selects the project's own
    /// thread (page messages excluded); with neither, the global thread.
    pub fn get_messages_since(
        &self,
        project_id: Option<i64>,
        page_id: Option<i64>,
        last_id: i64,
    ) -> Result<Vec<MessageRow>> {
        let base = self.message_select();
        self.with_conn(|conn| match (project_id, page_id) {
            (_, Some(page_id)) => query_messages(
                conn,
                &format!("{base} WHERE m.id > ?1 AND m.page_id = ?2 ORDER BY m.id ASC"),
                rusqlite::params![last_id, page_id],
            ),
            (Some(project_id), None) => query_messages(
                conn,
                &format!(
                    "{base} WHERE m.id > ?1 AND m.project_id = ?2 AND m.page_id IS NULL ORDER BY m.id ASC"
                ),
                rusqlite::params![last_id, project_id],
            ),
            (None, None) => query_messages(
                conn,
                &format!(
                    "{base} WHERE m.id > ?1 AND m.project_id IS NULL AND m.page_id IS NULL ORDER BY m.id ASC"
                ),
                rusqlite::params![last_id],
            ),
        })
    }

    /// Replace the body of a live message. Returns the number of rows
    /// changed: 0 when the message is missing or already deleted.
    pub fn update_message_body(
        &self,
        id: i64,
        body: &str,
        mentions: &str,
        edited_at: &str,
    ) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE chat_messages SET message = ?2, mentions = ?3, edited_at = ?4
                 WHERE id = ?1 AND deleted_at IS NULL",
                rusqlite::params![id, body, mentions, edited_at],
            )?;
            Ok(changed)
        })
    }

    /// Soft-delete a live message. Returns 0 when nothing changed.
    pub fn soft_delete_message(&self, id: i64, placeholder: &str, deleted_at: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE chat_messages SET message = ?2, mentions = '[]', deleted_at = ?3
                 WHERE id = ?1 AND deleted_at IS NULL",
                rusqlite::params![id, placeholder, deleted_at],
            )?;
            Ok(changed)
        })
    }

    fn message_select(&self) -> String {
        // JOIN users to fetch the author in the same query (no N+1)
        let reply_col = if self.schema().reply_to { "m.reply_to" } else { "NULL" };
        format!(
            "SELECT m.id, m.project_id, m.page_id, m.user_id, u.username, u.full_name, u.role,
                    m.message, m.mentions, {reply_col}, m.created_at, m.edited_at, m.deleted_at
             FROM chat_messages m
             LEFT JOIN users u ON m.user_id = u.id"
        )
    }

    // -- History --

    pub fn insert_history(
        &self,
        message_id: i64,
        action: &str,
        old_message: &str,
        new_message: &str,
        user_id: i64,
        created_at: &str,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO chat_message_history (message_id, action, old_message, new_message, user_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![message_id, action, old_message, new_message, user_id, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// All history for a message, newest first.
    pub fn get_history(&self, message_id: i64) -> Result<Vec<HistoryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, message_id, action, old_message, new_message, user_id, created_at
                 FROM chat_message_history
                 WHERE message_id = ?1
                 ORDER BY id DESC",
            )?;
            let rows = stmt
                .query_map([message_id], |row| {
                    Ok(HistoryRow {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        action: row.get(2)?,
                        old_message: row.get(3)?,
                        new_message: row.get(4)?,
                        user_id: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Notifications --

    pub fn insert_notification(
        &self,
        user_id: i64,
        kind: &str,
        message: &str,
        link: Option<&str>,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO notifications (user_id, type, message, link) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![user_id, kind, message, link],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_unread_notifications(&self, user_id: i64, limit: u32) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, type, message, link, is_read, created_at
                 FROM notifications
                 WHERE user_id = ?1 AND is_read = 0
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], |row| {
                    Ok(NotificationRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        kind: row.get(2)?,
                        message: row.get(3)?,
                        link: row.get(4)?,
                        is_read: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_unread_notifications(&self, user_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                [user_id],
                |row| row.get(0),
            )?)
        })
    }

    /// Mark one notification, or all of the user's, as read.
    pub fn mark_notifications_read(&self, user_id: i64, id: Option<i64>) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = match id {
                Some(id) => conn.execute(
                    "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                    [id, user_id],
                )?,
                None => conn.execute(
                    "UPDATE notifications SET is_read = 1 WHERE user_id = ?1",
                    [user_id],
                )?,
            };
            Ok(changed)
        })
    }

    // -- Activity --

    pub fn log_activity(
        &self,
        user_id: i64,
        action: &str,
        entity_type: &str,
        entity_id: i64,
        details: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO activity_log (user_id, action, entity_type, entity_id, details)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![user_id, action, entity_type, entity_id, details],
            )?;
            Ok(())
        })
    }
}

fn map_message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        page_id: row.get(2)?,
        user_id: row.get(3)?,
        username: row.get::<_, Option<String>>(4)?.unwrap_or_else(|| "unknown".to_string()),
        full_name: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        role: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        message: row.get(7)?,
        mentions: row.get::<_, Option<String>>(8)?.unwrap_or_else(|| "[]".to_string()),
        reply_to: row.get(9)?,
        created_at: row.get(10)?,
        edited_at: row.get(11)?,
        deleted_at: row.get(12)?,
    })
}

fn query_messages(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map_message_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("chat.db")).unwrap();
        (dir, db)
    }

    fn new_message(user_id: i64, project_id: Option<i64>, page_id: Option<i64>, body: &str) -> NewMessage<'_> {
        NewMessage { project_id, page_id, user_id, message: body, mentions: "[]", reply_to: None }
    }

    #[test]
    fn username_lookup_is_case_sensitive() {
        let (_dir, db) = open();
        let id = db.create_user("alice", "Alice A", "qa").unwrap();
        assert_eq!(db.get_user_id_by_username("alice").unwrap(), Some(id));
        assert_eq!(db.get_user_id_by_username("Alice").unwrap(), None);
    }

    #[test]
    fn messages_since_respect_scope_and_cursor() {
        let (_dir, db) = open();
        let user = db.create_user("alice", "Alice", "qa").unwrap();
        let project = db.create_project("Site audit", Some(user)).unwrap();
        let page = db.create_page(project, "Home", None, None, None).unwrap();

        let g1 = db.insert_message(&new_message(user, None, None, "global")).unwrap();
        let p1 = db.insert_message(&new_message(user, Some(project), None, "project")).unwrap();
        let pg1 = db.insert_message(&new_message(user, Some(project), Some(page), "page")).unwrap();
        let p2 = db.insert_message(&new_message(user, Some(project), None, "project 2")).unwrap();

        let global: Vec<i64> = db.get_messages_since(None, None, 0).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(global, vec![g1]);

        let proj: Vec<i64> = db
            .get_messages_since(Some(project), None, 0)
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(proj, vec![p1, p2]);

        let after: Vec<i64> = db
            .get_messages_since(Some(project), None, p1)
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(after, vec![p2]);

        let pages = db.get_messages_since(Some(project), Some(page), 0).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].id, pg1);
        assert_eq!(pages[0].username, "alice");
    }

    #[test]
    fn soft_delete_only_applies_once() {
        let (_dir, db) = open();
        let user = db.create_user("bob", "Bob", "admin").unwrap();
        let id = db.insert_message(&new_message(user, None, None, "<p>hi</p>")).unwrap();

        assert_eq!(db.soft_delete_message(id, "Message deleted", "2026-01-01 00:00:00").unwrap(), 1);
        assert_eq!(db.soft_delete_message(id, "Message deleted", "2026-01-02 00:00:00").unwrap(), 0);
        assert_eq!(db.update_message_body(id, "again", "[]", "2026-01-03 00:00:00").unwrap(), 0);

        let row = db.get_message(id).unwrap().unwrap();
        assert!(row.is_deleted());
        assert_eq!(row.message, "Message deleted");
        assert_eq!(row.deleted_at.as_deref(), Some("2026-01-01 00:00:00"));
    }

    #[test]
    fn history_is_newest_first() {
        let (_dir, db) = open();
        let user = db.create_user("bob", "Bob", "admin").unwrap();
        let id = db.insert_message(&new_message(user, None, None, "a")).unwrap();
        db.insert_history(id, "edit", "a", "b", user, "2026-01-01 00:00:00").unwrap();
        db.insert_history(id, "edit", "b", "c", user, "2026-01-01 00:00:00").unwrap();

        let history = db.get_history(id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].old_message, "b");
        assert_eq!(history[1].old_message, "a");
    }

    #[test]
    fn membership_covers_lead_and_assignment() {
        let (_dir, db) = open();
        let lead = db.create_user("lead", "Lead", "project_lead").unwrap();
        let member = db.create_user("member", "Member", "at_tester").unwrap();
        let outsider = db.create_user("outsider", "Outsider", "at_tester").unwrap();
        let project = db.create_project("Audit", Some(lead)).unwrap();
        db.assign_user(project, member).unwrap();

        assert!(db.is_project_member(project, lead).unwrap());
        assert!(db.is_project_member(project, member).unwrap());
        assert!(!db.is_project_member(project, outsider).unwrap());
        assert!(!db.is_project_member(project + 100, lead).unwrap());
    }

    #[test]
    fn notifications_mark_read() {
        let (_dir, db) = open();
        let user = db.create_user("alice", "Alice", "qa").unwrap();
        let first = db.insert_notification(user, "mention", "one", None).unwrap();
        db.insert_notification(user, "mention", "two", Some("/chat")).unwrap();
        assert_eq!(db.count_unread_notifications(user).unwrap(), 2);

        db.mark_notifications_read(user, Some(first)).unwrap();
        let unread = db.get_unread_notifications(user, 10).unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].message, "two");

        db.mark_notifications_read(user, None).unwrap();
        assert_eq!(db.count_unread_notifications(user).unwrap(), 0);
    }
}
