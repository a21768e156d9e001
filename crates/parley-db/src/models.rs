//! Database row types. These map directly to SQLite rows and stay
//! independent of the API models in parley-types.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub role: String,
    pub is_active: bool,
}

/// A chat message joined with its author.
pub struct MessageRow {
    pub id: i64,
    pub project_id: Option<i64>,
    pub page_id: Option<i64>,
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    pub role: String,
    pub message: String,
    pub mentions: String,
    pub reply_to: Option<i64>,
    pub created_at: String,
    pub edited_at: Option<String>,
    pub deleted_at: Option<String>,
}

impl MessageRow {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

pub struct NewMessage<'a> {
    pub project_id: Option<i64>,
    pub page_id: Option<i64>,
    pub user_id: i64,
    pub message: &'a str,
    pub mentions: &'a str,
    pub reply_to: Option<i64>,
}

pub struct HistoryRow {
    pub id: i64,
    pub message_id: i64,
    pub action: String,
    pub old_message: String,
    pub new_message: String,
    pub user_id: i64,
    pub created_at: String,
}

pub struct PageRow {
    pub id: i64,
    pub project_id: i64,
    pub page_name: String,
    pub at_tester_id: Option<i64>,
    pub ft_tester_id: Option<i64>,
    pub qa_id: Option<i64>,
}

pub struct NotificationRow {
    pub id: i64,
    pub user_id: i64,
    pub kind: String,
    pub message: String,
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}
