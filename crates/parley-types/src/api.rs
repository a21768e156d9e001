use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{HistoryEntry, Message, Notification, Role, Scope};

// -- JWT Claims --

/// Claims carried by the bearer tokens the main application issues.
/// `sub` is the numeric user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

// -- Form helpers --

/// Optional numeric id coming from a form or query string. The chat widget
/// sends `""`, `"null"` or `"0"` when no id applies.
pub fn optional_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("" | "null" | "0") => Ok(None),
        Some(value) => match value.parse::<i64>() {
            Ok(id) if id > 0 => Ok(Some(id)),
            _ => Err(serde::de::Error::custom(format!("invalid id: {value}"))),
        },
    }
}

// -- Messages --

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
    #[serde(default, deserialize_with = "optional_id")]
    pub project_id: Option<i64>,
    #[serde(default, deserialize_with = "optional_id")]
    pub page_id: Option<i64>,
    #[serde(default, deserialize_with = "optional_id")]
    pub reply_to: Option<i64>,
}

impl SendMessageRequest {
    pub fn scope(&self) -> Scope {
        Scope { project_id: self.project_id, page_id: self.page_id }
    }
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct FetchMessagesQuery {
    #[serde(default, deserialize_with = "optional_id")]
    pub project_id: Option<i64>,
    #[serde(default, deserialize_with = "optional_id")]
    pub page_id: Option<i64>,
    #[serde(default)]
    pub last_id: i64,
}

impl FetchMessagesQuery {
    pub fn scope(&self) -> Scope {
        Scope { project_id: self.project_id, page_id: self.page_id }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub success: bool,
    pub message: Message,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesEnvelope {
    pub success: bool,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryEnvelope {
    pub success: bool,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
}

// -- Notifications --

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsResponse {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    #[serde(default, deserialize_with = "optional_id")]
    pub id: Option<i64>,
}
