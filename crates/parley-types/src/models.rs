use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role names as stored in the `users.role` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(alias = "superadmin")]
    SuperAdmin,
    Admin,
    ProjectLead,
    Qa,
    AtTester,
    FtTester,
    /// Any role string this service does not recognise. Never privileged.
    #[serde(other)]
    Viewer,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Self::SuperAdmin | Self::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::ProjectLead => "project_lead",
            Self::Qa => "qa",
            Self::AtTester => "at_tester",
            Self::FtTester => "ft_tester",
            Self::Viewer => "viewer",
        }
    }

    /// Lenient conversion for rows written by other tools: unknown strings
    /// fall back to [`Role::Viewer`].
    pub fn from_db(value: &str) -> Self {
        value.parse().unwrap_or(Self::Viewer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            // legacy spelling still present in older user rows
            "super_admin" | "superadmin" => Ok(Self::SuperAdmin),
            "admin" => Ok(Self::Admin),
            "project_lead" => Ok(Self::ProjectLead),
            "qa" => Ok(Self::Qa),
            "at_tester" => Ok(Self::AtTester),
            "ft_tester" => Ok(Self::FtTester),
            "viewer" => Ok(Self::Viewer),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a message lives: organisation-wide, a project, or a single page of
/// a project. A page scope always carries its parent project once resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub project_id: Option<i64>,
    pub page_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Project(i64),
    Page(i64),
}

impl Scope {
    pub fn global() -> Self {
        Self::default()
    }

    pub fn project(project_id: i64) -> Self {
        Self { project_id: Some(project_id), page_id: None }
    }

    pub fn page(project_id: i64, page_id: i64) -> Self {
        Self { project_id: Some(project_id), page_id: Some(page_id) }
    }

    /// The page wins over the project when both are set.
    pub fn kind(&self) -> ScopeKind {
        match (self.project_id, self.page_id) {
            (_, Some(page_id)) => ScopeKind::Page(page_id),
            (Some(project_id), None) => ScopeKind::Project(project_id),
            (None, None) => ScopeKind::Global,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub role: Role,
}

/// Snapshot of the parent message shown inline above a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPreview {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A chat message as returned to clients. `body` is already sanitized and
/// has its upload URLs rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub author: Author,
    pub project_id: Option<i64>,
    pub page_id: Option<i64>,
    pub reply_to: Option<i64>,
    pub body: String,
    pub mentions: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub reply_preview: Option<ReplyPreview>,
    pub can_edit: bool,
    pub can_delete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Edit,
    Delete,
}

impl HistoryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for HistoryAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "edit" => Ok(Self::Edit),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown history action: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: i64,
    pub message_id: i64,
    pub action: HistoryAction,
    pub old_body: String,
    pub new_body: String,
    pub actor_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub kind: String,
    pub message: String,
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_roles() {
        assert!(Role::SuperAdmin.is_admin());
        assert!(Role::Admin.is_admin());
        assert!(!Role::ProjectLead.is_admin());
        assert!(!Role::Viewer.is_admin());
    }

    #[test]
    fn role_parsing_accepts_legacy_spelling() {
        assert_eq!("superadmin".parse::<Role>(), Ok(Role::SuperAdmin));
        assert_eq!("at_tester".parse::<Role>(), Ok(Role::AtTester));
        assert!("janitor".parse::<Role>().is_err());
        assert_eq!(Role::from_db("janitor"), Role::Viewer);
    }

    #[test]
    fn role_serializes_as_stored_name() {
        let json = serde_json::to_string(&Role::ProjectLead).unwrap();
        assert_eq!(json, "\"project_lead\"");
    }

    #[test]
    fn scope_kind_prefers_page() {
        assert_eq!(Scope::global().kind(), ScopeKind::Global);
        assert_eq!(Scope::project(4).kind(), ScopeKind::Project(4));
        assert_eq!(Scope::page(4, 9).kind(), ScopeKind::Page(9));
        let orphan_page = Scope { project_id: None, page_id: Some(9) };
        assert_eq!(orphan_page.kind(), ScopeKind::Page(9));
    }
}
