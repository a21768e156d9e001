use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use parley_db::models::{HistoryRow, MessageRow, NewMessage};
use parley_db::{Database, format_timestamp, parse_timestamp};
use parley_types::models::{
    Author, HistoryAction, HistoryEntry, Message, Notification, ReplyPreview, Role, Scope, ScopeKind,
};
use tracing::{debug, info, warn};

use crate::context::RequestContext;
use crate::error::ChatError;
use crate::mentions::resolve_mentions;
use crate::sanitize::{
    extract_upload_paths, has_embedded_image, has_visible_text, rewrite_upload_urls, sanitize_chat_html,
};
use crate::uploads::UploadStore;

/// Body stored in place of a deleted message.
pub const DELETED_PLACEHOLDER: &str = "Message deleted";

pub const DEFAULT_MAX_BODY_LEN: usize = 5000;

const NOTIFICATION_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Endpoint that serves stored uploads, e.g. `/api/secure_file.php`.
    pub secure_file_base: String,
    /// Maximum body length in bytes.
    pub max_body_len: usize,
    /// Chat page linked from mention notifications.
    pub chat_link: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            secure_file_base: "/api/secure_file.php".to_string(),
            max_body_len: DEFAULT_MAX_BODY_LEN,
            chat_link: "/modules/chat/project_chat.php".to_string(),
        }
    }
}

/// Message lifecycle: send, edit, soft-delete, incremental fetch and
/// history, with authorization and mention resolution in one place.
pub struct ChatService {
    db: Arc<Database>,
    uploads: UploadStore,
    config: ChatConfig,
}

impl ChatService {
    pub fn new(db: Arc<Database>, uploads: UploadStore, config: ChatConfig) -> Self {
        Self { db, uploads, config }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    // -- Operations --

    pub fn send(
        &self,
        ctx: &RequestContext,
        body: &str,
        scope: Scope,
        reply_to: Option<i64>,
    ) -> Result<Message, ChatError> {
        let body = self.validate_body(body)?;
        let scope = self.resolve_scope(ctx, scope)?;
        let mentions = self.resolve_mentions(body);
        let mentions_json = serde_json::to_string(&mentions).map_err(anyhow::Error::from)?;

        let reply_to = match reply_to {
            Some(_) if !self.db.schema().reply_to => {
                debug!("Schema has no reply_to column; dropping reply link");
                None
            }
            Some(parent_id) => self.reply_target(parent_id, scope)?,
            None => None,
        };

        let id = self.db.insert_message(&NewMessage {
            project_id: scope.project_id,
            page_id: scope.page_id,
            user_id: ctx.user_id,
            message: body,
            mentions: &mentions_json,
            reply_to,
        })?;
        info!("Message {} sent by user {} ({:?})", id, ctx.user_id, scope.kind());

        self.notify_mentions(ctx, &mentions, scope);
        self.log_activity(ctx, id, scope);

        let row = self
            .db
            .get_message(id)?
            .ok_or_else(|| anyhow!("message {} missing after insert", id))?;
        Ok(self.render(ctx, row))
    }

    pub fn edit(&self, ctx: &RequestContext, message_id: i64, new_body: &str) -> Result<Message, ChatError> {
        let row = self.db.get_message(message_id)?.ok_or(ChatError::NotFound("message"))?;
        if !ctx.can_modify(row.user_id) {
            return Err(ChatError::unauthorized("You can only edit your own messages"));
        }
        if row.is_deleted() {
            return Err(ChatError::conflict("Deleted messages cannot be edited"));
        }

        let body = self.validate_body(new_body)?;
        let mentions = self.resolve_mentions(body);
        let mentions_json = serde_json::to_string(&mentions).map_err(anyhow::Error::from)?;
        let now = format_timestamp(Utc::now());

        if self.db.update_message_body(message_id, body, &mentions_json, &now)? == 0 {
            // deleted between the read above and this write
            return Err(ChatError::conflict("Deleted messages cannot be edited"));
        }
        self.record_history(message_id, HistoryAction::Edit, &row.message, body, ctx.user_id, &now);
        info!("Message {} edited by user {}", message_id, ctx.user_id);

        let updated = self.db.get_message(message_id)?.ok_or(ChatError::NotFound("message"))?;
        Ok(self.render(ctx, updated))
    }

    /// Soft-delete a message. Deleting an already-deleted message succeeds
    /// without touching it.
    pub fn delete(&self, ctx: &RequestContext, message_id: i64) -> Result<Message, ChatError> {
        let row = self.db.get_message(message_id)?.ok_or(ChatError::NotFound("message"))?;
        if !ctx.can_modify(row.user_id) {
            return Err(ChatError::unauthorized("You can only delete your own messages"));
        }
        if row.is_deleted() {
            return Ok(self.render(ctx, row));
        }

        let now = format_timestamp(Utc::now());
        if self.db.soft_delete_message(message_id, DELETED_PLACEHOLDER, &now)? > 0 {
            self.record_history(
                message_id,
                HistoryAction::Delete,
                &row.message,
                DELETED_PLACEHOLDER,
                ctx.user_id,
                &now,
            );
            let paths = extract_upload_paths(&row.message, &self.config.secure_file_base);
            if !paths.is_empty() {
                let removed = self.uploads.remove_files(&paths);
                debug!("Message {}: removed {} of {} uploads", message_id, removed, paths.len());
            }
            info!("Message {} deleted by user {}", message_id, ctx.user_id);
        }

        let deleted = self.db.get_message(message_id)?.ok_or(ChatError::NotFound("message"))?;
        Ok(self.render(ctx, deleted))
    }

    /// Messages in `scope` with an id above `last_seen_id`, oldest first.
    pub fn fetch_since(
        &self,
        ctx: &RequestContext,
        scope: Scope,
        last_seen_id: i64,
    ) -> Result<Vec<Message>, ChatError> {
        let scope = self.resolve_scope(ctx, scope)?;
        let rows = self
            .db
            .get_messages_since(scope.project_id, scope.page_id, last_seen_id.max(0))?;
        Ok(rows.into_iter().map(|row| self.render(ctx, row)).collect())
    }

    /// Edit/delete history of a message, newest first. Administrators only.
    pub fn fetch_history(&self, ctx: &RequestContext, message_id: i64) -> Result<Vec<HistoryEntry>, ChatError> {
        if !ctx.is_admin() {
            return Err(ChatError::unauthorized("Only administrators can view message history"));
        }
        if self.db.get_message(message_id)?.is_none() {
            return Err(ChatError::NotFound("message"));
        }
        let rows = self.db.get_history(message_id)?;
        Ok(rows.into_iter().filter_map(history_entry).collect())
    }

    pub fn unread_notifications(&self, ctx: &RequestContext) -> Result<(Vec<Notification>, i64), ChatError> {
        let rows = self.db.get_unread_notifications(ctx.user_id, NOTIFICATION_PAGE_SIZE)?;
        let count = self.db.count_unread_notifications(ctx.user_id)?;
        let notifications = rows
            .into_iter()
            .map(|row| Notification {
                id: row.id,
                user_id: row.user_id,
                kind: row.kind,
                message: row.message,
                link: row.link,
                is_read: row.is_read,
                created_at: timestamp_or_epoch(&row.created_at, "notification", row.id),
            })
            .collect();
        Ok((notifications, count))
    }

    pub fn mark_notifications_read(&self, ctx: &RequestContext, id: Option<i64>) -> Result<usize, ChatError> {
        Ok(self.db.mark_notifications_read(ctx.user_id, id)?)
    }

    // -- Rules --

    fn validate_body<'b>(&self, body: &'b str) -> Result<&'b str, ChatError> {
        let body = body.trim();
        if body.len() > self.config.max_body_len {
            return Err(ChatError::validation(format!(
                "Message is too long (max {} characters)",
                self.config.max_body_len
            )));
        }
        if !has_visible_text(body) && !has_embedded_image(body) {
            return Err(ChatError::validation("Message cannot be empty"));
        }
        Ok(body)
    }

    /// Keep a reply link only when the parent lives in the same thread.
    /// Missing parents and parents elsewhere are treated alike so a reply
    /// cannot reveal whether a message exists in another thread.
    fn reply_target(&self, parent_id: i64, scope: Scope) -> Result<Option<i64>, ChatError> {
        match self.db.get_message(parent_id)? {
            Some(parent) if same_thread(&parent, scope) => Ok(Some(parent_id)),
            _ => {
                debug!("Reply target {} is not in this thread; dropping reply link", parent_id);
                Ok(None)
            }
        }
    }

    /// Check the scope exists and the caller may use it. A page scope comes
    /// back carrying its parent project.
    fn resolve_scope(&self, ctx: &RequestContext, scope: Scope) -> Result<Scope, ChatError> {
        match scope.kind() {
            ScopeKind::Global => Ok(Scope::global()),
            ScopeKind::Project(project_id) => {
                if !self.db.project_exists(project_id)? {
                    return Err(ChatError::NotFound("project"));
                }
                if !ctx.is_admin() && !self.db.is_project_member(project_id, ctx.user_id)? {
                    return Err(ChatError::unauthorized("No access to this project"));
                }
                Ok(Scope::project(project_id))
            }
            ScopeKind::Page(page_id) => {
                let page = self.db.get_page(page_id)?.ok_or(ChatError::NotFound("page"))?;
                if scope.project_id.is_some_and(|p| p != page.project_id) {
                    return Err(ChatError::validation("Page does not belong to this project"));
                }
                let tester = [page.at_tester_id, page.ft_tester_id, page.qa_id].contains(&Some(ctx.user_id));
                if !ctx.is_admin() && !tester && !self.db.is_project_member(page.project_id, ctx.user_id)? {
                    return Err(ChatError::unauthorized("No access to this page"));
                }
                Ok(Scope::page(page.project_id, page.id))
            }
        }
    }

    fn resolve_mentions(&self, body: &str) -> Vec<i64> {
        resolve_mentions(body, |username| self.db.get_user_id_by_username(username))
    }

    // -- Best-effort side effects --

    fn record_history(
        &self,
        message_id: i64,
        action: HistoryAction,
        old_body: &str,
        new_body: &str,
        actor_id: i64,
        at: &str,
    ) {
        if let Err(e) = self
            .db
            .insert_history(message_id, action.as_str(), old_body, new_body, actor_id, at)
        {
            warn!("Failed to record {} history for message {}: {}", action.as_str(), message_id, e);
        }
    }

    fn notify_mentions(&self, ctx: &RequestContext, mentions: &[i64], scope: Scope) {
        if !self.db.schema().notifications {
            return;
        }
        let recipients: Vec<i64> = mentions.iter().copied().filter(|id| *id != ctx.user_id).collect();
        if recipients.is_empty() {
            return;
        }

        let sender = match self.db.get_user_by_id(ctx.user_id) {
            Ok(Some(user)) if !user.full_name.is_empty() => user.full_name,
            _ => ctx.username.clone(),
        };
        let text = format!("{sender} mentioned you in a chat.");
        let link = chat_link(&self.config.chat_link, scope);

        for user_id in recipients {
            if let Err(e) = self.db.insert_notification(user_id, "mention", &text, Some(&link)) {
                warn!("Failed to notify user {} of mention: {}", user_id, e);
            }
        }
    }

    fn log_activity(&self, ctx: &RequestContext, message_id: i64, scope: Scope) {
        if !self.db.schema().activity_log {
            return;
        }
        let details = serde_json::json!({ "project_id": scope.project_id, "page_id": scope.page_id });
        if let Err(e) = self
            .db
            .log_activity(ctx.user_id, "chat_message", "chat", message_id, &details.to_string())
        {
            warn!("Failed to log chat activity for message {}: {}", message_id, e);
        }
    }

    // -- Presentation --

    fn present_body(&self, raw: &str) -> String {
        rewrite_upload_urls(&sanitize_chat_html(raw), &self.config.secure_file_base)
    }

    fn render(&self, ctx: &RequestContext, row: MessageRow) -> Message {
        let is_deleted = row.is_deleted();
        let may_modify = ctx.can_modify(row.user_id) && !is_deleted;
        let thread = Scope { project_id: row.project_id, page_id: row.page_id };
        let reply_preview = row.reply_to.and_then(|parent| self.reply_preview(parent, thread));
        let mentions = serde_json::from_str::<Vec<i64>>(&row.mentions).unwrap_or_else(|e| {
            warn!("Corrupt mentions '{}' on message {}: {}", row.mentions, row.id, e);
            Vec::new()
        });

        Message {
            id: row.id,
            body: self.present_body(&row.message),
            created_at: timestamp_or_epoch(&row.created_at, "message", row.id),
            edited_at: row.edited_at.as_deref().and_then(parse_timestamp),
            deleted_at: row.deleted_at.as_deref().and_then(parse_timestamp),
            author: Author {
                id: row.user_id,
                username: row.username,
                full_name: row.full_name,
                role: Role::from_db(&row.role),
            },
            project_id: row.project_id,
            page_id: row.page_id,
            reply_to: row.reply_to,
            mentions,
            is_deleted,
            reply_preview,
            can_edit: may_modify,
            can_delete: may_modify,
        }
    }

    fn reply_preview(&self, parent_id: i64, thread: Scope) -> Option<ReplyPreview> {
        match self.db.get_message(parent_id) {
            Ok(Some(parent)) if same_thread(&parent, thread) => Some(ReplyPreview {
                id: parent.id,
                user_id: parent.user_id,
                body: self.present_body(&parent.message),
                created_at: timestamp_or_epoch(&parent.created_at, "message", parent.id),
                username: parent.username,
                full_name: parent.full_name,
            }),
            Ok(_) => None,
            Err(e) => {
                warn!("Reply preview for message {} failed: {}", parent_id, e);
                None
            }
        }
    }
}

fn same_thread(row: &MessageRow, scope: Scope) -> bool {
    row.project_id == scope.project_id && row.page_id == scope.page_id
}

fn history_entry(row: HistoryRow) -> Option<HistoryEntry> {
    let action = match row.action.parse::<HistoryAction>() {
        Ok(action) => action,
        Err(e) => {
            warn!("Skipping history row {}: {}", row.id, e);
            return None;
        }
    };
    Some(HistoryEntry {
        id: row.id,
        message_id: row.message_id,
        action,
        created_at: timestamp_or_epoch(&row.created_at, "history", row.id),
        old_body: row.old_message,
        new_body: row.new_message,
        actor_id: row.user_id,
    })
}

fn timestamp_or_epoch(raw: &str, what: &str, id: i64) -> DateTime<Utc> {
    parse_timestamp(raw).unwrap_or_else(|| {
        warn!("Corrupt created_at '{}' on {} {}", raw, what, id);
        DateTime::default()
    })
}

fn chat_link(base: &str, scope: Scope) -> String {
    let mut params = Vec::new();
    if let Some(project_id) = scope.project_id {
        params.push(format!("project_id={project_id}"));
    }
    if let Some(page_id) = scope.page_id {
        params.push(format!("page_id={page_id}"));
    }
    if params.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{}", params.join("&"))
    }
}
