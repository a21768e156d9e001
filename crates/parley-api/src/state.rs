use std::sync::Arc;

use parley_chat::{ChatError, ChatService};
use tracing::error;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub chat: ChatService,
    pub jwt_secret: String,
}

impl AppStateInner {
    pub fn new(chat: ChatService, jwt_secret: impl Into<String>) -> AppState {
        Arc::new(Self { chat, jwt_secret: jwt_secret.into() })
    }
}

/// Run a chat operation on the blocking pool. Every service call touches
/// SQLite, so handlers never call it on the async runtime directly.
pub(crate) async fn run_chat<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&ChatService) -> Result<T, ChatError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || op(&state.chat))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}
