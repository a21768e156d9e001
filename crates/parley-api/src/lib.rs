pub mod auth;
pub mod error;
pub mod messages;
pub mod notifications;
pub mod state;

use axum::{
    Router, middleware,
    routing::{get, post},
};

pub use state::{AppState, AppStateInner};

/// GET /health — liveness check (no auth).
pub async fn health() -> &'static str {
    "ok"
}

/// Chat and notification routes behind bearer auth, plus `/health`.
pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            "/chat/messages",
            get(messages::fetch_messages).post(messages::send_message),
        )
        .route("/chat/messages/{message_id}/edit", post(messages::edit_message))
        .route("/chat/messages/{message_id}/delete", post(messages::delete_message))
        .route("/chat/messages/{message_id}/history", get(messages::message_history))
        .route("/notifications", get(notifications::list_unread))
        .route("/notifications/read", post(notifications::mark_read))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        .route("/health", get(health))
        .merge(protected_routes)
        .with_state(state)
}
