use axum::{
    Extension, Form, Json,
    extract::{State, rejection::FormRejection},
};
use parley_chat::RequestContext;
use parley_types::api::{MarkReadRequest, NotificationsResponse};
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::{AppState, run_chat};

pub async fn list_unread(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<NotificationsResponse>, ApiError> {
    let (notifications, unread_count) = run_chat(&state, move |chat| chat.unread_notifications(&ctx)).await?;
    Ok(Json(NotificationsResponse { notifications, unread_count }))
}

/// Mark one notification (`id`) or all of them as read.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    form: Result<Form<MarkReadRequest>, FormRejection>,
) -> Result<Json<Value>, ApiError> {
    let Form(req) = form?;
    let updated = run_chat(&state, move |chat| chat.mark_notifications_read(&ctx, req.id)).await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}
