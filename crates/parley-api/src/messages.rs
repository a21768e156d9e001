use axum::{
    Extension, Form, Json,
    extract::{
        Path, Query, State,
        rejection::{FormRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use parley_chat::RequestContext;
use parley_types::api::{
    EditMessageRequest, FetchMessagesQuery, HistoryEnvelope, MessageEnvelope, MessagesEnvelope,
    SendMessageRequest,
};

use crate::error::ApiError;
use crate::state::{AppState, run_chat};

pub async fn send_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    form: Result<Form<SendMessageRequest>, FormRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Form(req) = form?;
    let message = run_chat(&state, move |chat| {
        chat.send(&ctx, &req.message, req.scope(), req.reply_to)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(MessageEnvelope { success: true, message })))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    path: Result<Path<i64>, PathRejection>,
    form: Result<Form<EditMessageRequest>, FormRejection>,
) -> Result<Json<MessageEnvelope>, ApiError> {
    let Path(message_id) = path?;
    let Form(req) = form?;
    let message = run_chat(&state, move |chat| chat.edit(&ctx, message_id, &req.message)).await?;

    Ok(Json(MessageEnvelope { success: true, message }))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageEnvelope>, ApiError> {
    let Path(message_id) = path?;
    let message = run_chat(&state, move |chat| chat.delete(&ctx, message_id)).await?;

    Ok(Json(MessageEnvelope { success: true, message }))
}

/// Messages newer than `last_id` in the requested thread.
pub async fn fetch_messages(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    query: Result<Query<FetchMessagesQuery>, QueryRejection>,
) -> Result<Json<MessagesEnvelope>, ApiError> {
    let Query(query) = query?;
    let messages = run_chat(&state, move |chat| {
        chat.fetch_since(&ctx, query.scope(), query.last_id)
    })
    .await?;

    Ok(Json(MessagesEnvelope { success: true, messages }))
}

pub async fn message_history(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<HistoryEnvelope>, ApiError> {
    let Path(message_id) = path?;
    let history = run_chat(&state, move |chat| chat.fetch_history(&ctx, message_id)).await?;

    Ok(Json(HistoryEnvelope { success: true, history }))
}
