use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use parley_chat::RequestContext;
use parley_types::api::Claims;
use parley_types::models::Role;
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// Validate the bearer token and attach a [`RequestContext`] for handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthenticated)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthenticated)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!("Rejected bearer token: {}", e);
        ApiError::Unauthenticated
    })?;

    req.extensions_mut().insert(RequestContext::from(token_data.claims));
    Ok(next.run(req).await)
}

/// Issue a token the way the main application does. Used by tooling and tests.
pub fn create_token(secret: &str, user_id: i64, username: &str, role: Role) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        role,
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
