use axum::{
    Json,
    extract::rejection::{FormRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use parley_chat::ChatError;
use parley_types::api::ErrorEnvelope;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("Authentication required")]
    Unauthenticated,
    #[error("{0}")]
    BadRequest(String),
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Chat(ChatError::Validation(_)) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Chat(ChatError::Unauthorized(_)) => StatusCode::FORBIDDEN,
            ApiError::Chat(ChatError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Chat(ChatError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Chat(ChatError::Persistence(_)) | ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // storage details stay in the log
            ApiError::Chat(ChatError::Persistence(e)) => {
                error!("Chat storage failure: {:#}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorEnvelope { success: false, error: message })).into_response()
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_errors_map_to_statuses() {
        let cases = [
            (ApiError::from(ChatError::validation("x")), StatusCode::BAD_REQUEST),
            (ApiError::from(ChatError::unauthorized("x")), StatusCode::FORBIDDEN),
            (ApiError::from(ChatError::NotFound("message")), StatusCode::NOT_FOUND),
            (ApiError::from(ChatError::conflict("x")), StatusCode::CONFLICT),
            (ApiError::from(ChatError::from(anyhow::anyhow!("disk"))), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::Unauthenticated, StatusCode::UNAUTHORIZED),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }

    #[test]
    fn not_found_names_the_entity() {
        assert_eq!(ApiError::from(ChatError::NotFound("message")).to_string(), "message not found");
    }
}
