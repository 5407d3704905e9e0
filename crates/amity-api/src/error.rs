use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use amity_engine::EngineError;
use amity_types::api::{ErrorDetail, ErrorResponse};

/// Engine failure rendered as `{ "success": false, "error": { kind, message } }`.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::Upstream(_) => StatusCode::BAD_GATEWAY,
            EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(EngineError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(EngineError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            EngineError::Store(e) => {
                // Store details stay in the log.
                error!("Internal error: {:#}", e);
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            success: false,
            error: ErrorDetail {
                kind: self.0.kind().to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}
