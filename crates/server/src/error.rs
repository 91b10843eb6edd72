//! HTTP error mapping: every failure is `{ "error": "<message>" }`

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use engine::{EngineError, ModeSwitchError};
use persistence::DbError;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Live-mode precondition failed
    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Validation(msg) => ApiError::BadRequest(msg),
            EngineError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            EngineError::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<ModeSwitchError> for ApiError {
    fn from(e: ModeSwitchError) -> Self {
        match e {
            ModeSwitchError::InvalidMode => ApiError::BadRequest(e.to_string()),
            ModeSwitchError::NotFound(_) => ApiError::NotFound(e.to_string()),
            ModeSwitchError::LiveNotConfigured | ModeSwitchError::BrokerUnreachable(_) => {
                ApiError::Unprocessable(e.to_string())
            }
            ModeSwitchError::Engine(inner) => inner.into(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
