use crate::response::ApiResponse;
use crate::store::{StorageError, StorageErrorKind};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String), // 400

    #[error("Unauthorized: {0}")]
    Unauthorized(String), // 401

    #[error("Forbidden: {0}")]
    Forbidden(String), // 403

    #[error("Attempts exhausted: {0}")]
    AttemptsExhausted(String), // 403

    #[error("Not Found: {0}")]
    NotFound(String), // 404

    #[error("Conflict: {0}")]
    Conflict(String), // 409

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String), // 500

    #[error("Internal Server Error: {0}")]
    InternalServerError(#[from] anyhow::Error), // 500
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err.kind {
            StorageErrorKind::NotFound => {
                warn!("Storage NotFound reached generic conversion: {}", err);
                AppError::NotFound(err.message)
            }
            StorageErrorKind::Conflict => {
                warn!("Storage conflict encountered: {}", err);
                AppError::Conflict(err.message)
            }
            StorageErrorKind::Unavailable => {
                error!("Storage backend unavailable: {}", err);
                AppError::StorageUnavailable(err.message)
            }
            StorageErrorKind::Unknown => {
                error!("Unhandled storage error encountered: {}", err);
                AppError::InternalServerError(anyhow::Error::new(err).context("Storage error"))
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        warn!("Rejected request body: {}", rejection.body_text());
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        warn!("Rejected query string: {}", rejection.body_text());
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        warn!("Rejected path parameters: {}", rejection.body_text());
        AppError::BadRequest(rejection.body_text())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::AttemptsExhausted(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::StorageUnavailable(_) | AppError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show a client. Server-side failures never leak their details.
    pub fn client_message(&self) -> String {
        match self {
            AppError::BadRequest(message)
            | AppError::Unauthorized(message)
            | AppError::Forbidden(message)
            | AppError::NotFound(message)
            | AppError::Conflict(message) => message.clone(),
            AppError::AttemptsExhausted(message) => format!("Attempts exhausted: {}", message),
            AppError::StorageUnavailable(_) => {
                "The storage backend is currently unavailable".to_string()
            }
            AppError::InternalServerError(_) => "An internal server error occurred".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::StorageUnavailable(message) => error!(
                "Responding with 500 Internal Server Error. Storage unavailable: {}",
                message
            ),
            AppError::InternalServerError(source) => error!(
                "Responding with 500 Internal Server Error. Source: {:?}",
                source
            ),
            _ => {}
        }

        ApiResponse::<()>::failure(self.status(), self.client_message()).into_response()
    }
}
