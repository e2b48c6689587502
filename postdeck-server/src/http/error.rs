use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use libpostdeck::error::OAuthError;
use libpostdeck::PostdeckError;
use serde::Serialize;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<PostdeckError> for AppError {
    fn from(err: PostdeckError) -> Self {
        match err {
            PostdeckError::NotFound(message) => AppError::not_found(message),
            PostdeckError::Conflict(message) => AppError::conflict(message),
            PostdeckError::InvalidInput(message) => AppError::bad_request(message),
            PostdeckError::OAuth(
                e @ (OAuthError::UnknownPlatform(_)
                | OAuthError::NotConfigured { .. }
                | OAuthError::InvalidState),
            ) => AppError::bad_request(e.to_string()),
            PostdeckError::Generation(e) => {
                tracing::error!(error = %e, "content generation failed");
                AppError::internal(e.to_string())
            }
            PostdeckError::Database(e) => {
                tracing::error!(error = %e, "database operation failed");
                AppError::internal("database error")
            }
            other => {
                tracing::error!(error = %other, "request failed");
                AppError::internal(other.to_string())
            }
        }
    }
}

impl From<OAuthError> for AppError {
    fn from(err: OAuthError) -> Self {
        PostdeckError::OAuth(err).into()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
