use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Serialize, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many requests: {0}")]
    TooManyRequests(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::NotAuthorized(msg) => Self::Unauthorized(msg),
            AppError::Validation(msg) | AppError::ParseError(msg) => Self::ValidationError(msg),
            AppError::Conflict(msg) => Self::Conflict(msg),
            other => {
                tracing::error!(error = %other, "internal error");
                Self::InternalError("Internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            Self::InternalError(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse { error: message, status: "error".to_string() },
            ),
            Self::ValidationError(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse { error: message, status: "error".to_string() },
            ),
            Self::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorResponse { error: message, status: "error".to_string() },
            ),
            Self::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse { error: message, status: "error".to_string() },
            ),
            Self::PayloadTooLarge(message) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorResponse { error: message, status: "error".to_string() },
            ),
            Self::Conflict(message) => (
                StatusCode::CONFLICT,
                ErrorResponse { error: message, status: "error".to_string() },
            ),
            Self::TooManyRequests(message) => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorResponse { error: message, status: "error".to_string() },
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Debug;

    fn assert_status_code<T: IntoResponse + Debug>(response: T, expected_status: StatusCode) {
        let response = response.into_response();
        assert_eq!(response.status(), expected_status);
    }

    #[test]
    fn test_app_error_to_api_error_conversion() {
        let not_found = AppError::NotFound("resource not found".to_string());
        let api_error = ApiError::from(not_found);
        assert!(matches!(api_error, ApiError::NotFound(msg) if msg == "resource not found"));

        let validation = AppError::Validation("invalid input".to_string());
        let api_error = ApiError::from(validation);
        assert!(matches!(api_error, ApiError::ValidationError(msg) if msg == "invalid input"));

        let not_authorized = AppError::NotAuthorized("wrong tenant".to_string());
        let api_error = ApiError::from(not_authorized);
        assert!(matches!(api_error, ApiError::Unauthorized(msg) if msg == "wrong tenant"));

        let conflict = AppError::Conflict("already queued".to_string());
        let api_error = ApiError::from(conflict);
        assert!(matches!(api_error, ApiError::Conflict(msg) if msg == "already queued"));

        let internal_error = AppError::Io(std::io::Error::new(std::io::ErrorKind::Other, "io error"));
        let api_error = ApiError::from(internal_error);
        assert!(matches!(api_error, ApiError::InternalError(_)));
    }

    #[test]
    fn test_api_error_response_status_codes() {
        assert_status_code(ApiError::InternalError("server error".to_string()), StatusCode::INTERNAL_SERVER_ERROR);
        assert_status_code(ApiError::NotFound("not found".to_string()), StatusCode::NOT_FOUND);
        assert_status_code(ApiError::ValidationError("invalid input".to_string()), StatusCode::BAD_REQUEST);
        assert_status_code(ApiError::Unauthorized("not allowed".to_string()), StatusCode::UNAUTHORIZED);
        assert_status_code(ApiError::PayloadTooLarge("too big".to_string()), StatusCode::PAYLOAD_TOO_LARGE);
        assert_status_code(ApiError::Conflict("duplicate".to_string()), StatusCode::CONFLICT);
        assert_status_code(ApiError::TooManyRequests("slow down".to_string()), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_internal_error_sanitization() {
        let sensitive_info = "db password incorrect";
        let api_error = ApiError::InternalError(sensitive_info.to_string());
        assert_eq!(api_error.to_string(), "Internal server error");
        assert_status_code(api_error, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
