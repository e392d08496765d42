use axum::{
    extract::{
        multipart::MultipartError,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::media::MediaError;
use crate::query::MalformedFilterError;
use crate::serializers::{field_error, FieldErrors};
use crate::storage::StorageError;

pub const NON_FIELD_ERRORS: &str = "non_field_errors";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Not found.")]
    NotFound,
    #[error("Invalid input: {0:?}")]
    Validation(FieldErrors),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn non_field(message: impl Into<String>) -> Self {
        AppError::Validation(field_error(NON_FIELD_ERRORS, message))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Bearer")],
                Json(serde_json::json!({ "detail": msg })),
            )
                .into_response(),
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "detail": "Not found." })),
            )
                .into_response(),
            AppError::Validation(errors) => (StatusCode::BAD_REQUEST, Json(errors)).into_response(),
            AppError::Internal(msg) => {
                error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "detail": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

impl From<FieldErrors> for AppError {
    fn from(errors: FieldErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::EmailTaken(_) => {
                AppError::Validation(field_error("email", "user with this email already exists."))
            }
            StorageError::NotFound => AppError::NotFound,
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<MalformedFilterError> for AppError {
    fn from(err: MalformedFilterError) -> Self {
        AppError::Validation(field_error(
            err.param,
            format!("Invalid id \"{}\"; expected a comma-separated list of integers.", err.token),
        ))
    }
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        if err.is_client_error() {
            AppError::Validation(field_error("image", err.to_string()))
        } else {
            AppError::Internal(err.to_string())
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::Validation(field_error("image", err.body_text()))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::non_field(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::non_field(rejection.body_text())
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("Password hashing error: {err}"))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::Internal(format!("Token creation error: {err}"))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Background task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_validation_error_renders_field_map() {
        let response = AppError::from(MalformedFilterError {
            param: "tags",
            token: "abc".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(value["tags"][0].as_str().unwrap().contains("abc"));
    }

    #[test]
    fn test_storage_errors_map_to_statuses() {
        let taken = AppError::from(StorageError::EmailTaken("a@b.c".to_string())).into_response();
        assert_eq!(taken.status(), StatusCode::BAD_REQUEST);

        let missing = AppError::from(StorageError::NotFound).into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let unauthorized = AppError::Unauthorized("nope".to_string()).into_response();
        assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unauthorized.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}
