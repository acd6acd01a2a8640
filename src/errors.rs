//! Application-wide error type and its JSON rendering.
//!
//! Every handled failure leaves the service as `{ "success": false, "message": ... }`.

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::auth::repo::StoreError;
use crate::auth::repo_types::Role;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("Not authorized. Please login first.")]
    NotAuthenticated,
    #[error("Not authorized. Invalid or expired token.")]
    InvalidToken,
    #[error("User not found. Token invalid.")]
    UserNotFound,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Current password is incorrect")]
    IncorrectPassword,
    #[error("Role '{0}' is not authorized to access this route")]
    Forbidden(Role),
    #[error("User not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotAuthenticated
            | AppError::InvalidToken
            | AppError::UserNotFound
            | AppError::InvalidCredentials
            | AppError::IncorrectPassword => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(e) => {
                error!(error = ?e, "internal error");
                "Server error".to_string()
            }
            other => other.to_string(),
        };
        (
            status,
            Json(ErrorBody {
                success: false,
                message,
            }),
        )
            .into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => AppError::validation("Email already registered"),
            StoreError::NotFound => AppError::NotFound,
            StoreError::Backend(e) => AppError::Internal(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(res: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(AppError::validation("x").status(), StatusCode::BAD_REQUEST);
        for e in [
            AppError::NotAuthenticated,
            AppError::InvalidToken,
            AppError::UserNotFound,
            AppError::InvalidCredentials,
            AppError::IncorrectPassword,
        ] {
            assert_eq!(e.status(), StatusCode::UNAUTHORIZED);
        }
        assert_eq!(
            AppError::Forbidden(Role::User).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn renders_uniform_error_body() {
        let res = AppError::Forbidden(Role::User).into_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let body = body_json(res).await;
        assert_eq!(body["success"], false);
        assert_eq!(
            body["message"],
            "Role 'user' is not authorized to access this route"
        );
    }

    #[tokio::test]
    async fn internal_details_are_not_leaked() {
        let res =
            AppError::Internal(anyhow::anyhow!("connection refused to 10.0.0.5")).into_response();
        let body = body_json(res).await;
        assert_eq!(body["message"], "Server error");
    }

    #[test]
    fn duplicate_email_maps_to_validation() {
        let e: AppError = StoreError::DuplicateEmail.into();
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        assert_eq!(e.to_string(), "Email already registered");
    }
}
