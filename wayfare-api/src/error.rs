use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::BTreeMap;
use wayfare_core::NavigationError;
use wayfare_order::{SessionError, SubmitError};

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    GoneError(String),
    InvalidFields {
        message: String,
        field_errors: BTreeMap<String, String>,
    },
    Anyhow(anyhow::Error),
}

impl AppError {
    /// Navigation problems are usage errors: logged, then shown with a
    /// generic message rather than the internal detail
    pub fn navigation(err: NavigationError) -> Self {
        tracing::warn!("Rejected wizard action: {}", err);
        let message = err.user_message().to_string();
        match err {
            NavigationError::OutOfRange { .. } => AppError::ValidationError(message),
            NavigationError::SessionClosed => AppError::GoneError(message),
            NavigationError::OutOfOrder { .. }
            | NavigationError::NotOnLastStep
            | NavigationError::AlreadySubmitted(_)
            | NavigationError::SubmissionPending => AppError::ConflictError(message),
        }
    }

    pub fn session(err: SessionError) -> Self {
        match err {
            SessionError::UnknownFlow(_) | SessionError::NotFound(_) => {
                AppError::NotFoundError(err.to_string())
            }
            SessionError::AlreadyOpen(_) => AppError::ConflictError(err.to_string()),
            SessionError::InvalidDraft(e) => AppError::ValidationError(e.to_string()),
        }
    }

    pub fn submit(err: SubmitError) -> Self {
        match err {
            SubmitError::Navigation(e) => AppError::navigation(e),
            SubmitError::Invalid { step_id, result, .. } => AppError::InvalidFields {
                message: format!("Please correct the highlighted fields in step '{step_id}'"),
                field_errors: result.field_errors,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::GoneError(msg) => (StatusCode::GONE, json!({ "error": msg })),
            AppError::InvalidFields { message, field_errors } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": message, "field_errors": field_errors }),
            ),
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal Server Error" }))
            }
        };

        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Anyhow(err.into())
    }
}
