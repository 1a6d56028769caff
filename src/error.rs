use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{images::ImageError, response::ApiResponse, validation::FieldError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    #[error("{}", crate::validation::join(.0))]
    Validation(Vec<FieldError>),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("too many requests, try again later")]
    RateLimited,

    #[error("{0} unavailable")]
    UpstreamUnavailable(&'static str),

    #[error("internal server error")]
    Internal(anyhow::Error),
}

impl AppError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyExists(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Image(ImageError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Image(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl From<jiff::Error> for AppError {
    fn from(err: jiff::Error) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let AppError::Internal(err) = &self {
            tracing::error!(error = ?err, "request failed");
        }
        (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Maps a unique-constraint violation to `AlreadyExists`, everything else to `Internal`.
pub fn unique_violation(err: sea_orm::DbErr, what: &'static str) -> AppError {
    match err.sql_err() {
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_)) => AppError::AlreadyExists(what),
        _ => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_hide_their_cause() {
        let err = AppError::from(anyhow::anyhow!("connection reset by peer"));
        assert_eq!(err.to_string(), "internal server error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn image_errors_have_distinct_statuses() {
        assert_eq!(
            AppError::from(ImageError::TooLarge { limit: 10 }).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(AppError::from(ImageError::InvalidType).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::from(ImageError::InvalidResolution).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn validation_message_lists_every_field() {
        let err = AppError::Validation(vec![
            FieldError::new("title", "is required"),
            FieldError::new("runtime", "must be positive"),
        ]);
        assert_eq!(err.to_string(), "field title is required, field runtime must be positive");
    }
}
