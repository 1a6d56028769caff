use axum::{Json, http::StatusCode};
use serde::Serialize;

pub const STATUS_OK: &str = "success";
pub const STATUS_ERROR: &str = "error";

/// The `{status, data|error}` envelope every endpoint answers with.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self { status: STATUS_OK, data: Some(data), error: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { status: STATUS_ERROR, data: None, error: Some(message.into()) }
    }
}

impl ApiResponse<()> {
    pub fn success() -> Self {
        Self { status: STATUS_OK, data: None, error: None }
    }
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::data(data))
}

pub fn done() -> Json<ApiResponse<()>> {
    Json(ApiResponse::success())
}

pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::data(data)))
}

#[derive(Debug, Serialize)]
pub struct Created {
    pub id: i32,
}
