use axum::{Json, Router, extract::State, routing::post};

use super::{Confirm, SendCode};
use crate::{
    AppState,
    error::AppResult,
    response::{ApiResponse, done},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/send-code", post(send_code)).route("/confirm", post(confirm))
}

async fn send_code(
    State(state): State<AppState>,
    Json(req): Json<SendCode>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.email.send_code(req).await?;
    Ok(done())
}

async fn confirm(
    State(state): State<AppState>,
    Json(req): Json<Confirm>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.email.confirm(req).await?;
    Ok(done())
}
