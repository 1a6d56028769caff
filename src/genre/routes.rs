use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};

use super::{GenreDto, GenreInput};
use crate::{
    AppState,
    auth::AdminUser,
    error::AppResult,
    models::{BulkDeleted, IdsQuery},
    response::{ApiResponse, created, done, ok},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list)).route("/{id}", get(get_one))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create).delete(delete_many))
        .route("/{id}", axum::routing::put(update).delete(delete))
}

async fn list(State(state): State<AppState>) -> AppResult<Json<ApiResponse<Vec<GenreDto>>>> {
    Ok(ok(state.genres.list_genres().await?))
}

async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<GenreDto>>> {
    Ok(ok(state.genres.get_genre(id).await?))
}

async fn create(
    State(state): State<AppState>,
    _: AdminUser,
    Json(input): Json<GenreInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<GenreDto>>)> {
    Ok(created(state.genres.create_genre(input).await?))
}

async fn update(
    State(state): State<AppState>,
    _: AdminUser,
    Path(id): Path<i32>,
    Json(input): Json<GenreInput>,
) -> AppResult<Json<ApiResponse<GenreDto>>> {
    Ok(ok(state.genres.update_genre(id, input).await?))
}

async fn delete(
    State(state): State<AppState>,
    _: AdminUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.genres.delete_genre(id).await?;
    Ok(done())
}

async fn delete_many(
    State(state): State<AppState>,
    _: AdminUser,
    Query(q): Query<IdsQuery>,
) -> AppResult<Json<ApiResponse<BulkDeleted>>> {
    Ok(ok(state.genres.delete_genres(&q.parse()?).await?))
}
