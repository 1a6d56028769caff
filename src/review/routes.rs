use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};

use super::{AdminReviewInput, ReviewDto, ReviewInput, ReviewUpdate};
use crate::{
    AppState,
    auth::{AdminUser, AuthUser},
    error::AppResult,
    models::{BulkDeleted, IdsQuery},
    response::{ApiResponse, created, done, ok},
};

type Reply<T> = AppResult<Json<ApiResponse<T>>>;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(create))
        .route("/{id}", get(get_one).put(update).delete(delete))
        .route("/film/{film_id}", get(for_film))
        .route("/user", get(mine))
        .route("/user/{user_id}", get(by_user))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(admin_list).post(admin_create).delete(admin_delete_many))
        .route("/{id}", axum::routing::put(admin_update).delete(admin_delete))
}

async fn get_one(State(state): State<AppState>, Path(id): Path<i32>) -> Reply<ReviewDto> {
    Ok(ok(state.reviews.get_review(id).await?))
}

async fn for_film(State(state): State<AppState>, Path(film_id): Path<i32>) -> Reply<Vec<ReviewDto>> {
    Ok(ok(state.reviews.reviews_for_film(film_id).await?))
}

async fn by_user(State(state): State<AppState>, Path(user_id): Path<i32>) -> Reply<Vec<ReviewDto>> {
    Ok(ok(state.reviews.reviews_by_user(user_id).await?))
}

async fn mine(State(state): State<AppState>, who: AuthUser) -> Reply<Vec<ReviewDto>> {
    Ok(ok(state.reviews.reviews_by_user(who.user_id).await?))
}

async fn create(
    State(state): State<AppState>,
    who: AuthUser,
    Json(input): Json<ReviewInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<ReviewDto>>)> {
    Ok(created(state.reviews.create_review(&who, input).await?))
}

async fn update(
    State(state): State<AppState>,
    who: AuthUser,
    Path(id): Path<i32>,
    Json(input): Json<ReviewUpdate>,
) -> Reply<ReviewDto> {
    Ok(ok(state.reviews.update_review(&who, id, input).await?))
}

async fn delete(State(state): State<AppState>, who: AuthUser, Path(id): Path<i32>) -> Reply<()> {
    state.reviews.delete_review(&who, id).await?;
    Ok(done())
}

async fn admin_list(State(state): State<AppState>, _: AdminUser) -> Reply<Vec<ReviewDto>> {
    Ok(ok(state.reviews.admin_list_reviews().await?))
}

async fn admin_create(
    State(state): State<AppState>,
    _: AdminUser,
    Json(input): Json<AdminReviewInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<ReviewDto>>)> {
    Ok(created(state.reviews.admin_create_review(input).await?))
}

async fn admin_update(
    State(state): State<AppState>,
    _: AdminUser,
    Path(id): Path<i32>,
    Json(input): Json<ReviewUpdate>,
) -> Reply<ReviewDto> {
    Ok(ok(state.reviews.admin_update_review(id, input).await?))
}

async fn admin_delete(State(state): State<AppState>, _: AdminUser, Path(id): Path<i32>) -> Reply<()> {
    state.reviews.admin_delete_review(id).await?;
    Ok(done())
}

async fn admin_delete_many(
    State(state): State<AppState>,
    _: AdminUser,
    Query(q): Query<IdsQuery>,
) -> Reply<BulkDeleted> {
    Ok(ok(state.reviews.admin_delete_reviews(&q.parse()?).await?))
}
