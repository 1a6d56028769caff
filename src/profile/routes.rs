use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    routing::get,
};

use super::{ProfileDto, ProfileUpdate};
use crate::{
    AppState,
    auth::{AdminUser, AuthUser},
    error::AppResult,
    models::{BulkDeleted, IdsQuery, PageQuery},
    response::{ApiResponse, done, ok},
    upload::{BODY_LIMIT, read_form},
};

const AVATAR_PART: &str = "avatar";

type Reply<T> = AppResult<Json<ApiResponse<T>>>;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_profile).put(update_profile).delete(delete_profile))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).delete(delete_users))
        .route("/{id}", axum::routing::delete(delete_user))
}

async fn get_profile(State(state): State<AppState>, who: AuthUser) -> Reply<ProfileDto> {
    Ok(ok(state.profile.get_profile(&who).await?))
}

async fn update_profile(State(state): State<AppState>, who: AuthUser, form: Multipart) -> Reply<ProfileDto> {
    let (update, avatar) = read_form::<ProfileUpdate>(form, AVATAR_PART).await?;
    Ok(ok(state.profile.update_profile(&who, update, avatar).await?))
}

async fn delete_profile(State(state): State<AppState>, who: AuthUser) -> Reply<()> {
    state.profile.delete_profile(&who).await?;
    Ok(done())
}

async fn list_users(
    State(state): State<AppState>,
    _: AdminUser,
    Query(q): Query<PageQuery>,
) -> Reply<Vec<ProfileDto>> {
    Ok(ok(state.profile.admin_list_users(q.into_page()?).await?))
}

async fn delete_user(State(state): State<AppState>, _: AdminUser, Path(id): Path<i32>) -> Reply<()> {
    state.profile.admin_delete_user(id).await?;
    Ok(done())
}

async fn delete_users(
    State(state): State<AppState>,
    _: AdminUser,
    Query(q): Query<IdsQuery>,
) -> Reply<BulkDeleted> {
    Ok(ok(state.profile.admin_delete_users(&q.parse()?).await?))
}
