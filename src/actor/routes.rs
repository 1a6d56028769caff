use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::get,
};

use super::{ActorDto, ActorInput, ActorUpdate, query::ActorListQuery};
use crate::{
    AppState,
    auth::AdminUser,
    error::AppResult,
    models::{BulkDeleted, IdsQuery, PageQuery},
    response::{ApiResponse, created, done, ok},
    upload::{BODY_LIMIT, read_form},
};

const AVATAR_PART: &str = "avatar";

type Reply<T> = AppResult<Json<ApiResponse<T>>>;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list)).route("/{id}", get(get_one))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(admin_list).post(create).delete(delete_many))
        .route("/{id}", axum::routing::put(update).delete(delete))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
}

async fn list(State(state): State<AppState>, Query(q): Query<ActorListQuery>) -> Reply<Vec<ActorDto>> {
    let query = q.parse()?;
    Ok(ok(state.actors.list_actors(&query).await?))
}

async fn get_one(State(state): State<AppState>, Path(id): Path<i32>) -> Reply<ActorDto> {
    Ok(ok(state.actors.get_actor(id).await?))
}

async fn admin_list(
    State(state): State<AppState>,
    _: AdminUser,
    Query(q): Query<PageQuery>,
) -> Reply<Vec<ActorDto>> {
    Ok(ok(state.actors.admin_list_actors(q.into_page()?).await?))
}

async fn create(
    State(state): State<AppState>,
    _: AdminUser,
    form: Multipart,
) -> AppResult<(StatusCode, Json<ApiResponse<ActorDto>>)> {
    let (input, avatar) = read_form::<ActorInput>(form, AVATAR_PART).await?;
    Ok(created(state.actors.create_actor(input, avatar).await?))
}

async fn update(
    State(state): State<AppState>,
    _: AdminUser,
    Path(id): Path<i32>,
    form: Multipart,
) -> Reply<ActorDto> {
    let (input, avatar) = read_form::<ActorUpdate>(form, AVATAR_PART).await?;
    Ok(ok(state.actors.update_actor(id, input, avatar).await?))
}

async fn delete(State(state): State<AppState>, _: AdminUser, Path(id): Path<i32>) -> Reply<()> {
    state.actors.delete_actor(id).await?;
    Ok(done())
}

async fn delete_many(
    State(state): State<AppState>,
    _: AdminUser,
    Query(q): Query<IdsQuery>,
) -> Reply<BulkDeleted> {
    Ok(ok(state.actors.delete_actors(&q.parse()?).await?))
}
