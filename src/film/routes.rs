use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;

use super::{FilmDto, FilmInput, FilmUpdate, query::FilmListQuery};
use crate::{
    AppState,
    auth::AdminUser,
    error::AppResult,
    models::{BulkDeleted, IdsQuery, PageQuery},
    response::{ApiResponse, created, done, ok},
    upload::{BODY_LIMIT, read_form},
};

const POSTER_PART: &str = "poster";

type Reply<T> = AppResult<Json<ApiResponse<T>>>;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/search", get(search))
        .route("/{id}", get(get_one))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(admin_list).post(create).delete(delete_many))
        .route("/{id}", axum::routing::put(update).delete(delete))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    query: String,
}

async fn list(State(state): State<AppState>, Query(q): Query<FilmListQuery>) -> Reply<Vec<FilmDto>> {
    let query = q.parse()?;
    Ok(ok(state.films.list_films(&query).await?))
}

async fn search(State(state): State<AppState>, Query(q): Query<SearchQuery>) -> Reply<Vec<FilmDto>> {
    Ok(ok(state.films.search_films(&q.query).await?))
}

async fn get_one(State(state): State<AppState>, Path(id): Path<i32>) -> Reply<FilmDto> {
    Ok(ok(state.films.get_film(id).await?))
}

async fn admin_list(State(state): State<AppState>, _: AdminUser, Query(q): Query<PageQuery>) -> Reply<Vec<FilmDto>> {
    Ok(ok(state.films.admin_list_films(q.into_page()?).await?))
}

async fn create(
    State(state): State<AppState>,
    _: AdminUser,
    form: Multipart,
) -> AppResult<(StatusCode, Json<ApiResponse<FilmDto>>)> {
    let (input, poster) = read_form::<FilmInput>(form, POSTER_PART).await?;
    Ok(created(state.films.create_film(input, poster).await?))
}

async fn update(
    State(state): State<AppState>,
    _: AdminUser,
    Path(id): Path<i32>,
    form: Multipart,
) -> Reply<FilmDto> {
    let (input, poster) = read_form::<FilmUpdate>(form, POSTER_PART).await?;
    Ok(ok(state.films.update_film(id, input, poster).await?))
}

async fn delete(State(state): State<AppState>, _: AdminUser, Path(id): Path<i32>) -> Reply<()> {
    state.films.delete_film(id).await?;
    Ok(done())
}

async fn delete_many(
    State(state): State<AppState>,
    _: AdminUser,
    Query(q): Query<IdsQuery>,
) -> Reply<BulkDeleted> {
    Ok(ok(state.films.delete_films(&q.parse()?).await?))
}
