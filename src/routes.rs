use axum::Router;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{AppState, actor, auth, email, error::AppError, film, genre, profile, review};

/// The public `/v1` API plus uploaded images under `/static`.
pub fn app(state: AppState) -> Router {
    let admin = Router::new()
        .nest("/films", film::routes::admin_router())
        .nest("/actors", actor::routes::admin_router())
        .nest("/genres", genre::routes::admin_router())
        .nest("/reviews", review::routes::admin_router())
        .nest("/users", profile::routes::admin_router());

    let v1 = Router::new()
        .nest("/auth", auth::routes::router())
        .nest("/email", email::routes::router())
        .nest("/profile", profile::routes::router())
        .nest("/films", film::routes::router())
        .nest("/actors", actor::routes::router())
        .nest("/genres", genre::routes::router())
        .nest("/reviews", review::routes::router())
        .nest("/admin", admin);

    Router::new()
        .nest("/v1", v1)
        .nest_service("/static", ServeDir::new(&state.config.object_store_root))
        .fallback(not_found)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)),
        )
}

async fn not_found() -> AppError {
    AppError::NotFound("route")
}
