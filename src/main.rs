mod actor;
mod auth;
mod cache;
mod config;
mod db;
mod email;
mod entities;
mod error;
mod film;
mod genre;
mod images;
mod jobs;
mod mailer;
mod models;
mod profile;
mod response;
mod review;
mod routes;
mod search;
mod storage;
mod upload;
mod users;
mod validation;

#[cfg(test)]
mod testutil;

use std::{collections::HashMap, sync::Arc, time::Duration};

use sea_orm::DatabaseConnection;

use crate::{
    actor::{ActorUsecase, repo::ActorRepo},
    auth::{AuthUsecase, jwt::JwtKeys, oauth::{HttpOAuthProvider, OAuthProvider}},
    cache::{Cache, CacheStore, SqlCacheStore},
    config::Config,
    email::EmailUsecase,
    film::{FilmUsecase, repo::FilmRepo},
    genre::{GenreUsecase, repo::GenreRepo},
    mailer::{LogMailer, Mailer},
    profile::ProfileUsecase,
    review::{ReviewUsecase, repo::ReviewRepo},
    search::{ElasticIndex, MemoryIndex, Search, SearchIndex},
    storage::{Assets, FsObjectStore, ObjectStore},
    users::UserRepo,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jwt: Arc<JwtKeys>,
    pub cache: Cache,
    pub auth: Arc<AuthUsecase>,
    pub email: Arc<EmailUsecase>,
    pub profile: Arc<ProfileUsecase>,
    pub films: Arc<FilmUsecase>,
    pub actors: Arc<ActorUsecase>,
    pub genres: Arc<GenreUsecase>,
    pub reviews: Arc<ReviewUsecase>,
}

/// Outside collaborators the usecases talk to.
pub struct Adapters {
    pub cache: Arc<dyn CacheStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub search: Arc<dyn SearchIndex>,
    pub mailer: Arc<dyn Mailer>,
    pub oauth: HashMap<String, Arc<dyn OAuthProvider>>,
}

impl AppState {
    pub fn new(config: Arc<Config>, db: DatabaseConnection, adapters: Adapters) -> Self {
        let timeout = config.adapter_timeout;
        let jwt = Arc::new(JwtKeys::new(
            &config.jwt_secret,
            config.access_token_ttl,
            config.refresh_token_ttl,
        ));
        let cache = Cache::new(adapters.cache, timeout, config.entity_cache_ttl, config.list_cache_ttl);
        let assets = Assets::new(adapters.objects, timeout);
        let search = Search::new(adapters.search, timeout);
        let users = UserRepo::new(db.clone());

        Self {
            auth: Arc::new(AuthUsecase::new(
                users.clone(),
                cache.clone(),
                jwt.clone(),
                adapters.oauth,
                config.oauth_state_ttl,
            )),
            email: Arc::new(EmailUsecase::new(
                users.clone(),
                cache.clone(),
                adapters.mailer,
                config.email_code_ttl,
                config.email_sends_per_minute,
            )),
            profile: Arc::new(ProfileUsecase::new(users, cache.clone(), assets.clone())),
            films: Arc::new(FilmUsecase::new(FilmRepo::new(db.clone()), cache.clone(), assets.clone(), search)),
            actors: Arc::new(ActorUsecase::new(ActorRepo::new(db.clone()), cache.clone(), assets)),
            genres: Arc::new(GenreUsecase::new(GenreRepo::new(db.clone()), cache.clone())),
            reviews: Arc::new(ReviewUsecase::new(ReviewRepo::new(db), cache.clone())),
            config,
            jwt,
            cache,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,film_catalog=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Arc::new(Config::from_env()?);

    let http = reqwest::Client::builder()
        .user_agent("film-catalog/0.1")
        .timeout(Duration::from_secs(30))
        .build()?;

    let db = db::connect_and_migrate(&config.database_url).await?;

    let search: Arc<dyn SearchIndex> = if config.search_url.is_empty() {
        Arc::new(MemoryIndex::default())
    } else {
        Arc::new(ElasticIndex::new(
            http.clone(),
            config.search_url.clone(),
            config.search_index.clone(),
            config.search_rps,
        ))
    };

    let oauth = config
        .oauth
        .iter()
        .map(|s| {
            let provider: Arc<dyn OAuthProvider> = Arc::new(HttpOAuthProvider::new(http.clone(), s.clone()));
            (s.name.clone(), provider)
        })
        .collect();

    let adapters = Adapters {
        cache: Arc::new(SqlCacheStore::new(db.clone())),
        objects: Arc::new(FsObjectStore::new(
            config.object_store_root.clone(),
            config.object_store_public_url.clone(),
        )),
        search,
        mailer: Arc::new(LogMailer),
        oauth,
    };
    let state = AppState::new(config.clone(), db.clone(), adapters);

    if config.search_url.is_empty() {
        let count = state.films.reindex().await?;
        tracing::info!(count, "in-process search index built");
    }
    jobs::spawn_sweep(UserRepo::new(db), state.cache.clone(), state.email.clone(), &config);

    let app = routes::app(state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
