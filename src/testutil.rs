use std::{collections::HashMap, sync::Arc};

use axum::Router;
use sea_orm::DatabaseConnection;

use crate::{
    Adapters, AppState,
    actor::ActorInput,
    auth::{
        AuthUser,
        jwt::TokenKind,
        oauth::{OAuthIdentity, OAuthProvider, fake::FakeProvider},
    },
    cache::memory::MemoryCacheStore,
    config::Config,
    db,
    film::sample,
    genre::GenreInput,
    mailer::memory::RecordingMailer,
    search::MemoryIndex,
    storage::memory::MemoryObjectStore,
    users::{NewUser, UserRepo},
};

/// A fully wired application over in-memory adapters and a fresh database.
pub struct TestApp {
    pub state: AppState,
    pub db: DatabaseConnection,
    pub cache: Arc<MemoryCacheStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = db::memory().await;
        let cache = Arc::new(MemoryCacheStore::default());
        let objects = Arc::new(MemoryObjectStore::default());
        let mailer = Arc::new(RecordingMailer::default());

        let github: Arc<dyn OAuthProvider> = Arc::new(FakeProvider {
            identity: OAuthIdentity {
                email: "octo@github.test".to_string(),
                login: Some("octo".to_string()),
                avatar_url: None,
            },
        });
        let adapters = Adapters {
            cache: cache.clone(),
            objects: objects.clone(),
            search: Arc::new(MemoryIndex::default()),
            mailer: mailer.clone(),
            oauth: HashMap::from([("github".to_string(), github)]),
        };
        let state = AppState::new(Arc::new(Config::for_tests()), db.clone(), adapters);

        Self { state, db, cache, objects, mailer }
    }

    pub fn users(&self) -> UserRepo {
        UserRepo::new(self.db.clone())
    }

    pub fn router(&self) -> Router {
        crate::routes::app(self.state.clone())
    }

    /// A confirmed account without a password.
    pub async fn user(&self, email: &str) -> AuthUser {
        let user = self
            .users()
            .create(NewUser {
                email: email.to_string(),
                login: None,
                hashed_password: None,
                verified_email: true,
                avatar_url: None,
            })
            .await
            .unwrap();
        AuthUser { user_id: user.id, is_admin: false }
    }

    pub async fn admin(&self, email: &str) -> AuthUser {
        let who = self.user(email).await;
        self.users().make_admin(who.user_id).await.unwrap();
        AuthUser { is_admin: true, ..who }
    }

    pub fn bearer(&self, who: &AuthUser) -> String {
        let token = self.state.jwt.issue(who.user_id, who.is_admin, TokenKind::Access).unwrap();
        format!("Bearer {token}")
    }

    pub async fn film(&self, title: &str) -> i32 {
        self.state.films.create_film(sample(title), None).await.unwrap().id
    }

    pub async fn genre(&self, name: &str) -> i32 {
        self.state.genres.create_genre(GenreInput { name: name.to_string() }).await.unwrap().id
    }

    pub async fn actor(&self, name: &str) -> i32 {
        let input = ActorInput { name: name.to_string(), wiki_url: String::new() };
        self.state.actors.create_actor(input, None).await.unwrap().id
    }
}
