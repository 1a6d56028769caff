use std::{collections::HashMap, sync::Arc, time::Duration};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    jwt::{JwtKeys, TokenKind},
    oauth::OAuthProvider,
    password,
};
use crate::{
    cache::{Cache, keys},
    entities::user,
    error::{AppError, AppResult},
    users::{NewUser, UserRepo},
    validation::Validator,
};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Clone, Debug, Deserialize)]
pub struct SignUp {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub login: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SignIn {
    pub email: Option<String>,
    pub login: Option<String>,
    #[serde(default)]
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct Tokens {
    pub access: String,
    pub refresh: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct AccessToken {
    pub access_token: String,
}

pub fn validate_login(v: &mut Validator, login: &str) {
    v.check(
        (3..=32).contains(&login.chars().count()),
        "login",
        "must be between 3 and 32 characters",
    )
    .check(
        login.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'),
        "login",
        "may only contain letters, digits, '.', '_' and '-'",
    )
    .check(!login.contains('@'), "login", "must not contain '@'");
}

pub struct AuthUsecase {
    users: UserRepo,
    cache: Cache,
    jwt: Arc<JwtKeys>,
    providers: HashMap<String, Arc<dyn OAuthProvider>>,
    state_ttl: Duration,
}

impl AuthUsecase {
    pub fn new(
        users: UserRepo,
        cache: Cache,
        jwt: Arc<JwtKeys>,
        providers: HashMap<String, Arc<dyn OAuthProvider>>,
        state_ttl: Duration,
    ) -> Self {
        Self { users, cache, jwt, providers, state_ttl }
    }

    /// Creates an unverified password account; the email must be confirmed before sign-in.
    pub async fn sign_up(&self, req: SignUp) -> AppResult<user::Model> {
        let login = req.login.as_deref().map(str::trim).filter(|l| !l.is_empty());

        let mut v = Validator::new();
        v.required("email", &req.email).email("email", req.email.trim()).check(
            req.password.chars().count() >= MIN_PASSWORD_LEN,
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        );
        if let Some(login) = login {
            validate_login(&mut v, login);
        }
        v.finish()?;

        let user = self
            .users
            .create(NewUser {
                email: req.email,
                login: login.map(str::to_string),
                hashed_password: Some(password::hash(&req.password)?),
                verified_email: false,
                avatar_url: None,
            })
            .await?;

        info!(user_id = user.id, "account created");
        Ok(user)
    }

    pub async fn sign_in(&self, req: SignIn) -> AppResult<Tokens> {
        const BAD_CREDENTIALS: AppError = AppError::Unauthorized("invalid credentials");

        let email = req.email.as_deref().map(str::trim).filter(|e| !e.is_empty());
        let login = req.login.as_deref().map(str::trim).filter(|l| !l.is_empty());

        let mut v = Validator::new();
        v.check(email.is_some() || login.is_some(), "email", "or login is required")
            .required("password", &req.password);
        v.finish()?;

        let found = match (email, login) {
            (Some(email), _) => self.users.by_email(email).await?,
            (None, Some(login)) => self.users.by_login(login).await?,
            (None, None) => None,
        };
        let user = found.ok_or(BAD_CREDENTIALS)?;

        let Some(hash) = user.hashed_password.as_deref() else {
            return Err(AppError::Unauthorized("account signs in through oauth"));
        };
        if !password::verify(&req.password, hash) {
            return Err(BAD_CREDENTIALS);
        }
        if !user.verified_email {
            return Err(AppError::Forbidden("email not confirmed"));
        }

        self.tokens(&user)
    }

    /// Exchanges a refresh token for a new access token, re-reading the admin flag.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> AppResult<AccessToken> {
        let token = refresh_token.ok_or(AppError::Unauthorized("missing refresh token"))?;
        let claims = self.jwt.verify(token, TokenKind::Refresh)?;
        let user = self
            .users
            .by_id(claims.sub)
            .await?
            .ok_or(AppError::Unauthorized("account no longer exists"))?;

        Ok(AccessToken { access_token: self.jwt.issue(user.id, user.is_admin, TokenKind::Access)? })
    }

    /// Returns the provider's consent URL carrying a fresh single-use state.
    pub async fn oauth_start(&self, provider: &str) -> AppResult<String> {
        let oauth = self.provider(provider)?;

        let mut raw = [0u8; 24];
        rand::thread_rng().fill_bytes(&mut raw);
        let state = hex::encode(raw);

        self.cache.put_token(&keys::oauth_state(&state), provider, self.state_ttl).await?;
        Ok(oauth.authorize_url(&state))
    }

    /// Verifies and consumes the state, then signs in the matching account, creating a
    /// verified one on first use. The flag is true when the account already existed.
    pub async fn oauth_callback(
        &self,
        provider: &str,
        state: &str,
        code: &str,
    ) -> AppResult<(Tokens, bool)> {
        let oauth = self.provider(provider)?;

        let issued_for = self.cache.take_token(&keys::oauth_state(state)).await?;
        if issued_for.as_deref() != Some(provider) {
            return Err(AppError::Unauthorized("invalid oauth state"));
        }

        let identity = oauth.exchange(code).await.map_err(|err| {
            tracing::warn!(provider, error = %err, "oauth exchange failed");
            AppError::Unauthorized("oauth exchange failed")
        })?;

        if let Some(user) = self.users.by_email(&identity.email).await? {
            if !user.verified_email {
                self.users.mark_verified(user.id).await?;
            }
            return Ok((self.tokens(&user)?, true));
        }

        let mut new = NewUser {
            email: identity.email,
            login: identity.login.filter(|l| {
                let mut v = Validator::new();
                validate_login(&mut v, l);
                v.finish().is_ok()
            }),
            hashed_password: None,
            verified_email: true,
            avatar_url: identity.avatar_url,
        };

        let user = match self.users.create(new.clone()).await {
            Err(AppError::AlreadyExists("login")) => {
                new.login = None;
                self.users.create(new).await?
            },
            other => other?,
        };

        info!(user_id = user.id, provider, "oauth account created");
        Ok((self.tokens(&user)?, false))
    }

    fn provider(&self, name: &str) -> AppResult<&Arc<dyn OAuthProvider>> {
        self.providers.get(name).ok_or(AppError::NotFound("oauth provider"))
    }

    fn tokens(&self, user: &user::Model) -> AppResult<Tokens> {
        Ok(Tokens {
            access: self.jwt.issue(user.id, user.is_admin, TokenKind::Access)?,
            refresh: self.jwt.issue(user.id, user.is_admin, TokenKind::Refresh)?,
        })
    }
}
