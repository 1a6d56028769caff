use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Redirect,
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};

use super::usecase::{AccessToken, SignIn, SignUp, Tokens};
use crate::{
    AppState,
    error::AppResult,
    response::{ApiResponse, Created, created, done, ok},
};

pub const REFRESH_COOKIE: &str = "refresh_token";
const COOKIE_PATH: &str = "/v1/auth";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sign-up", post(sign_up))
        .route("/sign-in", post(sign_in))
        .route("/refresh-token", post(refresh_token))
        .route("/logout", post(logout))
        .route("/{provider}", get(oauth_start))
        .route("/{provider}/callback", get(oauth_callback))
}

async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUp>,
) -> AppResult<(axum::http::StatusCode, Json<ApiResponse<Created>>)> {
    let user = state.auth.sign_up(req).await?;
    Ok(created(Created { id: user.id }))
}

async fn sign_in(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<SignIn>,
) -> AppResult<(CookieJar, Json<ApiResponse<AccessToken>>)> {
    let tokens = state.auth.sign_in(req).await?;
    Ok(session(&state, jar, tokens))
}

async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<Json<ApiResponse<AccessToken>>> {
    let token = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string());
    Ok(ok(state.auth.refresh(token.as_deref()).await?))
}

async fn logout(jar: CookieJar) -> (CookieJar, Json<ApiResponse<()>>) {
    (jar.remove(Cookie::build(REFRESH_COOKIE).path(COOKIE_PATH)), done())
}

async fn oauth_start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> AppResult<Redirect> {
    let url = state.auth.oauth_start(&provider).await?;
    Ok(Redirect::to(&url))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    #[serde(default)]
    state: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Serialize)]
struct OAuthSession {
    access_token: String,
    existing_account: bool,
}

async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(q): Query<CallbackQuery>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<ApiResponse<OAuthSession>>)> {
    let (tokens, existing_account) = state.auth.oauth_callback(&provider, &q.state, &q.code).await?;
    let jar = jar.add(refresh_cookie(&state, tokens.refresh));
    Ok((jar, ok(OAuthSession { access_token: tokens.access, existing_account })))
}

fn session(state: &AppState, jar: CookieJar, tokens: Tokens) -> (CookieJar, Json<ApiResponse<AccessToken>>) {
    let jar = jar.add(refresh_cookie(state, tokens.refresh));
    (jar, ok(AccessToken { access_token: tokens.access }))
}

fn refresh_cookie(state: &AppState, value: String) -> Cookie<'static> {
    let max_age = time::Duration::seconds(state.jwt.refresh_ttl().as_secs() as i64);
    Cookie::build((REFRESH_COOKIE, value))
        .path(COOKIE_PATH)
        .http_only(true)
        .secure(state.config.cookie_secure)
        .same_site(SameSite::Strict)
        .max_age(max_age)
        .build()
}
