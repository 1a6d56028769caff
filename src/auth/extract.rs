use axum::{extract::FromRequestParts, http::request::Parts};

use super::jwt::TokenKind;
use crate::{AppState, error::AppError};

/// The caller identity decoded from a bearer access token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i32,
    pub is_admin: bool,
}

/// An [`AuthUser`] holding the admin claim.
#[derive(Clone, Copy, Debug)]
pub struct AdminUser(pub AuthUser);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Unauthorized("missing bearer token"))?;

        let claims = state.jwt.verify(token, TokenKind::Access)?;
        Ok(AuthUser { user_id: claims.sub, is_admin: claims.adm })
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(AppError::Forbidden("admin access required"));
        }
        Ok(AdminUser(user))
    }
}
