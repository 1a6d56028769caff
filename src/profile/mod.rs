pub mod routes;
pub mod usecase;

use serde::{Deserialize, Serialize};

pub use usecase::ProfileUsecase;

use crate::entities::user;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileDto {
    pub id: i32,
    pub email: String,
    pub login: Option<String>,
    pub avatar_url: Option<String>,
    pub avatar_small_url: Option<String>,
    pub verified_email: bool,
    pub is_admin: bool,
    /// False for accounts that only sign in through OAuth.
    pub has_password: bool,
    pub created_at: i64,
}

impl From<user::Model> for ProfileDto {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            email: u.email,
            login: u.login,
            avatar_url: u.avatar_url,
            avatar_small_url: u.avatar_small_url,
            verified_email: u.verified_email,
            is_admin: u.is_admin,
            has_password: u.hashed_password.is_some(),
            created_at: u.created_at,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub login: Option<String>,
    #[serde(default)]
    pub reset_avatar: bool,
}
