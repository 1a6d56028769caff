pub mod extract;
pub mod jwt;
pub mod oauth;
pub mod password;
pub mod routes;
pub mod usecase;

pub use extract::{AdminUser, AuthUser};
pub use usecase::AuthUsecase;
