pub mod repo;
pub mod routes;
pub mod usecase;

use serde::{Deserialize, Serialize};

pub use usecase::GenreUsecase;

use crate::{entities::genre, error::AppResult, validation::Validator};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenreDto {
    pub id: i32,
    pub name: String,
    pub created_at: i64,
}

impl From<genre::Model> for GenreDto {
    fn from(m: genre::Model) -> Self {
        Self { id: m.id, name: m.name, created_at: m.created_at }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct GenreInput {
    #[serde(default)]
    pub name: String,
}

impl GenreInput {
    pub fn validate(&self) -> AppResult<String> {
        let name = self.name.trim();
        let mut v = Validator::new();
        v.required("name", name).max_len("name", name, 64);
        v.finish()?;
        Ok(name.to_string())
    }
}
