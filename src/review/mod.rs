pub mod repo;
pub mod routes;
pub mod usecase;

use serde::{Deserialize, Serialize};

pub use usecase::ReviewUsecase;

use crate::{error::AppResult, validation::Validator};

pub const MAX_TEXT_LEN: usize = 5000;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewDto {
    pub id: i32,
    pub user_id: i32,
    pub user_login: Option<String>,
    pub user_avatar_url: Option<String>,
    pub film_id: i32,
    pub film_title: String,
    pub film_poster_url: Option<String>,
    pub rating: i32,
    pub review_text: String,
    pub created_at: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReviewInput {
    #[serde(default)]
    pub film_id: i32,
    #[serde(default = "missing_rating")]
    pub rating: i32,
    #[serde(default)]
    pub review_text: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReviewUpdate {
    #[serde(default = "missing_rating")]
    pub rating: i32,
    #[serde(default)]
    pub review_text: String,
}

/// Admin-authored review on behalf of a user.
#[derive(Clone, Debug, Deserialize)]
pub struct AdminReviewInput {
    #[serde(default)]
    pub user_id: i32,
    #[serde(flatten)]
    pub review: ReviewInput,
}

fn missing_rating() -> i32 {
    -1
}

fn check_body(v: &mut Validator, rating: i32, text: &str) {
    v.range("rating", rating, 0, 100)
        .required("review_text", text)
        .max_len("review_text", text, MAX_TEXT_LEN);
}

impl ReviewInput {
    pub fn validate(&self) -> AppResult<()> {
        let mut v = Validator::new();
        v.check(self.film_id > 0, "film_id", "is a required field");
        check_body(&mut v, self.rating, &self.review_text);
        v.finish()
    }
}

impl ReviewUpdate {
    pub fn validate(&self) -> AppResult<()> {
        let mut v = Validator::new();
        check_body(&mut v, self.rating, &self.review_text);
        v.finish()
    }
}
