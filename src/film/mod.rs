pub mod query;
pub mod repo;
pub mod routes;
pub mod usecase;

use serde::{Deserialize, Serialize};

pub use usecase::FilmUsecase;

use crate::{
    entities::{film, film_stats},
    error::AppResult,
    validation::{Validator, parse_date},
};

pub const MAX_SYNOPSIS_LEN: usize = 5000;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilmStatsDto {
    pub avg_rating: f64,
    pub total_reviews: i32,
    pub count_0_20: i32,
    pub count_21_40: i32,
    pub count_41_60: i32,
    pub count_61_80: i32,
    pub count_81_100: i32,
}

impl From<film_stats::Model> for FilmStatsDto {
    fn from(s: film_stats::Model) -> Self {
        Self {
            avg_rating: s.avg_rating,
            total_reviews: s.total_reviews,
            count_0_20: s.count_0_to_20,
            count_21_40: s.count_21_to_40,
            count_41_60: s.count_41_to_60,
            count_61_80: s.count_61_to_80,
            count_81_100: s.count_81_to_100,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenreBrief {
    pub id: i32,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActorBrief {
    pub id: i32,
    pub name: String,
    pub avatar_url: Option<String>,
}

/// Film summary embedded in actor payloads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilmBrief {
    pub id: i32,
    pub title: String,
    pub release_date: String,
    pub poster_url: Option<String>,
}

impl From<film::Model> for FilmBrief {
    fn from(f: film::Model) -> Self {
        Self { id: f.id, title: f.title, release_date: f.release_date, poster_url: f.poster_url }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilmDto {
    pub id: i32,
    pub title: String,
    pub synopsis: String,
    pub release_date: String,
    pub runtime: i32,
    pub producer: String,
    pub poster_url: Option<String>,
    pub created_at: i64,
    pub stats: FilmStatsDto,
    pub genres: Vec<GenreBrief>,
    pub actors: Vec<ActorBrief>,
}

/// Body of a film create, and of an update together with [`FilmUpdate`].
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FilmInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub synopsis: String,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub runtime: i32,
    #[serde(default)]
    pub producer: String,
    #[serde(default)]
    pub genre_ids: Vec<i32>,
    #[serde(default)]
    pub actor_ids: Vec<i32>,
}

impl FilmInput {
    /// Checks every field and normalises the release date and id lists.
    pub fn validate(&mut self) -> AppResult<()> {
        let mut v = Validator::new();
        v.required("title", &self.title)
            .max_len("title", &self.title, 255)
            .max_len("synopsis", &self.synopsis, MAX_SYNOPSIS_LEN)
            .range("runtime", self.runtime, 1, 1000)
            .required("producer", &self.producer)
            .max_len("producer", &self.producer, 255)
            .check(self.genre_ids.iter().all(|id| *id > 0), "genre_ids", "must be positive ids")
            .check(self.actor_ids.iter().all(|id| *id > 0), "actor_ids", "must be positive ids");
        if let Some(date) = v.parsed(parse_date("release_date", &self.release_date)) {
            self.release_date = date.to_string();
        }
        v.finish()?;

        self.title = self.title.trim().to_string();
        self.producer = self.producer.trim().to_string();
        dedup(&mut self.genre_ids);
        dedup(&mut self.actor_ids);
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct FilmUpdate {
    #[serde(flatten)]
    pub film: FilmInput,
    /// Drops the current poster when no new one is uploaded.
    #[serde(default)]
    pub remove_poster: bool,
}

fn dedup(ids: &mut Vec<i32>) {
    ids.sort_unstable();
    ids.dedup();
}

#[cfg(test)]
pub(crate) fn sample(title: &str) -> FilmInput {
    FilmInput {
        title: title.to_string(),
        synopsis: format!("{title} synopsis"),
        release_date: "2001-05-04".to_string(),
        runtime: 120,
        producer: "Studio".to_string(),
        genre_ids: Vec::new(),
        actor_ids: Vec::new(),
    }
}
