pub mod query;
pub mod repo;
pub mod routes;
pub mod usecase;

use serde::{Deserialize, Serialize};

pub use usecase::ActorUsecase;

use crate::{error::AppResult, film::FilmBrief, validation::Validator};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActorDto {
    pub id: i32,
    pub name: String,
    pub avatar_url: Option<String>,
    pub wiki_url: String,
    pub created_at: i64,
    pub movies_count: i64,
    /// Filmography; only present on single-actor reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub films: Option<Vec<FilmBrief>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ActorInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub wiki_url: String,
}

impl ActorInput {
    pub fn validate(&mut self) -> AppResult<()> {
        self.name = self.name.trim().to_string();
        self.wiki_url = self.wiki_url.trim().to_string();

        let mut v = Validator::new();
        v.required("name", &self.name).max_len("name", &self.name, 255).max_len(
            "wiki_url",
            &self.wiki_url,
            512,
        );
        if !self.wiki_url.is_empty() {
            v.check(
                self.wiki_url.starts_with("https://") || self.wiki_url.starts_with("http://"),
                "wiki_url",
                "must be an http(s) URL",
            );
        }
        v.finish()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ActorUpdate {
    #[serde(flatten)]
    pub actor: ActorInput,
    /// Drops the current avatar when no new one is uploaded.
    #[serde(default)]
    pub reset_avatar: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wiki_url_must_be_http() {
        let mut input = ActorInput { name: "Al Pacino".into(), wiki_url: "ftp://x".into() };
        assert!(input.validate().is_err());
        input.wiki_url = " https://en.wikipedia.org/wiki/Al_Pacino ".into();
        assert!(input.validate().is_ok());
        assert!(input.wiki_url.starts_with("https://"));
    }

    #[test]
    fn films_are_omitted_from_list_entries() {
        let dto = ActorDto {
            id: 1,
            name: "Al Pacino".into(),
            avatar_url: None,
            wiki_url: String::new(),
            created_at: 0,
            movies_count: 3,
            films: None,
        };
        let json = serde_json::to_value(&dto).unwrap();
        assert!(json.get("films").is_none());
        assert_eq!(json["movies_count"], 3);
    }
}
