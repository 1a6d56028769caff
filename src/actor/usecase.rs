use tracing::{info, warn};

use super::{ActorDto, ActorInput, ActorUpdate, query::ActorQuery, repo::ActorRepo};
use crate::{
    cache::{Cache, keys},
    error::{AppError, AppResult},
    images::{self, AVATAR_LARGE, WEBP},
    models::{BulkDeleted, ImageChange, Page, Upload},
    storage::{ACTOR_AVATARS, Assets, actor_avatar_key},
};

pub struct ActorUsecase {
    repo: ActorRepo,
    cache: Cache,
    assets: Assets,
}

impl ActorUsecase {
    pub fn new(repo: ActorRepo, cache: Cache, assets: Assets) -> Self {
        Self { repo, cache, assets }
    }

    pub async fn get_actor(&self, id: i32) -> AppResult<ActorDto> {
        let key = keys::actor(id);
        if let Some(hit) = self.cache.get_one(&key).await {
            return Ok(hit);
        }

        let dto = self.repo.get(id).await?.ok_or(AppError::NotFound("actor"))?;
        self.cache.put_one(&key, &dto).await;
        Ok(dto)
    }

    pub async fn list_actors(&self, query: &ActorQuery) -> AppResult<Vec<ActorDto>> {
        let key = query.cache_key();
        if let Some(hit) = self.cache.get_list(&key).await {
            return Ok(hit);
        }

        let list = self.repo.list(query).await?;
        self.cache.put_list(&key, &list).await;
        Ok(list)
    }

    pub async fn admin_list_actors(&self, page: Page) -> AppResult<Vec<ActorDto>> {
        self.repo.page(page).await
    }

    pub async fn create_actor(&self, mut input: ActorInput, avatar: Option<Upload>) -> AppResult<ActorDto> {
        input.validate()?;
        let avatar = avatar.map(|up| process(&up)).transpose()?;

        let saved = self.repo.create(&input).await?;

        if let Some(bytes) = avatar {
            let url = match self.assets.put(ACTOR_AVATARS, &actor_avatar_key(saved.id), bytes, WEBP).await {
                Ok(url) => url,
                Err(err) => {
                    if let Err(cleanup) = self.repo.delete_many(&[saved.id]).await {
                        warn!(actor_id = saved.id, error = %cleanup, "actor cleanup after failed upload failed");
                    }
                    return Err(err);
                },
            };
            self.repo.set_avatar(saved.id, Some(url)).await?;
        }

        self.invalidate(&[saved.id]).await;
        info!(actor_id = saved.id, name = %saved.name, "actor created");

        self.repo.get(saved.id).await?.ok_or(AppError::NotFound("actor"))
    }

    pub async fn update_actor(
        &self,
        id: i32,
        update: ActorUpdate,
        avatar: Option<Upload>,
    ) -> AppResult<ActorDto> {
        let ActorUpdate { actor: mut input, reset_avatar } = update;
        input.validate()?;
        let avatar = avatar.map(|up| process(&up)).transpose()?;

        let current = self.repo.find(id).await?.ok_or(AppError::NotFound("actor"))?;

        let change = match avatar {
            Some(bytes) => {
                ImageChange::Set(self.assets.put(ACTOR_AVATARS, &actor_avatar_key(id), bytes, WEBP).await?)
            },
            None if reset_avatar => ImageChange::Remove,
            None => ImageChange::Keep,
        };
        let drop_object = change == ImageChange::Remove && current.avatar_url.is_some();
        let uploaded = matches!(change, ImageChange::Set(_));

        match self.repo.update(id, &input, change).await {
            Ok(Some(_)) => {},
            failed => {
                if uploaded && current.avatar_url.is_none() {
                    self.assets.delete(ACTOR_AVATARS, &actor_avatar_key(id)).await;
                }
                return Err(failed.err().unwrap_or(AppError::NotFound("actor")));
            },
        }
        if drop_object {
            self.assets.delete(ACTOR_AVATARS, &actor_avatar_key(id)).await;
        }

        self.invalidate(&[id]).await;
        info!(actor_id = id, "actor updated");

        self.repo.get(id).await?.ok_or(AppError::NotFound("actor"))
    }

    pub async fn delete_actor(&self, id: i32) -> AppResult<()> {
        self.delete_actors(&[id]).await.map(|_| ())
    }

    pub async fn delete_actors(&self, ids: &[i32]) -> AppResult<BulkDeleted> {
        let removed = self.repo.delete_many(ids).await?;
        if removed.is_empty() {
            return Err(AppError::NotFound("actor"));
        }

        for actor in removed.iter().filter(|a| a.avatar_url.is_some()) {
            self.assets.delete(ACTOR_AVATARS, &actor_avatar_key(actor.id)).await;
        }
        let removed_ids: Vec<i32> = removed.iter().map(|a| a.id).collect();
        self.invalidate(&removed_ids).await;
        info!(count = removed.len(), "actors deleted");

        Ok(BulkDeleted { deleted: removed.len() as u64 })
    }

    // films embed actor names and avatars
    async fn invalidate(&self, ids: &[i32]) {
        let singles: Vec<String> = ids.iter().map(|id| keys::actor(*id)).collect();
        let singles: Vec<&str> = singles.iter().map(String::as_str).collect();
        self.cache.invalidate(&singles).await;
        for prefix in [keys::ACTORS, keys::FILM, keys::FILMS] {
            self.cache.invalidate_prefix(prefix).await;
        }
    }
}

fn process(up: &Upload) -> AppResult<Vec<u8>> {
    let variant = images::process_avatar(&up.bytes, up.content_type.as_deref(), &[AVATAR_LARGE])?
        .pop()
        .ok_or_else(|| anyhow::anyhow!("avatar pipeline produced no variant"))?;
    Ok(variant.bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        actor::query::ActorListQuery,
        film::{FilmUpdate, sample},
        images::{ImageError, fixtures::png},
        testutil::TestApp,
    };

    fn list_query(pairs: &[(&str, &str)]) -> ActorQuery {
        let map: serde_json::Map<String, serde_json::Value> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        let raw: ActorListQuery = serde_json::from_value(serde_json::Value::Object(map)).unwrap();
        raw.parse().unwrap()
    }

    fn named(name: &str) -> ActorInput {
        ActorInput { name: name.to_string(), wiki_url: String::new() }
    }

    async fn cast(app: &TestApp, title: &str, actors: Vec<i32>) -> i32 {
        let mut input = sample(title);
        input.actor_ids = actors;
        app.state.films.create_film(input, None).await.unwrap().id
    }

    #[tokio::test]
    async fn single_read_carries_filmography() {
        let app = TestApp::new().await;
        let al = app.actor("Al Pacino").await;
        let heat = cast(&app, "Heat", vec![al]).await;

        let dto = app.state.actors.get_actor(al).await.unwrap();
        assert_eq!(dto.movies_count, 1);
        assert_eq!(dto.films.unwrap().iter().map(|f| f.id).collect::<Vec<_>>(), vec![heat]);
    }

    #[tokio::test]
    async fn filters_by_film_count_and_name() {
        let app = TestApp::new().await;
        let al = app.actor("Al Pacino").await;
        let bob = app.actor("Robert De Niro").await;
        let val = app.actor("Val Kilmer").await;
        cast(&app, "Heat", vec![al, bob, val]).await;
        cast(&app, "The Godfather II", vec![al, bob]).await;
        cast(&app, "Scarface", vec![al]).await;

        let actors = &app.state.actors;
        let ids = |list: Vec<ActorDto>| list.into_iter().map(|a| a.id).collect::<Vec<_>>();

        let q = list_query(&[("min_movies", "2")]);
        assert_eq!(ids(actors.list_actors(&q).await.unwrap()), vec![al, bob]);

        let q = list_query(&[("max_movies", "1")]);
        assert_eq!(ids(actors.list_actors(&q).await.unwrap()), vec![val]);

        let q = list_query(&[("sort_by", "movies_count"), ("order", "desc")]);
        let listed = actors.list_actors(&q).await.unwrap();
        assert_eq!(listed.iter().map(|a| a.movies_count).collect::<Vec<_>>(), vec![3, 2, 1]);
        assert!(listed.iter().all(|a| a.films.is_none()));

        let q = list_query(&[("name", "DE NIRO")]);
        assert_eq!(ids(actors.list_actors(&q).await.unwrap()), vec![bob]);
    }

    #[tokio::test]
    async fn actors_without_films_are_listed() {
        let app = TestApp::new().await;
        let loner = app.actor("Nobody").await;
        let q = list_query(&[("max_movies", "0")]);
        let listed = app.state.actors.list_actors(&q).await.unwrap();
        assert_eq!(listed.iter().map(|a| (a.id, a.movies_count)).collect::<Vec<_>>(), vec![(loner, 0)]);
    }

    #[tokio::test]
    async fn created_year_range_uses_calendar_years() {
        let app = TestApp::new().await;
        app.actor("Al Pacino").await;
        let this_year = jiff::Zoned::now().with_time_zone(jiff::tz::TimeZone::UTC).year().to_string();
        let actors = &app.state.actors;

        let q = list_query(&[("created_from_year", &this_year), ("created_to_year", &this_year)]);
        assert_eq!(actors.list_actors(&q).await.unwrap().len(), 1);

        let q = list_query(&[("created_to_year", "2000")]);
        assert!(actors.list_actors(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn film_changes_refresh_actor_views() {
        let app = TestApp::new().await;
        let al = app.actor("Al Pacino").await;
        let heat = cast(&app, "Heat", vec![al]).await;
        let everyone = ActorQuery::unfiltered(Page::default());

        assert_eq!(app.state.actors.get_actor(al).await.unwrap().movies_count, 1);
        assert_eq!(app.state.actors.list_actors(&everyone).await.unwrap()[0].movies_count, 1);

        let update = FilmUpdate { film: sample("Heat"), remove_poster: false };
        app.state.films.update_film(heat, update, None).await.unwrap();

        assert_eq!(app.state.actors.get_actor(al).await.unwrap().movies_count, 0);
        assert_eq!(app.state.actors.list_actors(&everyone).await.unwrap()[0].movies_count, 0);
    }

    #[tokio::test]
    async fn rename_shows_up_in_films() {
        let app = TestApp::new().await;
        let al = app.actor("Al Pacino").await;
        let heat = cast(&app, "Heat", vec![al]).await;
        assert_eq!(app.state.films.get_film(heat).await.unwrap().actors[0].name, "Al Pacino");

        let update = ActorUpdate { actor: named("Alfredo Pacino"), reset_avatar: false };
        app.state.actors.update_actor(al, update, None).await.unwrap();
        assert_eq!(app.state.films.get_film(heat).await.unwrap().actors[0].name, "Alfredo Pacino");
    }

    #[tokio::test]
    async fn avatar_must_be_square() {
        let app = TestApp::new().await;
        let upload = Upload { bytes: png(40, 30), content_type: Some("image/png".into()) };
        let err = app.state.actors.create_actor(named("Al"), Some(upload)).await.unwrap_err();
        assert!(matches!(err, AppError::Image(ImageError::InvalidResolution)));
        assert_eq!(app.state.actors.admin_list_actors(Page::default()).await.unwrap().len(), 0);
        assert_eq!(app.objects.len(), 0);
    }

    #[tokio::test]
    async fn avatar_is_stored_then_reset() {
        let app = TestApp::new().await;
        let upload = Upload { bytes: png(32, 32), content_type: None };
        let dto = app.state.actors.create_actor(named("Al"), Some(upload)).await.unwrap();
        assert!(dto.avatar_url.is_some());
        assert!(app.objects.contains(ACTOR_AVATARS, &actor_avatar_key(dto.id)));

        let update = ActorUpdate { actor: named("Al"), reset_avatar: true };
        let dto = app.state.actors.update_actor(dto.id, update, None).await.unwrap();
        assert_eq!(dto.avatar_url, None);
        assert!(!app.objects.contains(ACTOR_AVATARS, &actor_avatar_key(dto.id)));
    }

    #[tokio::test]
    async fn failed_row_update_removes_the_fresh_avatar() {
        use sea_orm::ConnectionTrait;

        let app = TestApp::new().await;
        let al = app.actor("Al Pacino").await;
        app.db
            .execute_unprepared(
                "CREATE TRIGGER actor_frozen BEFORE UPDATE ON actors BEGIN SELECT RAISE(ABORT, 'frozen'); END",
            )
            .await
            .unwrap();

        let update = ActorUpdate { actor: named("Al"), reset_avatar: false };
        let upload = Upload { bytes: png(32, 32), content_type: None };
        assert!(app.state.actors.update_actor(al, update, Some(upload)).await.is_err());
        assert!(!app.objects.contains(ACTOR_AVATARS, &actor_avatar_key(al)));
        assert_eq!(app.state.actors.get_actor(al).await.unwrap().avatar_url, None);
    }

    #[tokio::test]
    async fn delete_is_not_repeatable() {
        let app = TestApp::new().await;
        let al = app.actor("Al Pacino").await;
        let res = app.state.actors.delete_actors(&[al, 999]).await.unwrap();
        assert_eq!(res.deleted, 1);
        assert!(matches!(app.state.actors.delete_actor(al).await, Err(AppError::NotFound("actor"))));
    }
}
