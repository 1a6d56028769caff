use futures::{StreamExt, stream};
use tracing::{info, warn};

use super::{
    FilmDto, FilmInput, FilmUpdate,
    query::FilmQuery,
    repo::{FilmRepo, doc},
};
use crate::{
    cache::{Cache, keys},
    error::{AppError, AppResult},
    images::{self, WEBP},
    models::{BulkDeleted, ImageChange, Page, Upload},
    search::Search,
    storage::{Assets, FILM_POSTERS, poster_key},
};

const REINDEX_CONCURRENCY: usize = 8;

pub struct FilmUsecase {
    repo: FilmRepo,
    cache: Cache,
    assets: Assets,
    search: Search,
}

impl FilmUsecase {
    pub fn new(repo: FilmRepo, cache: Cache, assets: Assets, search: Search) -> Self {
        Self { repo, cache, assets, search }
    }

    pub async fn get_film(&self, id: i32) -> AppResult<FilmDto> {
        let key = keys::film(id);
        if let Some(hit) = self.cache.get_one(&key).await {
            return Ok(hit);
        }

        let dto = self.repo.get(id).await?.ok_or(AppError::NotFound("film"))?;
        self.cache.put_one(&key, &dto).await;
        Ok(dto)
    }

    pub async fn list_films(&self, query: &FilmQuery) -> AppResult<Vec<FilmDto>> {
        let key = query.cache_key();
        if let Some(hit) = self.cache.get_list(&key).await {
            return Ok(hit);
        }

        let list = self.repo.list(query).await?;
        self.cache.put_list(&key, &list).await;
        Ok(list)
    }

    /// Full-text search over title, synopsis and producer, best match first.
    pub async fn search_films(&self, query: &str) -> AppResult<Vec<FilmDto>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::invalid("query", "is a required field"));
        }
        let ids = self.search.search(query).await?;
        self.repo.by_ids(&ids).await
    }

    pub async fn admin_list_films(&self, page: Page) -> AppResult<Vec<FilmDto>> {
        self.repo.page(page).await
    }

    /// Inserts the film, then stores its poster under the new id. A failed upload
    /// removes the film again so no record points at a missing poster.
    pub async fn create_film(&self, mut input: FilmInput, poster: Option<Upload>) -> AppResult<FilmDto> {
        input.validate()?;
        let poster = match poster {
            Some(up) => Some(images::process_poster(&up.bytes, up.content_type.as_deref())?),
            None => None,
        };

        let saved = self.repo.create(&input).await?;

        if let Some(bytes) = poster {
            let url = match self.assets.put(FILM_POSTERS, &poster_key(saved.id), bytes, WEBP).await {
                Ok(url) => url,
                Err(err) => {
                    if let Err(cleanup) = self.repo.delete_many(&[saved.id]).await {
                        warn!(film_id = saved.id, error = %cleanup, "film cleanup after failed upload failed");
                    }
                    return Err(err);
                },
            };
            self.repo.set_poster(saved.id, Some(url)).await?;
        }

        self.search.index_film(&doc(&saved)).await;
        self.invalidate(&[saved.id]).await;
        info!(film_id = saved.id, title = %saved.title, "film created");

        self.repo.get(saved.id).await?.ok_or(AppError::NotFound("film"))
    }

    pub async fn update_film(
        &self,
        id: i32,
        update: FilmUpdate,
        poster: Option<Upload>,
    ) -> AppResult<FilmDto> {
        let FilmUpdate { film: mut input, remove_poster } = update;
        input.validate()?;
        let poster = match poster {
            Some(up) => Some(images::process_poster(&up.bytes, up.content_type.as_deref())?),
            None => None,
        };

        let current = self.repo.find(id).await?.ok_or(AppError::NotFound("film"))?;
        self.repo.check_links(&input).await?;

        let change = match poster {
            Some(bytes) => ImageChange::Set(self.assets.put(FILM_POSTERS, &poster_key(id), bytes, WEBP).await?),
            None if remove_poster => ImageChange::Remove,
            None => ImageChange::Keep,
        };
        let drop_object = change == ImageChange::Remove && current.poster_url.is_some();
        let uploaded = matches!(change, ImageChange::Set(_));

        let saved = match self.repo.update(id, &input, change).await {
            Ok(Some(saved)) => saved,
            failed => {
                if uploaded && current.poster_url.is_none() {
                    self.assets.delete(FILM_POSTERS, &poster_key(id)).await;
                }
                return Err(failed.err().unwrap_or(AppError::NotFound("film")));
            },
        };
        if drop_object {
            self.assets.delete(FILM_POSTERS, &poster_key(id)).await;
        }

        self.search.index_film(&doc(&saved)).await;
        self.invalidate(&[id]).await;
        info!(film_id = id, "film updated");

        self.repo.get(id).await?.ok_or(AppError::NotFound("film"))
    }

    pub async fn delete_film(&self, id: i32) -> AppResult<()> {
        self.delete_films(&[id]).await.map(|_| ())
    }

    pub async fn delete_films(&self, ids: &[i32]) -> AppResult<BulkDeleted> {
        let removed = self.repo.delete_many(ids).await?;
        if removed.is_empty() {
            return Err(AppError::NotFound("film"));
        }

        let removed_ids: Vec<i32> = removed.iter().map(|f| f.id).collect();
        for film in &removed {
            if film.poster_url.is_some() {
                self.assets.delete(FILM_POSTERS, &poster_key(film.id)).await;
            }
            self.search.delete_film(film.id).await;
        }
        self.invalidate(&removed_ids).await;
        info!(count = removed.len(), "films deleted");

        Ok(BulkDeleted { deleted: removed.len() as u64 })
    }

    /// Pushes every stored film into the search index.
    pub async fn reindex(&self) -> AppResult<usize> {
        let docs = self.repo.search_docs().await?;
        let count = docs.len();
        stream::iter(docs.iter())
            .for_each_concurrent(REINDEX_CONCURRENCY, |d| self.search.index_film(d))
            .await;
        Ok(count)
    }

    // reviews embed title and poster, actors embed film briefs and counts
    async fn invalidate(&self, ids: &[i32]) {
        let singles: Vec<String> = ids.iter().map(|id| keys::film(*id)).collect();
        let singles: Vec<&str> = singles.iter().map(String::as_str).collect();
        self.cache.invalidate(&singles).await;
        for prefix in [keys::FILMS, keys::REVIEW, keys::REVIEWS, keys::ACTOR, keys::ACTORS] {
            self.cache.invalidate_prefix(prefix).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        film::{query::FilmListQuery, sample},
        images::fixtures::png,
        review::ReviewInput,
        testutil::TestApp,
    };

    fn list_query(pairs: &[(&str, &str)]) -> FilmQuery {
        let map: serde_json::Map<String, serde_json::Value> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        let raw: FilmListQuery = serde_json::from_value(serde_json::Value::Object(map)).unwrap();
        raw.parse().unwrap()
    }

    fn png_upload(w: u32, h: u32) -> Upload {
        Upload { bytes: png(w, h), content_type: Some("image/png".into()) }
    }

    #[tokio::test]
    async fn genre_filter_requires_every_genre() {
        let app = TestApp::new().await;
        let (g1, g2, g3) = (app.genre("Crime").await, app.genre("Drama").await, app.genre("War").await);
        let films = &app.state.films;

        let mut both = sample("Heat");
        both.genre_ids = vec![g1, g2];
        let both = films.create_film(both, None).await.unwrap();
        let mut other = sample("Ronin");
        other.genre_ids = vec![g1, g3];
        films.create_film(other, None).await.unwrap();

        let ids = format!("{g1},{g2}");
        let found = films.list_films(&list_query(&[("genre_ids", &ids)])).await.unwrap();
        assert_eq!(found.iter().map(|f| f.id).collect::<Vec<_>>(), vec![both.id]);
        assert_eq!(found[0].genres.len(), 2);

        let ids = g1.to_string();
        assert_eq!(films.list_films(&list_query(&[("genre_ids", &ids)])).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn actor_filter_requires_every_actor() {
        let app = TestApp::new().await;
        let (a, b) = (app.actor("De Niro").await, app.actor("Pacino").await);
        let films = &app.state.films;

        let mut heat = sample("Heat");
        heat.actor_ids = vec![a, b];
        let heat = films.create_film(heat, None).await.unwrap();
        let mut ronin = sample("Ronin");
        ronin.actor_ids = vec![a];
        films.create_film(ronin, None).await.unwrap();

        let ids = format!("{b},{a}");
        let found = films.list_films(&list_query(&[("actor_ids", &ids)])).await.unwrap();
        assert_eq!(found.iter().map(|f| f.id).collect::<Vec<_>>(), vec![heat.id]);
    }

    #[tokio::test]
    async fn pages_split_the_result_set() {
        let app = TestApp::new().await;
        for i in 0..25 {
            app.film(&format!("Film {i:02}")).await;
        }

        let mut sizes = Vec::new();
        for page in ["1", "2", "3", "4"] {
            let q = list_query(&[("page", page), ("page_size", "10")]);
            sizes.push(app.state.films.list_films(&q).await.unwrap().len());
        }
        assert_eq!(sizes, vec![10, 10, 5, 0]);
    }

    #[tokio::test]
    async fn sorts_and_filters_on_scalar_fields() {
        let app = TestApp::new().await;
        let films = &app.state.films;
        for (title, date, runtime) in
            [("B", "1995-12-15", 170), ("A", "1998-09-25", 122), ("C", "1990-09-19", 146)]
        {
            let mut input = sample(title);
            input.release_date = date.to_string();
            input.runtime = runtime;
            films.create_film(input, None).await.unwrap();
        }

        let titles = |list: Vec<FilmDto>| list.into_iter().map(|f| f.title).collect::<Vec<_>>();

        let q = list_query(&[("sort_by", "title")]);
        assert_eq!(titles(films.list_films(&q).await.unwrap()), vec!["A", "B", "C"]);

        let q = list_query(&[("sort_by", "release_date"), ("order", "desc")]);
        assert_eq!(titles(films.list_films(&q).await.unwrap()), vec!["A", "B", "C"]);

        let q = list_query(&[("released_from", "1991-01-01"), ("max_runtime", "150")]);
        assert_eq!(titles(films.list_films(&q).await.unwrap()), vec!["A"]);

        let q = list_query(&[("title", "b")]);
        assert_eq!(titles(films.list_films(&q).await.unwrap()), vec!["B"]);
    }

    #[tokio::test]
    async fn rating_filter_and_sort_use_stats() {
        let app = TestApp::new().await;
        let ann = app.user("ann@x.io").await;
        let (low, high, unrated) = (app.film("Low").await, app.film("High").await, app.film("None").await);
        for (film_id, rating) in [(low, 20), (high, 90)] {
            let input = ReviewInput { film_id, rating, review_text: "ok".into() };
            app.state.reviews.create_review(&ann, input).await.unwrap();
        }

        let ids = |list: Vec<FilmDto>| list.into_iter().map(|f| f.id).collect::<Vec<_>>();
        let films = &app.state.films;

        let q = list_query(&[("sort_by", "rating"), ("order", "desc")]);
        assert_eq!(ids(films.list_films(&q).await.unwrap()), vec![high, low, unrated]);

        let q = list_query(&[("min_rating", "50")]);
        assert_eq!(ids(films.list_films(&q).await.unwrap()), vec![high]);
    }

    #[tokio::test]
    async fn update_invalidates_every_view_of_the_film() {
        let app = TestApp::new().await;
        let ann = app.user("ann@x.io").await;
        let id = app.film("Heat").await;
        let review = app
            .state
            .reviews
            .create_review(&ann, ReviewInput { film_id: id, rating: 80, review_text: "ok".into() })
            .await
            .unwrap();
        let films = &app.state.films;
        let default_list = FilmQuery { filter: Default::default(), sort: Default::default(), page: Page::default() };

        films.get_film(id).await.unwrap();
        films.list_films(&default_list).await.unwrap();
        app.state.reviews.get_review(review.id).await.unwrap();
        assert!(app.cache.contains(&keys::film(id)));
        assert!(app.cache.contains(&default_list.cache_key()));
        assert!(app.cache.contains(&keys::review(review.id)));

        let update = FilmUpdate { film: sample("Heat (1995)"), remove_poster: false };
        films.update_film(id, update, None).await.unwrap();

        assert!(!app.cache.contains(&keys::film(id)));
        assert!(!app.cache.contains(&default_list.cache_key()));
        assert!(!app.cache.contains(&keys::review(review.id)));

        assert_eq!(films.get_film(id).await.unwrap().title, "Heat (1995)");
        assert_eq!(films.list_films(&default_list).await.unwrap()[0].title, "Heat (1995)");
        assert_eq!(app.state.reviews.get_review(review.id).await.unwrap().film_title, "Heat (1995)");
    }

    #[tokio::test]
    async fn update_replaces_links() {
        let app = TestApp::new().await;
        let (g1, g2) = (app.genre("Crime").await, app.genre("Drama").await);
        let mut input = sample("Heat");
        input.genre_ids = vec![g1];
        let film = app.state.films.create_film(input, None).await.unwrap();

        let mut input = sample("Heat");
        input.genre_ids = vec![g2];
        let updated = app
            .state
            .films
            .update_film(film.id, FilmUpdate { film: input, remove_poster: false }, None)
            .await
            .unwrap();
        assert_eq!(updated.genres.iter().map(|g| g.id).collect::<Vec<_>>(), vec![g2]);
    }

    #[tokio::test]
    async fn unknown_genre_rolls_back_the_insert() {
        let app = TestApp::new().await;
        let mut input = sample("Heat");
        input.genre_ids = vec![404];
        let err = app.state.films.create_film(input, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound("genre")));
        assert!(app.state.films.admin_list_films(Page::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_is_not_repeatable() {
        let app = TestApp::new().await;
        let id = app.film("Heat").await;
        app.state.films.delete_film(id).await.unwrap();
        assert!(matches!(app.state.films.delete_film(id).await, Err(AppError::NotFound("film"))));
        assert!(matches!(app.state.films.get_film(id).await, Err(AppError::NotFound("film"))));
    }

    #[tokio::test]
    async fn poster_is_stored_and_removed() {
        let app = TestApp::new().await;
        let film = app.state.films.create_film(sample("Heat"), Some(png_upload(1200, 1800))).await.unwrap();
        assert!(film.poster_url.as_deref().is_some_and(|u| u.ends_with(&poster_key(film.id))));
        assert!(app.objects.contains(FILM_POSTERS, &poster_key(film.id)));

        let update = FilmUpdate { film: sample("Heat"), remove_poster: true };
        let film = app.state.films.update_film(film.id, update, None).await.unwrap();
        assert_eq!(film.poster_url, None);
        assert!(!app.objects.contains(FILM_POSTERS, &poster_key(film.id)));
    }

    #[tokio::test]
    async fn rejected_update_keeps_the_stored_poster() {
        let app = TestApp::new().await;
        let bare = app.film("Heat").await;
        let mut input = sample("Heat");
        input.genre_ids = vec![404];

        let update = FilmUpdate { film: input.clone(), remove_poster: false };
        let err = app.state.films.update_film(bare, update, Some(png_upload(60, 90))).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound("genre")));
        assert_eq!(app.state.films.get_film(bare).await.unwrap().poster_url, None);
        assert_eq!(app.objects.len(), 0);

        let posted = app.state.films.create_film(sample("Ronin"), Some(png_upload(60, 90))).await.unwrap();
        let before = app.objects.get(FILM_POSTERS, &poster_key(posted.id));
        let update = FilmUpdate { film: input, remove_poster: false };
        let err = app.state.films.update_film(posted.id, update, Some(png_upload(80, 120))).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound("genre")));
        assert_eq!(app.objects.get(FILM_POSTERS, &poster_key(posted.id)), before);
        assert_eq!(app.state.films.get_film(posted.id).await.unwrap().poster_url, posted.poster_url);
    }

    #[tokio::test]
    async fn failed_upload_leaves_no_film() {
        let app = TestApp::new().await;
        app.objects.set_down(true);
        let err = app.state.films.create_film(sample("Heat"), Some(png_upload(60, 90))).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable(_)));
        assert!(app.state.films.admin_list_films(Page::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bad_image_is_rejected_before_any_write() {
        let app = TestApp::new().await;
        let upload = Upload { bytes: b"not an image".to_vec(), content_type: Some("text/plain".into()) };
        let err = app.state.films.create_film(sample("Heat"), Some(upload)).await.unwrap_err();
        assert!(matches!(err, AppError::Image(images::ImageError::InvalidType)));
        assert!(app.state.films.admin_list_films(Page::default()).await.unwrap().is_empty());
        assert_eq!(app.objects.len(), 0);
    }

    #[tokio::test]
    async fn search_follows_writes() {
        let app = TestApp::new().await;
        let id = app.film("Heat").await;
        app.film("Ronin").await;

        let found = app.state.films.search_films("heat").await.unwrap();
        assert_eq!(found.iter().map(|f| f.id).collect::<Vec<_>>(), vec![id]);

        app.state.films.delete_film(id).await.unwrap();
        assert!(app.state.films.search_films("heat").await.unwrap().is_empty());
        assert!(app.state.films.search_films("  ").await.is_err());
    }

    #[tokio::test]
    async fn reads_survive_a_cache_outage() {
        let app = TestApp::new().await;
        app.cache.set_down(true);
        let id = app.film("Heat").await;
        assert_eq!(app.state.films.get_film(id).await.unwrap().title, "Heat");
    }
}
