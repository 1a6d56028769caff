use std::collections::HashMap;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

use super::{ActorBrief, FilmDto, FilmInput, GenreBrief, query::FilmQuery};
use crate::{
    cache::now_sec,
    entities::{actor, film, film_actor, film_genre, film_stats, genre},
    error::{AppError, AppResult},
    models::{ImageChange, Page},
    review::repo::recompute_stats,
    search::FilmDoc,
};

#[derive(Clone)]
pub struct FilmRepo {
    db: DatabaseConnection,
}

impl FilmRepo {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find(&self, id: i32) -> AppResult<Option<film::Model>> {
        Ok(film::Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn get(&self, id: i32) -> AppResult<Option<FilmDto>> {
        let row = film::Entity::find_by_id(id)
            .find_also_related(film_stats::Entity)
            .one(&self.db)
            .await?;
        Ok(assemble(&self.db, row.into_iter().collect()).await?.pop())
    }

    pub async fn list(&self, query: &FilmQuery) -> AppResult<Vec<FilmDto>> {
        let rows = query
            .apply(film::Entity::find().find_also_related(film_stats::Entity))
            .all(&self.db)
            .await?;
        Ok(assemble(&self.db, rows).await?)
    }

    /// Loads films in the order of `ids`; ids without a row are skipped.
    pub async fn by_ids(&self, ids: &[i32]) -> AppResult<Vec<FilmDto>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = film::Entity::find()
            .find_also_related(film_stats::Entity)
            .filter(film::Column::Id.is_in(ids.iter().copied()))
            .all(&self.db)
            .await?;
        let mut by_id: HashMap<i32, FilmDto> =
            assemble(&self.db, rows).await?.into_iter().map(|f| (f.id, f)).collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    pub async fn page(&self, page: Page) -> AppResult<Vec<FilmDto>> {
        let rows = film::Entity::find()
            .find_also_related(film_stats::Entity)
            .order_by_asc(film::Column::Id)
            .offset(page.offset())
            .limit(page.page_size)
            .all(&self.db)
            .await?;
        Ok(assemble(&self.db, rows).await?)
    }

    /// Inserts a film with its links and an empty stats row.
    pub async fn create(&self, input: &FilmInput) -> AppResult<film::Model> {
        let txn = self.db.begin().await?;

        let model = film::ActiveModel {
            title: Set(input.title.clone()),
            synopsis: Set(input.synopsis.clone()),
            release_date: Set(input.release_date.clone()),
            runtime: Set(input.runtime),
            producer: Set(input.producer.clone()),
            poster_url: Set(None),
            created_at: Set(now_sec()),
            ..Default::default()
        };
        let saved = model.insert(&txn).await?;

        link(&txn, saved.id, input).await?;
        recompute_stats(&txn, saved.id).await?;

        txn.commit().await?;
        Ok(saved)
    }

    /// Checks the genre and actor ids of `input` ahead of any side effect.
    pub async fn check_links(&self, input: &FilmInput) -> AppResult<()> {
        verify_links(&self.db, input).await
    }

    pub async fn set_poster(&self, id: i32, url: Option<String>) -> AppResult<()> {
        let model = film::ActiveModel { id: Set(id), poster_url: Set(url), ..Default::default() };
        model.update(&self.db).await?;
        Ok(())
    }

    /// Replaces every field and both link sets. Returns `None` when the film is absent.
    pub async fn update(
        &self,
        id: i32,
        input: &FilmInput,
        poster: ImageChange,
    ) -> AppResult<Option<film::Model>> {
        let txn = self.db.begin().await?;

        let Some(found) = film::Entity::find_by_id(id).one(&txn).await? else {
            return Ok(None);
        };

        let mut model: film::ActiveModel = found.into();
        model.title = Set(input.title.clone());
        model.synopsis = Set(input.synopsis.clone());
        model.release_date = Set(input.release_date.clone());
        model.runtime = Set(input.runtime);
        model.producer = Set(input.producer.clone());
        match poster {
            ImageChange::Keep => {},
            ImageChange::Set(url) => model.poster_url = Set(Some(url)),
            ImageChange::Remove => model.poster_url = Set(None),
        }
        let saved = model.update(&txn).await?;

        film_genre::Entity::delete_many().filter(film_genre::Column::FilmId.eq(id)).exec(&txn).await?;
        film_actor::Entity::delete_many().filter(film_actor::Column::FilmId.eq(id)).exec(&txn).await?;
        link(&txn, id, input).await?;

        txn.commit().await?;
        Ok(Some(saved))
    }

    /// Deletes the given films and returns the rows that existed. Links, stats and
    /// reviews go with them.
    pub async fn delete_many(&self, ids: &[i32]) -> AppResult<Vec<film::Model>> {
        let txn = self.db.begin().await?;

        let found = film::Entity::find()
            .filter(film::Column::Id.is_in(ids.iter().copied()))
            .all(&txn)
            .await?;
        if !found.is_empty() {
            film::Entity::delete_many()
                .filter(film::Column::Id.is_in(found.iter().map(|f| f.id)))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(found)
    }

    pub async fn search_docs(&self) -> AppResult<Vec<FilmDoc>> {
        let rows = film::Entity::find().order_by_asc(film::Column::Id).all(&self.db).await?;
        Ok(rows.iter().map(doc).collect())
    }
}

pub fn doc(f: &film::Model) -> FilmDoc {
    FilmDoc {
        id: f.id,
        title: f.title.clone(),
        synopsis: f.synopsis.clone(),
        producer: f.producer.clone(),
        release_date: f.release_date.clone(),
    }
}

/// Fails with `NotFound` when any referenced genre or actor is missing.
async fn verify_links<C: ConnectionTrait>(conn: &C, input: &FilmInput) -> AppResult<()> {
    if !input.genre_ids.is_empty() {
        let known = genre::Entity::find()
            .filter(genre::Column::Id.is_in(input.genre_ids.iter().copied()))
            .count(conn)
            .await?;
        if known as usize != input.genre_ids.len() {
            return Err(AppError::NotFound("genre"));
        }
    }
    if !input.actor_ids.is_empty() {
        let known = actor::Entity::find()
            .filter(actor::Column::Id.is_in(input.actor_ids.iter().copied()))
            .count(conn)
            .await?;
        if known as usize != input.actor_ids.len() {
            return Err(AppError::NotFound("actor"));
        }
    }
    Ok(())
}

async fn link<C: ConnectionTrait>(conn: &C, film_id: i32, input: &FilmInput) -> AppResult<()> {
    verify_links(conn, input).await?;

    if !input.genre_ids.is_empty() {
        film_genre::Entity::insert_many(input.genre_ids.iter().map(|genre_id| {
            film_genre::ActiveModel { film_id: Set(film_id), genre_id: Set(*genre_id) }
        }))
        .exec_without_returning(conn)
        .await?;
    }
    if !input.actor_ids.is_empty() {
        film_actor::Entity::insert_many(input.actor_ids.iter().map(|actor_id| {
            film_actor::ActiveModel { film_id: Set(film_id), actor_id: Set(*actor_id) }
        }))
        .exec_without_returning(conn)
        .await?;
    }

    Ok(())
}

/// Attaches genres and actors to film rows with one query per relation.
async fn assemble(
    db: &DatabaseConnection,
    rows: Vec<(film::Model, Option<film_stats::Model>)>,
) -> Result<Vec<FilmDto>, DbErr> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i32> = rows.iter().map(|(f, _)| f.id).collect();

    let mut genres: HashMap<i32, Vec<GenreBrief>> = HashMap::new();
    let genre_links = film_genre::Entity::find()
        .filter(film_genre::Column::FilmId.is_in(ids.iter().copied()))
        .find_also_related(genre::Entity)
        .order_by_asc(film_genre::Column::GenreId)
        .all(db)
        .await?;
    for (row, g) in genre_links {
        if let Some(g) = g {
            genres.entry(row.film_id).or_default().push(GenreBrief { id: g.id, name: g.name });
        }
    }

    let mut actors: HashMap<i32, Vec<ActorBrief>> = HashMap::new();
    let actor_links = film_actor::Entity::find()
        .filter(film_actor::Column::FilmId.is_in(ids.iter().copied()))
        .find_also_related(actor::Entity)
        .order_by_asc(film_actor::Column::ActorId)
        .all(db)
        .await?;
    for (row, a) in actor_links {
        if let Some(a) = a {
            actors.entry(row.film_id).or_default().push(ActorBrief {
                id: a.id,
                name: a.name,
                avatar_url: a.avatar_url,
            });
        }
    }

    Ok(rows
        .into_iter()
        .map(|(f, stats)| FilmDto {
            stats: stats.map(Into::into).unwrap_or_default(),
            genres: genres.remove(&f.id).unwrap_or_default(),
            actors: actors.remove(&f.id).unwrap_or_default(),
            id: f.id,
            title: f.title,
            synopsis: f.synopsis,
            release_date: f.release_date,
            runtime: f.runtime,
            producer: f.producer,
            poster_url: f.poster_url,
            created_at: f.created_at,
        })
        .collect())
}
