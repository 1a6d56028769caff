use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};

use super::{ActorDto, ActorInput, query::ActorQuery};
use crate::{
    cache::now_sec,
    entities::{actor, film},
    error::AppResult,
    models::{ImageChange, Page},
};

#[derive(Debug, FromQueryResult)]
struct ActorRow {
    id: i32,
    name: String,
    avatar_url: Option<String>,
    wiki_url: String,
    created_at: i64,
    movies_count: i64,
}

impl From<ActorRow> for ActorDto {
    fn from(r: ActorRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            avatar_url: r.avatar_url,
            wiki_url: r.wiki_url,
            created_at: r.created_at,
            movies_count: r.movies_count,
            films: None,
        }
    }
}

#[derive(Clone)]
pub struct ActorRepo {
    db: DatabaseConnection,
}

impl ActorRepo {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find(&self, id: i32) -> AppResult<Option<actor::Model>> {
        Ok(actor::Entity::find_by_id(id).one(&self.db).await?)
    }

    /// One actor with its filmography, newest release first.
    pub async fn get(&self, id: i32) -> AppResult<Option<ActorDto>> {
        let Some(found) = self.find(id).await? else {
            return Ok(None);
        };
        let films = found
            .find_related(film::Entity)
            .order_by_desc(film::Column::ReleaseDate)
            .order_by_asc(film::Column::Id)
            .all(&self.db)
            .await?;

        Ok(Some(ActorDto {
            id: found.id,
            name: found.name,
            avatar_url: found.avatar_url,
            wiki_url: found.wiki_url,
            created_at: found.created_at,
            movies_count: films.len() as i64,
            films: Some(films.into_iter().map(Into::into).collect()),
        }))
    }

    pub async fn list(&self, query: &ActorQuery) -> AppResult<Vec<ActorDto>> {
        let rows = query.select()?.into_model::<ActorRow>().all(&self.db).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn page(&self, page: Page) -> AppResult<Vec<ActorDto>> {
        self.list(&ActorQuery::unfiltered(page)).await
    }

    pub async fn create(&self, input: &ActorInput) -> AppResult<actor::Model> {
        let model = actor::ActiveModel {
            name: Set(input.name.clone()),
            wiki_url: Set(input.wiki_url.clone()),
            avatar_url: Set(None),
            created_at: Set(now_sec()),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    pub async fn set_avatar(&self, id: i32, url: Option<String>) -> AppResult<()> {
        let model = actor::ActiveModel { id: Set(id), avatar_url: Set(url), ..Default::default() };
        model.update(&self.db).await?;
        Ok(())
    }

    pub async fn update(
        &self,
        id: i32,
        input: &ActorInput,
        avatar: ImageChange,
    ) -> AppResult<Option<actor::Model>> {
        let Some(found) = self.find(id).await? else {
            return Ok(None);
        };
        let mut model: actor::ActiveModel = found.into();
        model.name = Set(input.name.clone());
        model.wiki_url = Set(input.wiki_url.clone());
        match avatar {
            ImageChange::Keep => {},
            ImageChange::Set(url) => model.avatar_url = Set(Some(url)),
            ImageChange::Remove => model.avatar_url = Set(None),
        }
        Ok(Some(model.update(&self.db).await?))
    }

    /// Deletes the given actors and returns the rows that existed; film links cascade.
    pub async fn delete_many(&self, ids: &[i32]) -> AppResult<Vec<actor::Model>> {
        let found = actor::Entity::find()
            .filter(actor::Column::Id.is_in(ids.iter().copied()))
            .all(&self.db)
            .await?;
        if !found.is_empty() {
            actor::Entity::delete_many()
                .filter(actor::Column::Id.is_in(found.iter().map(|a| a.id)))
                .exec(&self.db)
                .await?;
        }
        Ok(found)
    }

    #[cfg(test)]
    pub async fn count(&self) -> AppResult<u64> {
        Ok(actor::Entity::find().count(&self.db).await?)
    }
}
