use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use super::GenreDto;
use crate::{
    cache::now_sec,
    entities::genre,
    error::{AppResult, unique_violation},
};

#[derive(Clone)]
pub struct GenreRepo {
    db: DatabaseConnection,
}

impl GenreRepo {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn all(&self) -> AppResult<Vec<GenreDto>> {
        let rows = genre::Entity::find().order_by_asc(genre::Column::Name).all(&self.db).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get(&self, id: i32) -> AppResult<Option<GenreDto>> {
        Ok(genre::Entity::find_by_id(id).one(&self.db).await?.map(Into::into))
    }

    pub async fn create(&self, name: &str) -> AppResult<GenreDto> {
        let model = genre::ActiveModel {
            name: Set(name.to_string()),
            created_at: Set(now_sec()),
            ..Default::default()
        };
        let saved = model.insert(&self.db).await.map_err(|e| unique_violation(e, "genre"))?;
        Ok(saved.into())
    }

    pub async fn rename(&self, id: i32, name: &str) -> AppResult<Option<GenreDto>> {
        let Some(found) = genre::Entity::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };
        let mut model: genre::ActiveModel = found.into();
        model.name = Set(name.to_string());
        let saved = model.update(&self.db).await.map_err(|e| unique_violation(e, "genre"))?;
        Ok(Some(saved.into()))
    }

    /// Returns the ids that existed; film links cascade.
    pub async fn delete_many(&self, ids: &[i32]) -> AppResult<Vec<i32>> {
        let found: Vec<i32> = genre::Entity::find()
            .filter(genre::Column::Id.is_in(ids.iter().copied()))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|g| g.id)
            .collect();
        if !found.is_empty() {
            genre::Entity::delete_many()
                .filter(genre::Column::Id.is_in(found.iter().copied()))
                .exec(&self.db)
                .await?;
        }
        Ok(found)
    }
}
