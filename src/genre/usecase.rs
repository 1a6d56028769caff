use tracing::info;

use super::{GenreDto, GenreInput, repo::GenreRepo};
use crate::{
    cache::{Cache, keys},
    error::{AppError, AppResult},
    models::BulkDeleted,
};

pub struct GenreUsecase {
    repo: GenreRepo,
    cache: Cache,
}

impl GenreUsecase {
    pub fn new(repo: GenreRepo, cache: Cache) -> Self {
        Self { repo, cache }
    }

    pub async fn get_genre(&self, id: i32) -> AppResult<GenreDto> {
        let key = keys::genre(id);
        if let Some(hit) = self.cache.get_one(&key).await {
            return Ok(hit);
        }

        let dto = self.repo.get(id).await?.ok_or(AppError::NotFound("genre"))?;
        self.cache.put_one(&key, &dto).await;
        Ok(dto)
    }

    pub async fn list_genres(&self) -> AppResult<Vec<GenreDto>> {
        if let Some(hit) = self.cache.get_list(keys::GENRES).await {
            return Ok(hit);
        }

        let list = self.repo.all().await?;
        self.cache.put_list(keys::GENRES, &list).await;
        Ok(list)
    }

    pub async fn create_genre(&self, input: GenreInput) -> AppResult<GenreDto> {
        let name = input.validate()?;
        let dto = self.repo.create(&name).await?;
        self.cache.invalidate(&[keys::GENRES]).await;
        info!(genre_id = dto.id, name = %dto.name, "genre created");
        Ok(dto)
    }

    pub async fn update_genre(&self, id: i32, input: GenreInput) -> AppResult<GenreDto> {
        let name = input.validate()?;
        let dto = self.repo.rename(id, &name).await?.ok_or(AppError::NotFound("genre"))?;
        self.invalidate(&[id]).await;
        Ok(dto)
    }

    pub async fn delete_genre(&self, id: i32) -> AppResult<()> {
        self.delete_genres(&[id]).await.map(|_| ())
    }

    pub async fn delete_genres(&self, ids: &[i32]) -> AppResult<BulkDeleted> {
        let removed = self.repo.delete_many(ids).await?;
        if removed.is_empty() {
            return Err(AppError::NotFound("genre"));
        }
        self.invalidate(&removed).await;
        info!(count = removed.len(), "genres deleted");
        Ok(BulkDeleted { deleted: removed.len() as u64 })
    }

    // films embed their genre names
    async fn invalidate(&self, ids: &[i32]) {
        let singles: Vec<String> = ids.iter().map(|id| keys::genre(*id)).collect();
        let mut all: Vec<&str> = singles.iter().map(String::as_str).collect();
        all.push(keys::GENRES);
        self.cache.invalidate(&all).await;
        self.cache.invalidate_prefix(keys::FILM).await;
        self.cache.invalidate_prefix(keys::FILMS).await;
    }
}
