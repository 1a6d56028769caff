use tracing::info;

use super::{AdminReviewInput, ReviewDto, ReviewInput, ReviewUpdate, repo::ReviewRepo};
use crate::{
    auth::AuthUser,
    cache::{Cache, keys},
    entities::review,
    error::{AppError, AppResult},
    models::BulkDeleted,
};

pub struct ReviewUsecase {
    repo: ReviewRepo,
    cache: Cache,
}

impl ReviewUsecase {
    pub fn new(repo: ReviewRepo, cache: Cache) -> Self {
        Self { repo, cache }
    }

    pub async fn get_review(&self, id: i32) -> AppResult<ReviewDto> {
        let key = keys::review(id);
        if let Some(hit) = self.cache.get_one(&key).await {
            return Ok(hit);
        }

        let dto = self.repo.get(id).await?.ok_or(AppError::NotFound("review"))?;
        self.cache.put_one(&key, &dto).await;
        Ok(dto)
    }

    pub async fn reviews_for_film(&self, film_id: i32) -> AppResult<Vec<ReviewDto>> {
        let key = keys::reviews_by_film(film_id);
        if let Some(hit) = self.cache.get_list(&key).await {
            return Ok(hit);
        }

        let list = self.repo.by_film(film_id).await?;
        self.cache.put_list(&key, &list).await;
        Ok(list)
    }

    pub async fn reviews_by_user(&self, user_id: i32) -> AppResult<Vec<ReviewDto>> {
        let key = keys::reviews_by_user(user_id);
        if let Some(hit) = self.cache.get_list(&key).await {
            return Ok(hit);
        }

        let list = self.repo.by_user(user_id).await?;
        self.cache.put_list(&key, &list).await;
        Ok(list)
    }

    /// Creates the caller's review of a film, replacing an earlier one.
    pub async fn create_review(&self, who: &AuthUser, input: ReviewInput) -> AppResult<ReviewDto> {
        input.validate()?;
        self.upsert(who.user_id, &input).await
    }

    pub async fn update_review(
        &self,
        who: &AuthUser,
        id: i32,
        input: ReviewUpdate,
    ) -> AppResult<ReviewDto> {
        input.validate()?;
        self.owned(who, id).await?;
        self.update(id, &input).await
    }

    pub async fn delete_review(&self, who: &AuthUser, id: i32) -> AppResult<()> {
        self.owned(who, id).await?;
        self.admin_delete_review(id).await
    }

    pub async fn admin_list_reviews(&self) -> AppResult<Vec<ReviewDto>> {
        if let Some(hit) = self.cache.get_list(keys::REVIEWS_ALL).await {
            return Ok(hit);
        }

        let list = self.repo.all().await?;
        self.cache.put_list(keys::REVIEWS_ALL, &list).await;
        Ok(list)
    }

    pub async fn admin_create_review(&self, input: AdminReviewInput) -> AppResult<ReviewDto> {
        input.review.validate()?;
        if input.user_id <= 0 {
            return Err(AppError::invalid("user_id", "is a required field"));
        }
        self.upsert(input.user_id, &input.review).await
    }

    pub async fn admin_update_review(&self, id: i32, input: ReviewUpdate) -> AppResult<ReviewDto> {
        input.validate()?;
        self.update(id, &input).await
    }

    pub async fn admin_delete_review(&self, id: i32) -> AppResult<()> {
        let removed = self.repo.delete(id).await?.ok_or(AppError::NotFound("review"))?;
        self.invalidate(&removed).await;
        info!(review_id = id, "review deleted");
        Ok(())
    }

    pub async fn admin_delete_reviews(&self, ids: &[i32]) -> AppResult<BulkDeleted> {
        let removed = self.repo.delete_many(ids).await?;
        if removed.is_empty() {
            return Err(AppError::NotFound("review"));
        }
        for r in &removed {
            self.invalidate(r).await;
        }
        Ok(BulkDeleted { deleted: removed.len() as u64 })
    }

    async fn owned(&self, who: &AuthUser, id: i32) -> AppResult<review::Model> {
        let found = self.repo.find(id).await?.ok_or(AppError::NotFound("review"))?;
        if found.user_id != who.user_id {
            return Err(AppError::Forbidden("review belongs to another user"));
        }
        Ok(found)
    }

    async fn upsert(&self, user_id: i32, input: &ReviewInput) -> AppResult<ReviewDto> {
        let dto = self.repo.upsert(user_id, input).await?;
        self.invalidate_dto(&dto).await;
        info!(review_id = dto.id, film_id = dto.film_id, user_id, "review saved");
        Ok(dto)
    }

    async fn update(&self, id: i32, input: &ReviewUpdate) -> AppResult<ReviewDto> {
        let dto = self
            .repo
            .update(id, input.rating, &input.review_text)
            .await?
            .ok_or(AppError::NotFound("review"))?;
        self.invalidate_dto(&dto).await;
        Ok(dto)
    }

    async fn invalidate_dto(&self, dto: &ReviewDto) {
        self.drop_keys(dto.id, dto.film_id, dto.user_id).await;
    }

    async fn invalidate(&self, row: &review::Model) {
        self.drop_keys(row.id, row.film_id, row.user_id).await;
    }

    // film stats embed review aggregates, so film entries go too
    async fn drop_keys(&self, id: i32, film_id: i32, user_id: i32) {
        let (one, by_film, by_user, film) = (
            keys::review(id),
            keys::reviews_by_film(film_id),
            keys::reviews_by_user(user_id),
            keys::film(film_id),
        );
        self.cache.invalidate(&[&one, &by_film, &by_user, keys::REVIEWS_ALL, &film]).await;
        self.cache.invalidate_prefix(keys::FILMS).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestApp;

    fn input(film_id: i32, rating: i32, text: &str) -> ReviewInput {
        ReviewInput { film_id, rating, review_text: text.to_string() }
    }

    fn update(rating: i32, text: &str) -> ReviewUpdate {
        ReviewUpdate { rating, review_text: text.to_string() }
    }

    #[tokio::test]
    async fn second_review_of_same_film_replaces_first() {
        let app = TestApp::new().await;
        let ann = app.user("ann@x.io").await;
        let film = app.film("Heat").await;
        let uc = &app.state.reviews;

        let first = uc.create_review(&ann, input(film, 40, "fine")).await.unwrap();
        let second = uc.create_review(&ann, input(film, 90, "grew on me")).await.unwrap();

        assert_eq!(first.id, second.id);
        let all = uc.reviews_for_film(film).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!((all[0].rating, all[0].review_text.as_str()), (90, "grew on me"));

        let stats = app.state.films.get_film(film).await.unwrap().stats;
        assert_eq!((stats.total_reviews, stats.avg_rating), (1, 90.0));
    }

    #[tokio::test]
    async fn only_the_author_may_change_a_review() {
        let app = TestApp::new().await;
        let ann = app.user("ann@x.io").await;
        let bob = app.user("bob@x.io").await;
        let film = app.film("Heat").await;
        let uc = &app.state.reviews;

        let review = uc.create_review(&ann, input(film, 70, "tense")).await.unwrap();

        let err = uc.update_review(&bob, review.id, update(0, "bad")).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = uc.delete_review(&bob, review.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let unchanged = uc.get_review(review.id).await.unwrap();
        assert_eq!((unchanged.rating, unchanged.review_text.as_str()), (70, "tense"));

        uc.update_review(&ann, review.id, update(75, "tenser")).await.unwrap();
        assert_eq!(uc.get_review(review.id).await.unwrap().rating, 75);
    }

    #[tokio::test]
    async fn reads_after_writes_are_fresh() {
        let app = TestApp::new().await;
        let ann = app.user("ann@x.io").await;
        let bob = app.user("bob@x.io").await;
        let film = app.film("Heat").await;
        let uc = &app.state.reviews;

        assert!(uc.reviews_for_film(film).await.unwrap().is_empty());
        assert!(uc.reviews_by_user(bob.user_id).await.unwrap().is_empty());
        assert!(uc.admin_list_reviews().await.unwrap().is_empty());

        let review = uc.create_review(&bob, input(film, 10, "no")).await.unwrap();
        uc.create_review(&ann, input(film, 100, "yes")).await.unwrap();

        assert_eq!(uc.reviews_for_film(film).await.unwrap().len(), 2);
        assert_eq!(uc.reviews_by_user(bob.user_id).await.unwrap().len(), 1);
        assert_eq!(uc.admin_list_reviews().await.unwrap().len(), 2);

        uc.get_review(review.id).await.unwrap();
        uc.delete_review(&bob, review.id).await.unwrap();
        assert!(matches!(uc.get_review(review.id).await, Err(AppError::NotFound(_))));
        assert!(uc.reviews_by_user(bob.user_id).await.unwrap().is_empty());
        assert_eq!(uc.reviews_for_film(film).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_twice_reports_not_found() {
        let app = TestApp::new().await;
        let ann = app.user("ann@x.io").await;
        let film = app.film("Heat").await;
        let uc = &app.state.reviews;

        let review = uc.create_review(&ann, input(film, 50, "meh")).await.unwrap();
        uc.admin_delete_review(review.id).await.unwrap();
        assert!(matches!(uc.admin_delete_review(review.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(uc.admin_delete_reviews(&[review.id]).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn reviews_need_an_existing_film_and_valid_body() {
        let app = TestApp::new().await;
        let ann = app.user("ann@x.io").await;
        let uc = &app.state.reviews;

        let err = uc.create_review(&ann, input(999, 50, "meh")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound("film")));

        let err = uc.create_review(&ann, input(999, 101, "")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref e) if e.len() == 2));
    }
}
