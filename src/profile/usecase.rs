use sea_orm::{ActiveValue::Set, IntoActiveModel};
use tracing::info;

use super::{ProfileDto, ProfileUpdate};
use crate::{
    auth::{AuthUser, usecase::validate_login},
    cache::{Cache, keys},
    entities::user,
    error::{AppError, AppResult},
    images::{self, AVATAR_LARGE, AVATAR_SMALL, Variant, WEBP},
    models::{BulkDeleted, Page, Upload},
    storage::{Assets, USER_AVATARS, user_avatar_key},
    users::UserRepo,
    validation::Validator,
};

const SMALL: &str = "small";
const LARGE: &str = "large";

pub struct ProfileUsecase {
    users: UserRepo,
    cache: Cache,
    assets: Assets,
}

impl ProfileUsecase {
    pub fn new(users: UserRepo, cache: Cache, assets: Assets) -> Self {
        Self { users, cache, assets }
    }

    pub async fn get_profile(&self, who: &AuthUser) -> AppResult<ProfileDto> {
        Ok(self.load(who.user_id).await?.into())
    }

    /// Changes the login and/or avatar. An upload replaces both avatar sizes.
    pub async fn update_profile(
        &self,
        who: &AuthUser,
        update: ProfileUpdate,
        avatar: Option<Upload>,
    ) -> AppResult<ProfileDto> {
        let login = update.login.as_deref().map(str::trim).filter(|l| !l.is_empty());
        if let Some(login) = login {
            let mut v = Validator::new();
            validate_login(&mut v, login);
            v.finish()?;
        }
        let variants = match &avatar {
            Some(up) => Some(images::process_avatar(
                &up.bytes,
                up.content_type.as_deref(),
                &[AVATAR_SMALL, AVATAR_LARGE],
            )?),
            None => None,
        };

        let current = self.load(who.user_id).await?;
        let had_avatar = current.avatar_url.is_some() || current.avatar_small_url.is_some();
        let mut model = current.into_active_model();

        if let Some(login) = login {
            model.login = Set(Some(login.to_string()));
        }
        let mut drop_objects = false;
        match variants {
            Some(variants) => {
                let (small, large) = self.upload(who.user_id, variants).await?;
                model.avatar_small_url = Set(Some(small));
                model.avatar_url = Set(Some(large));
            },
            None if update.reset_avatar => {
                model.avatar_small_url = Set(None);
                model.avatar_url = Set(None);
                drop_objects = had_avatar;
            },
            None => {},
        }

        let saved = self.users.update(model).await?;
        if drop_objects {
            self.delete_avatar(who.user_id).await;
        }

        self.invalidate_reviews().await;
        info!(user_id = who.user_id, "profile updated");
        Ok(saved.into())
    }

    pub async fn delete_profile(&self, who: &AuthUser) -> AppResult<()> {
        self.admin_delete_user(who.user_id).await
    }

    pub async fn admin_list_users(&self, page: Page) -> AppResult<Vec<ProfileDto>> {
        Ok(self.users.list(page).await?.into_iter().map(Into::into).collect())
    }

    /// Removes the account with its reviews and avatar; reviewed films get fresh stats.
    pub async fn admin_delete_user(&self, id: i32) -> AppResult<()> {
        let (removed, film_ids) = self.users.delete(id).await?.ok_or(AppError::NotFound("user"))?;

        if removed.avatar_url.is_some() || removed.avatar_small_url.is_some() {
            self.delete_avatar(id).await;
        }

        let films: Vec<String> = film_ids.iter().map(|f| keys::film(*f)).collect();
        let films: Vec<&str> = films.iter().map(String::as_str).collect();
        self.cache.invalidate(&films).await;
        if !film_ids.is_empty() {
            self.cache.invalidate_prefix(keys::FILMS).await;
        }
        self.invalidate_reviews().await;

        info!(user_id = id, reviewed_films = film_ids.len(), "account deleted");
        Ok(())
    }

    pub async fn admin_delete_users(&self, ids: &[i32]) -> AppResult<BulkDeleted> {
        let mut deleted = 0;
        for id in ids {
            match self.admin_delete_user(*id).await {
                Ok(()) => deleted += 1,
                Err(AppError::NotFound(_)) => {},
                Err(err) => return Err(err),
            }
        }
        if deleted == 0 {
            return Err(AppError::NotFound("user"));
        }
        Ok(BulkDeleted { deleted })
    }

    async fn load(&self, id: i32) -> AppResult<user::Model> {
        self.users.by_id(id).await?.ok_or(AppError::NotFound("user"))
    }

    async fn upload(&self, user_id: i32, variants: Vec<Variant>) -> AppResult<(String, String)> {
        let mut small = None;
        let mut large = None;
        for v in variants {
            let (label, slot) = if v.size == AVATAR_SMALL { (SMALL, &mut small) } else { (LARGE, &mut large) };
            let url = self.assets.put(USER_AVATARS, &user_avatar_key(user_id, label), v.bytes, WEBP).await?;
            *slot = Some(url);
        }
        match (small, large) {
            (Some(small), Some(large)) => Ok((small, large)),
            _ => Err(anyhow::anyhow!("avatar pipeline skipped a size").into()),
        }
    }

    async fn delete_avatar(&self, user_id: i32) {
        for label in [SMALL, LARGE] {
            self.assets.delete(USER_AVATARS, &user_avatar_key(user_id, label)).await;
        }
    }

    // reviews embed the author's login and small avatar
    async fn invalidate_reviews(&self) {
        self.cache.invalidate_prefix(keys::REVIEW).await;
        self.cache.invalidate_prefix(keys::REVIEWS).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{images::fixtures::png, review::ReviewInput, testutil::TestApp};

    fn login(l: &str) -> ProfileUpdate {
        ProfileUpdate { login: Some(l.to_string()), reset_avatar: false }
    }

    #[tokio::test]
    async fn login_change_reaches_cached_reviews() {
        let app = TestApp::new().await;
        let ann = app.user("ann@x.io").await;
        let film = app.film("Heat").await;
        let review = app
            .state
            .reviews
            .create_review(&ann, ReviewInput { film_id: film, rating: 70, review_text: "ok".into() })
            .await
            .unwrap();
        app.state.reviews.get_review(review.id).await.unwrap();
        app.state.reviews.reviews_for_film(film).await.unwrap();

        app.state.profile.update_profile(&ann, login("annie"), None).await.unwrap();

        let fresh = app.state.reviews.get_review(review.id).await.unwrap();
        assert_eq!(fresh.user_login.as_deref(), Some("annie"));
        let listed = app.state.reviews.reviews_for_film(film).await.unwrap();
        assert_eq!(listed[0].user_login.as_deref(), Some("annie"));
    }

    #[tokio::test]
    async fn login_is_validated_and_unique() {
        let app = TestApp::new().await;
        let ann = app.user("ann@x.io").await;
        let bob = app.user("bob@x.io").await;
        app.state.profile.update_profile(&ann, login("ann"), None).await.unwrap();

        let err = app.state.profile.update_profile(&bob, login("ann"), None).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists("login")));
        let err = app.state.profile.update_profile(&bob, login("a b"), None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn avatar_upload_stores_two_sizes() {
        let app = TestApp::new().await;
        let ann = app.user("ann@x.io").await;
        let upload = Upload { bytes: png(200, 200), content_type: Some("image/png".into()) };

        let dto = app.state.profile.update_profile(&ann, ProfileUpdate::default(), Some(upload)).await.unwrap();
        assert!(dto.avatar_url.as_deref().is_some_and(|u| u.ends_with(&user_avatar_key(ann.user_id, LARGE))));
        assert!(dto.avatar_small_url.as_deref().is_some_and(|u| u.ends_with(&user_avatar_key(ann.user_id, SMALL))));
        assert_eq!(app.objects.len(), 2);

        let reset = ProfileUpdate { login: None, reset_avatar: true };
        let dto = app.state.profile.update_profile(&ann, reset, None).await.unwrap();
        assert_eq!((dto.avatar_url, dto.avatar_small_url), (None, None));
        assert_eq!(app.objects.len(), 0);
    }

    #[tokio::test]
    async fn deleting_an_account_refreshes_film_stats() {
        let app = TestApp::new().await;
        let ann = app.user("ann@x.io").await;
        let bob = app.user("bob@x.io").await;
        let film = app.film("Heat").await;
        for (who, rating) in [(&ann, 100), (&bob, 50)] {
            let input = ReviewInput { film_id: film, rating, review_text: "ok".into() };
            app.state.reviews.create_review(who, input).await.unwrap();
        }
        assert_eq!(app.state.films.get_film(film).await.unwrap().stats.avg_rating, 75.0);

        app.state.profile.delete_profile(&ann).await.unwrap();

        let stats = app.state.films.get_film(film).await.unwrap().stats;
        assert_eq!((stats.total_reviews, stats.avg_rating), (1, 50.0));
        assert!(app.state.reviews.reviews_by_user(ann.user_id).await.unwrap().is_empty());
        assert!(matches!(app.state.profile.get_profile(&ann).await, Err(AppError::NotFound("user"))));
    }

    #[tokio::test]
    async fn bulk_delete_skips_missing_ids() {
        let app = TestApp::new().await;
        let ann = app.user("ann@x.io").await;
        let res = app.state.profile.admin_delete_users(&[ann.user_id, 999]).await.unwrap();
        assert_eq!(res.deleted, 1);
        assert!(matches!(app.state.profile.admin_delete_users(&[ann.user_id]).await, Err(AppError::NotFound(_))));
    }
}
