use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};

use crate::{
    cache::now_sec,
    entities::{review, user},
    error::{AppError, AppResult},
    models::Page,
    review::repo::recompute_stats,
};

#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub login: Option<String>,
    pub hashed_password: Option<String>,
    pub verified_email: bool,
    pub avatar_url: Option<String>,
}

/// Account rows. Emails are stored lowercased.
#[derive(Clone)]
pub struct UserRepo {
    db: DatabaseConnection,
}

impl UserRepo {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn by_id(&self, id: i32) -> AppResult<Option<user::Model>> {
        Ok(user::Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn by_email(&self, email: &str) -> AppResult<Option<user::Model>> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(email.trim().to_lowercase()))
            .one(&self.db)
            .await?)
    }

    pub async fn by_login(&self, login: &str) -> AppResult<Option<user::Model>> {
        Ok(user::Entity::find().filter(user::Column::Login.eq(login.trim())).one(&self.db).await?)
    }

    pub async fn create(&self, new: NewUser) -> AppResult<user::Model> {
        let model = user::ActiveModel {
            email: Set(new.email.trim().to_lowercase()),
            login: Set(new.login),
            hashed_password: Set(new.hashed_password),
            verified_email: Set(new.verified_email),
            avatar_url: Set(new.avatar_url),
            avatar_small_url: Set(None),
            is_admin: Set(false),
            created_at: Set(now_sec()),
            ..Default::default()
        };
        model.insert(&self.db).await.map_err(account_conflict)
    }

    pub async fn update(&self, model: user::ActiveModel) -> AppResult<user::Model> {
        model.update(&self.db).await.map_err(account_conflict)
    }

    pub async fn mark_verified(&self, id: i32) -> AppResult<()> {
        let model = user::ActiveModel { id: Set(id), verified_email: Set(true), ..Default::default() };
        model.update(&self.db).await?;
        Ok(())
    }

    pub async fn list(&self, page: Page) -> AppResult<Vec<user::Model>> {
        Ok(user::Entity::find()
            .order_by_asc(user::Column::Id)
            .offset(page.offset())
            .limit(page.page_size)
            .all(&self.db)
            .await?)
    }

    /// Deletes the account and its reviews, refreshing stats of every film it reviewed.
    /// Returns the removed row and the affected film ids, or `None` when absent.
    pub async fn delete(&self, id: i32) -> AppResult<Option<(user::Model, Vec<i32>)>> {
        let txn = self.db.begin().await?;

        let Some(found) = user::Entity::find_by_id(id).one(&txn).await? else {
            return Ok(None);
        };

        let film_ids: Vec<i32> = review::Entity::find()
            .select_only()
            .column(review::Column::FilmId)
            .filter(review::Column::UserId.eq(id))
            .distinct()
            .into_tuple()
            .all(&txn)
            .await?;

        user::Entity::delete_by_id(id).exec(&txn).await?;
        for film_id in &film_ids {
            recompute_stats(&txn, *film_id).await?;
        }

        txn.commit().await?;
        Ok(Some((found, film_ids)))
    }

    /// Deletes unverified accounts created before `cutoff` together with their reviews.
    /// Returns how many accounts went and the films whose stats were recomputed.
    pub async fn delete_unverified_before(&self, cutoff: i64) -> AppResult<(u64, Vec<i32>)> {
        let txn = self.db.begin().await?;

        let stale: Vec<i32> = user::Entity::find()
            .select_only()
            .column(user::Column::Id)
            .filter(user::Column::VerifiedEmail.eq(false))
            .filter(user::Column::CreatedAt.lt(cutoff))
            .into_tuple()
            .all(&txn)
            .await?;
        if stale.is_empty() {
            return Ok((0, Vec::new()));
        }

        let film_ids: Vec<i32> = review::Entity::find()
            .select_only()
            .column(review::Column::FilmId)
            .filter(review::Column::UserId.is_in(stale.iter().copied()))
            .distinct()
            .into_tuple()
            .all(&txn)
            .await?;

        let res = user::Entity::delete_many()
            .filter(user::Column::Id.is_in(stale.iter().copied()))
            .exec(&txn)
            .await?;
        for film_id in &film_ids {
            recompute_stats(&txn, *film_id).await?;
        }

        txn.commit().await?;
        Ok((res.rows_affected, film_ids))
    }

    #[cfg(test)]
    pub async fn make_admin(&self, id: i32) -> AppResult<()> {
        let model = user::ActiveModel { id: Set(id), is_admin: Set(true), ..Default::default() };
        model.update(&self.db).await?;
        Ok(())
    }

    #[cfg(test)]
    pub async fn backdate(&self, id: i32, created_at: i64) -> AppResult<()> {
        let model = user::ActiveModel { id: Set(id), created_at: Set(created_at), ..Default::default() };
        model.update(&self.db).await?;
        Ok(())
    }
}

fn account_conflict(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) if msg.contains("login") => {
            AppError::AlreadyExists("login")
        },
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::AlreadyExists("email"),
        _ => err.into(),
    }
}
