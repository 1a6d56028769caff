use std::collections::{BTreeSet, HashMap};

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait, sea_query::OnConflict,
};

use super::{ReviewDto, ReviewInput};
use crate::{
    cache::now_sec,
    entities::{film, film_stats, review, user},
    error::{AppError, AppResult},
};

/// Rebuilds the stats row of one film from its reviews. Callers run it inside the
/// transaction that changed the reviews.
pub async fn recompute_stats<C: ConnectionTrait>(conn: &C, film_id: i32) -> Result<(), DbErr> {
    let ratings: Vec<i32> = review::Entity::find()
        .select_only()
        .column(review::Column::Rating)
        .filter(review::Column::FilmId.eq(film_id))
        .into_tuple()
        .all(conn)
        .await?;

    let stats = Histogram::from_ratings(&ratings);
    let model = film_stats::ActiveModel {
        film_id: Set(film_id),
        avg_rating: Set(stats.avg),
        total_reviews: Set(stats.total),
        count_0_to_20: Set(stats.buckets[0]),
        count_21_to_40: Set(stats.buckets[1]),
        count_41_to_60: Set(stats.buckets[2]),
        count_61_to_80: Set(stats.buckets[3]),
        count_81_to_100: Set(stats.buckets[4]),
    };

    film_stats::Entity::insert(model)
        .on_conflict(
            OnConflict::column(film_stats::Column::FilmId)
                .update_columns([
                    film_stats::Column::AvgRating,
                    film_stats::Column::TotalReviews,
                    film_stats::Column::Count0To20,
                    film_stats::Column::Count21To40,
                    film_stats::Column::Count41To60,
                    film_stats::Column::Count61To80,
                    film_stats::Column::Count81To100,
                ])
                .to_owned(),
        )
        .exec(conn)
        .await?;

    Ok(())
}

#[derive(Debug, PartialEq)]
struct Histogram {
    avg: f64,
    total: i32,
    buckets: [i32; 5],
}

impl Histogram {
    fn from_ratings(ratings: &[i32]) -> Self {
        let mut buckets = [0; 5];
        for &r in ratings {
            let idx = match r {
                i32::MIN..=20 => 0,
                21..=40 => 1,
                41..=60 => 2,
                61..=80 => 3,
                _ => 4,
            };
            buckets[idx] += 1;
        }

        let total = ratings.len() as i32;
        let avg = if total == 0 {
            0.0
        } else {
            let sum: i64 = ratings.iter().map(|&r| i64::from(r)).sum();
            (sum as f64 / f64::from(total) * 100.0).round() / 100.0
        };

        Self { avg, total, buckets }
    }
}

#[derive(Clone)]
pub struct ReviewRepo {
    db: DatabaseConnection,
}

impl ReviewRepo {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find(&self, id: i32) -> AppResult<Option<review::Model>> {
        Ok(review::Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn get(&self, id: i32) -> AppResult<Option<ReviewDto>> {
        let Some(found) = self.find(id).await? else {
            return Ok(None);
        };
        Ok(enrich(&self.db, vec![found]).await?.pop())
    }

    pub async fn by_film(&self, film_id: i32) -> AppResult<Vec<ReviewDto>> {
        self.list(Some(review::Column::FilmId.eq(film_id))).await
    }

    pub async fn by_user(&self, user_id: i32) -> AppResult<Vec<ReviewDto>> {
        self.list(Some(review::Column::UserId.eq(user_id))).await
    }

    pub async fn all(&self) -> AppResult<Vec<ReviewDto>> {
        self.list(None).await
    }

    async fn list(&self, cond: Option<sea_orm::sea_query::SimpleExpr>) -> AppResult<Vec<ReviewDto>> {
        let mut q = review::Entity::find();
        if let Some(cond) = cond {
            q = q.filter(cond);
        }
        let rows = q
            .order_by_desc(review::Column::CreatedAt)
            .order_by_desc(review::Column::Id)
            .all(&self.db)
            .await?;
        Ok(enrich(&self.db, rows).await?)
    }

    /// Inserts the review or overwrites the author's existing review of the same film.
    pub async fn upsert(&self, user_id: i32, input: &ReviewInput) -> AppResult<ReviewDto> {
        let txn = self.db.begin().await?;

        if film::Entity::find_by_id(input.film_id).one(&txn).await?.is_none() {
            return Err(AppError::NotFound("film"));
        }
        if user::Entity::find_by_id(user_id).one(&txn).await?.is_none() {
            return Err(AppError::NotFound("user"));
        }

        let model = review::ActiveModel {
            user_id: Set(user_id),
            film_id: Set(input.film_id),
            rating: Set(input.rating),
            review_text: Set(input.review_text.trim().to_string()),
            created_at: Set(now_sec()),
            ..Default::default()
        };
        review::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([review::Column::UserId, review::Column::FilmId])
                    .update_columns([review::Column::Rating, review::Column::ReviewText])
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        recompute_stats(&txn, input.film_id).await?;

        let saved = review::Entity::find()
            .filter(review::Column::UserId.eq(user_id))
            .filter(review::Column::FilmId.eq(input.film_id))
            .one(&txn)
            .await?
            .ok_or_else(|| anyhow::anyhow!("review vanished inside its own transaction"))?;

        txn.commit().await?;
        single(&self.db, saved).await
    }

    pub async fn update(&self, id: i32, rating: i32, text: &str) -> AppResult<Option<ReviewDto>> {
        let txn = self.db.begin().await?;

        let Some(found) = review::Entity::find_by_id(id).one(&txn).await? else {
            return Ok(None);
        };
        let film_id = found.film_id;

        let mut model: review::ActiveModel = found.into();
        model.rating = Set(rating);
        model.review_text = Set(text.trim().to_string());
        let saved = model.update(&txn).await?;

        recompute_stats(&txn, film_id).await?;
        txn.commit().await?;

        Ok(Some(single(&self.db, saved).await?))
    }

    pub async fn delete(&self, id: i32) -> AppResult<Option<review::Model>> {
        Ok(self.delete_many(&[id]).await?.pop())
    }

    /// Deletes the given reviews and returns the rows that existed.
    pub async fn delete_many(&self, ids: &[i32]) -> AppResult<Vec<review::Model>> {
        let txn = self.db.begin().await?;

        let found = review::Entity::find()
            .filter(review::Column::Id.is_in(ids.iter().copied()))
            .all(&txn)
            .await?;
        if found.is_empty() {
            return Ok(found);
        }

        review::Entity::delete_many()
            .filter(review::Column::Id.is_in(found.iter().map(|r| r.id)))
            .exec(&txn)
            .await?;

        let films: BTreeSet<i32> = found.iter().map(|r| r.film_id).collect();
        for film_id in films {
            recompute_stats(&txn, film_id).await?;
        }

        txn.commit().await?;
        Ok(found)
    }
}

async fn single(db: &DatabaseConnection, row: review::Model) -> AppResult<ReviewDto> {
    enrich(db, vec![row])
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("review enrichment dropped a row")))
}

/// Attaches author and film display fields with one query per table.
async fn enrich(db: &DatabaseConnection, rows: Vec<review::Model>) -> Result<Vec<ReviewDto>, DbErr> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let user_ids: BTreeSet<i32> = rows.iter().map(|r| r.user_id).collect();
    let film_ids: BTreeSet<i32> = rows.iter().map(|r| r.film_id).collect();

    let users: HashMap<i32, user::Model> = user::Entity::find()
        .filter(user::Column::Id.is_in(user_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();
    let films: HashMap<i32, film::Model> = film::Entity::find()
        .filter(film::Column::Id.is_in(film_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|f| (f.id, f))
        .collect();

    Ok(rows
        .into_iter()
        .map(|r| {
            let author = users.get(&r.user_id);
            let film = films.get(&r.film_id);
            ReviewDto {
                id: r.id,
                user_id: r.user_id,
                user_login: author.and_then(|u| u.login.clone()),
                user_avatar_url: author.and_then(|u| u.avatar_small_url.clone()),
                film_id: r.film_id,
                film_title: film.map(|f| f.title.clone()).unwrap_or_default(),
                film_poster_url: film.and_then(|f| f.poster_url.clone()),
                rating: r.rating,
                review_text: r.review_text,
                created_at: r.created_at,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_buckets_edges() {
        let h = Histogram::from_ratings(&[0, 20, 21, 40, 41, 60, 61, 80, 81, 100]);
        assert_eq!(h.buckets, [2, 2, 2, 2, 2]);
        assert_eq!(h.total, 10);
        assert_eq!(h.avg, 50.4);
    }

    #[test]
    fn histogram_of_nothing_is_zero() {
        assert_eq!(
            Histogram::from_ratings(&[]),
            Histogram { avg: 0.0, total: 0, buckets: [0; 5] }
        );
    }

    #[test]
    fn average_is_rounded_to_hundredths() {
        assert_eq!(Histogram::from_ratings(&[10, 10, 11]).avg, 10.33);
    }
}
