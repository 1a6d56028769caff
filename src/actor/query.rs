use jiff::{civil::Date, tz::TimeZone};
use sea_orm::{
    ColumnTrait, EntityTrait, JoinType, Order, QueryFilter, QueryOrder, QuerySelect,
    RelationTrait, Select,
    sea_query::{Expr, Func, LikeExpr},
};
use serde::Deserialize;

use crate::{
    cache::keys::{self, ListKey},
    entities::{actor, film_actor},
    error::AppResult,
    models::Page,
    validation::{Validator, escape_like, parse_num},
};

const MIN_YEAR: i16 = 1900;
const MAX_YEAR: i16 = 9998;

/// Raw `GET /actors` query string.
#[derive(Debug, Default, Deserialize)]
pub struct ActorListQuery {
    pub name: Option<String>,
    pub created_from_year: Option<String>,
    pub created_to_year: Option<String>,
    pub min_movies: Option<String>,
    pub max_movies: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActorFilter {
    /// Lowercased substring of the name.
    pub name: Option<String>,
    /// Inclusive calendar years of `created_at`, in UTC.
    pub created_from_year: Option<i16>,
    pub created_to_year: Option<i16>,
    pub min_movies: Option<i64>,
    pub max_movies: Option<i64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    Id,
    Name,
    CreatedAt,
    MoviesCount,
}

impl SortField {
    /// Unknown names sort by id.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "name" => Self::Name,
            "created_at" => Self::CreatedAt,
            "movies_count" => Self::MoviesCount,
            _ => Self::Id,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::CreatedAt => "created_at",
            Self::MoviesCount => "movies_count",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActorQuery {
    pub filter: ActorFilter,
    pub sort: SortField,
    pub desc: bool,
    pub page: Page,
}

impl ActorListQuery {
    pub fn parse(self) -> AppResult<ActorQuery> {
        let mut v = Validator::new();
        let present = |raw: &Option<String>| raw.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

        let mut filter = ActorFilter {
            name: present(&self.name).map(|n| n.to_lowercase()),
            ..Default::default()
        };
        filter.created_from_year =
            present(&self.created_from_year).and_then(|r| v.parsed(parse_num("created_from_year", &r)));
        filter.created_to_year =
            present(&self.created_to_year).and_then(|r| v.parsed(parse_num("created_to_year", &r)));
        filter.min_movies = present(&self.min_movies).and_then(|r| v.parsed(parse_num("min_movies", &r)));
        filter.max_movies = present(&self.max_movies).and_then(|r| v.parsed(parse_num("max_movies", &r)));

        if let Some(y) = filter.created_from_year {
            v.range("created_from_year", y, MIN_YEAR, MAX_YEAR);
        }
        if let Some(y) = filter.created_to_year {
            v.range("created_to_year", y, MIN_YEAR, MAX_YEAR);
        }
        if let (Some(from), Some(to)) = (filter.created_from_year, filter.created_to_year) {
            v.check(from <= to, "created_to_year", "must not be before created_from_year");
        }
        if let Some(min) = filter.min_movies {
            v.check(min >= 0, "min_movies", "must not be negative");
        }
        if let Some(max) = filter.max_movies {
            v.check(max >= 0, "max_movies", "must not be negative");
        }
        if let (Some(min), Some(max)) = (filter.min_movies, filter.max_movies) {
            v.check(min <= max, "max_movies", "must not be below min_movies");
        }

        let page = Page::parse(&mut v, present(&self.page).as_deref(), present(&self.page_size).as_deref());
        v.finish()?;

        Ok(ActorQuery {
            filter,
            sort: self.sort_by.as_deref().map(SortField::parse).unwrap_or_default(),
            desc: self.order.as_deref().is_some_and(|o| o.trim().eq_ignore_ascii_case("desc")),
            page,
        })
    }
}

/// First second of `year` in UTC, as unix seconds.
fn year_start(year: i16) -> AppResult<i64> {
    Ok(Date::new(year, 1, 1)?.to_zoned(TimeZone::UTC)?.timestamp().as_second())
}

impl ActorQuery {
    pub fn unfiltered(page: Page) -> Self {
        Self { filter: ActorFilter::default(), sort: SortField::Id, desc: false, page }
    }

    pub fn cache_key(&self) -> String {
        let f = &self.filter;
        ListKey::new()
            .opt("name", f.name.as_deref())
            .opt("created_from_year", f.created_from_year)
            .opt("created_to_year", f.created_to_year)
            .opt("min_movies", f.min_movies)
            .opt("max_movies", f.max_movies)
            .field("sort", self.sort.as_str())
            .field("order", if self.desc { "desc" } else { "asc" })
            .field("page", self.page.page)
            .field("page_size", self.page.page_size)
            .finish(keys::ACTORS)
    }

    /// Actors with their film count, filtered, ordered and windowed.
    pub fn select(&self) -> AppResult<Select<actor::Entity>> {
        let f = &self.filter;
        let movies = film_actor::Column::FilmId.count();

        let mut select = actor::Entity::find()
            .column_as(movies.clone(), "movies_count")
            .join(JoinType::LeftJoin, actor::Relation::FilmActor.def())
            .group_by(actor::Column::Id);

        if let Some(name) = &f.name {
            let pattern = LikeExpr::new(format!("%{}%", escape_like(name))).escape('\\');
            select = select
                .filter(Expr::expr(Func::lower(Expr::col((actor::Entity, actor::Column::Name)))).like(pattern));
        }
        if let Some(year) = f.created_from_year {
            select = select.filter(actor::Column::CreatedAt.gte(year_start(year)?));
        }
        if let Some(year) = f.created_to_year {
            select = select.filter(actor::Column::CreatedAt.lt(year_start(year + 1)?));
        }
        if let Some(min) = f.min_movies {
            select = select.having(Expr::expr(movies.clone()).gte(min));
        }
        if let Some(max) = f.max_movies {
            select = select.having(Expr::expr(movies.clone()).lte(max));
        }

        let order = if self.desc { Order::Desc } else { Order::Asc };
        select = match self.sort {
            SortField::Id => select.order_by(actor::Column::Id, order),
            SortField::Name => select.order_by(actor::Column::Name, order),
            SortField::CreatedAt => select.order_by(actor::Column::CreatedAt, order),
            SortField::MoviesCount => select.order_by(movies, order),
        };
        if self.sort != SortField::Id {
            select = select.order_by_asc(actor::Column::Id);
        }

        Ok(select.offset(self.page.offset()).limit(self.page.page_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> ActorListQuery {
        let map: serde_json::Map<String, serde_json::Value> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        serde_json::from_value(serde_json::Value::Object(map)).unwrap()
    }

    #[test]
    fn year_bounds_are_utc_midnight() {
        assert_eq!(year_start(1970).unwrap(), 0);
        assert_eq!(year_start(2000).unwrap(), 946_684_800);
    }

    #[test]
    fn rejects_bad_ranges() {
        assert!(query(&[("created_from_year", "2020"), ("created_to_year", "2019")]).parse().is_err());
        assert!(query(&[("min_movies", "-1")]).parse().is_err());
        assert!(query(&[("min_movies", "5"), ("max_movies", "2")]).parse().is_err());
        assert!(query(&[("created_from_year", "year")]).parse().is_err());
    }

    #[test]
    fn sort_falls_back_to_id() {
        let q = query(&[("sort_by", "salary")]).parse().unwrap();
        assert_eq!(q.sort, SortField::Id);
        let q = query(&[("sort_by", "movies_count"), ("order", "DESC")]).parse().unwrap();
        assert_eq!((q.sort, q.desc), (SortField::MoviesCount, true));
    }

    #[test]
    fn name_case_does_not_change_the_key() {
        let a = query(&[("name", "Pacino")]).parse().unwrap();
        let b = query(&[("name", " pacino")]).parse().unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
    }
}
