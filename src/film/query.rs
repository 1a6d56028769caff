use sea_orm::{
    ColumnTrait, JoinType, Order, QueryFilter, QueryOrder, QuerySelect, RelationTrait,
    SelectTwo,
    sea_query::{Alias, Expr, Func, LikeExpr, SimpleExpr},
};
use serde::Deserialize;

use crate::{
    cache::keys::{self, ListKey},
    entities::{film, film_actor, film_genre, film_stats},
    error::AppResult,
    models::Page,
    validation::{Validator, escape_like, parse_date, parse_ids, parse_num},
};

/// Raw `GET /films` query string. Everything is read as text so that all bad values are
/// reported together.
#[derive(Debug, Default, Deserialize)]
pub struct FilmListQuery {
    pub title: Option<String>,
    pub genre_ids: Option<String>,
    pub actor_ids: Option<String>,
    pub min_rating: Option<String>,
    pub max_rating: Option<String>,
    pub released_from: Option<String>,
    pub released_to: Option<String>,
    pub min_runtime: Option<String>,
    pub max_runtime: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilmFilter {
    /// Lowercased substring of the title.
    pub title: Option<String>,
    /// Films must carry every one of these genres.
    pub genre_ids: Vec<i32>,
    /// Films must feature every one of these actors.
    pub actor_ids: Vec<i32>,
    pub min_rating: Option<f64>,
    pub max_rating: Option<f64>,
    pub released_from: Option<String>,
    pub released_to: Option<String>,
    pub min_runtime: Option<i32>,
    pub max_runtime: Option<i32>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    Id,
    Title,
    ReleaseDate,
    Runtime,
    Rating,
    CreatedAt,
}

impl SortField {
    /// Unknown names sort by id.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "title" => Self::Title,
            "release_date" => Self::ReleaseDate,
            "runtime" => Self::Runtime,
            "rating" | "avg_rating" => Self::Rating,
            "created_at" => Self::CreatedAt,
            _ => Self::Id,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Title => "title",
            Self::ReleaseDate => "release_date",
            Self::Runtime => "runtime",
            Self::Rating => "rating",
            Self::CreatedAt => "created_at",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FilmSort {
    pub field: SortField,
    pub desc: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FilmQuery {
    pub filter: FilmFilter,
    pub sort: FilmSort,
    pub page: Page,
}

impl FilmListQuery {
    pub fn parse(self) -> AppResult<FilmQuery> {
        let mut v = Validator::new();
        let mut filter = FilmFilter {
            title: present(&self.title).map(str::to_lowercase),
            ..Default::default()
        };

        if let Some(raw) = present(&self.genre_ids) {
            filter.genre_ids = v.parsed(parse_ids("genre_ids", raw)).unwrap_or_default();
        }
        if let Some(raw) = present(&self.actor_ids) {
            filter.actor_ids = v.parsed(parse_ids("actor_ids", raw)).unwrap_or_default();
        }
        filter.min_rating = present(&self.min_rating).and_then(|r| v.parsed(parse_num("min_rating", r)));
        filter.max_rating = present(&self.max_rating).and_then(|r| v.parsed(parse_num("max_rating", r)));
        filter.released_from = present(&self.released_from)
            .and_then(|r| v.parsed(parse_date("released_from", r)))
            .map(|d| d.to_string());
        filter.released_to = present(&self.released_to)
            .and_then(|r| v.parsed(parse_date("released_to", r)))
            .map(|d| d.to_string());
        filter.min_runtime = present(&self.min_runtime).and_then(|r| v.parsed(parse_num("min_runtime", r)));
        filter.max_runtime = present(&self.max_runtime).and_then(|r| v.parsed(parse_num("max_runtime", r)));

        if let Some(min) = filter.min_rating {
            v.range("min_rating", min, 0.0, 100.0);
        }
        if let Some(max) = filter.max_rating {
            v.range("max_rating", max, 0.0, 100.0);
        }
        if let (Some(min), Some(max)) = (filter.min_rating, filter.max_rating) {
            v.check(min <= max, "max_rating", "must not be below min_rating");
        }
        if let (Some(from), Some(to)) = (&filter.released_from, &filter.released_to) {
            v.check(from <= to, "released_to", "must not be before released_from");
        }
        if let (Some(min), Some(max)) = (filter.min_runtime, filter.max_runtime) {
            v.check(min <= max, "max_runtime", "must not be below min_runtime");
        }

        let page = Page::parse(&mut v, present(&self.page), present(&self.page_size));
        v.finish()?;

        filter.genre_ids.sort_unstable();
        filter.actor_ids.sort_unstable();

        let sort = FilmSort {
            field: self.sort_by.as_deref().map(SortField::parse).unwrap_or_default(),
            desc: self.order.as_deref().is_some_and(|o| o.trim().eq_ignore_ascii_case("desc")),
        };
        Ok(FilmQuery { filter, sort, page })
    }
}

fn present(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl FilmQuery {
    pub fn cache_key(&self) -> String {
        let f = &self.filter;
        ListKey::new()
            .opt("title", f.title.as_deref())
            .ids("genre_ids", &f.genre_ids)
            .ids("actor_ids", &f.actor_ids)
            .opt("min_rating", f.min_rating)
            .opt("max_rating", f.max_rating)
            .opt("released_from", f.released_from.as_deref())
            .opt("released_to", f.released_to.as_deref())
            .opt("min_runtime", f.min_runtime)
            .opt("max_runtime", f.max_runtime)
            .field("sort", self.sort.field.as_str())
            .field("order", if self.sort.desc { "desc" } else { "asc" })
            .field("page", self.page.page)
            .field("page_size", self.page.page_size)
            .finish(keys::FILMS)
    }

    /// Applies filters, ordering and the page window to a film + stats select.
    pub fn apply(
        &self,
        mut select: SelectTwo<film::Entity, film_stats::Entity>,
    ) -> SelectTwo<film::Entity, film_stats::Entity> {
        let f = &self.filter;

        // one inner join per required id gives "all of" semantics
        for (i, id) in f.genre_ids.iter().enumerate() {
            let alias = Alias::new(format!("fg{i}"));
            select = select
                .join_as(JoinType::InnerJoin, film::Relation::FilmGenre.def(), alias.clone())
                .filter(Expr::col((alias, film_genre::Column::GenreId)).eq(*id));
        }
        for (i, id) in f.actor_ids.iter().enumerate() {
            let alias = Alias::new(format!("fa{i}"));
            select = select
                .join_as(JoinType::InnerJoin, film::Relation::FilmActor.def(), alias.clone())
                .filter(Expr::col((alias, film_actor::Column::ActorId)).eq(*id));
        }

        if let Some(title) = &f.title {
            let pattern = LikeExpr::new(format!("%{}%", escape_like(title))).escape('\\');
            select = select
                .filter(Expr::expr(Func::lower(Expr::col((film::Entity, film::Column::Title)))).like(pattern));
        }
        if let Some(min) = f.min_rating {
            select = select.filter(Expr::expr(avg_rating()).gte(min));
        }
        if let Some(max) = f.max_rating {
            select = select.filter(Expr::expr(avg_rating()).lte(max));
        }
        if let Some(from) = &f.released_from {
            select = select.filter(film::Column::ReleaseDate.gte(from.as_str()));
        }
        if let Some(to) = &f.released_to {
            select = select.filter(film::Column::ReleaseDate.lte(to.as_str()));
        }
        if let Some(min) = f.min_runtime {
            select = select.filter(film::Column::Runtime.gte(min));
        }
        if let Some(max) = f.max_runtime {
            select = select.filter(film::Column::Runtime.lte(max));
        }

        let order = if self.sort.desc { Order::Desc } else { Order::Asc };
        select = match self.sort.field {
            SortField::Id => select.order_by(film::Column::Id, order.clone()),
            SortField::Title => select.order_by(film::Column::Title, order.clone()),
            SortField::ReleaseDate => select.order_by(film::Column::ReleaseDate, order.clone()),
            SortField::Runtime => select.order_by(film::Column::Runtime, order.clone()),
            SortField::Rating => select.order_by(avg_rating(), order.clone()),
            SortField::CreatedAt => select.order_by(film::Column::CreatedAt, order.clone()),
        };
        if self.sort.field != SortField::Id {
            select = select.order_by_asc(film::Column::Id);
        }

        select.offset(self.page.offset()).limit(self.page.page_size)
    }
}

/// Films without a stats row rank as unrated.
fn avg_rating() -> SimpleExpr {
    Func::coalesce([
        Expr::col((film_stats::Entity, film_stats::Column::AvgRating)).into(),
        Expr::val(0.0f64).into(),
    ])
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn query(pairs: &[(&str, &str)]) -> FilmListQuery {
        let map: serde_json::Map<String, serde_json::Value> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        serde_json::from_value(serde_json::Value::Object(map)).unwrap()
    }

    #[test]
    fn defaults() {
        let q = FilmListQuery::default().parse().unwrap();
        assert_eq!(q.filter, FilmFilter::default());
        assert_eq!(q.sort, FilmSort::default());
        assert_eq!(q.page, Page::default());
    }

    #[test]
    fn unknown_sort_falls_back_to_id() {
        let q = query(&[("sort_by", "budget"), ("order", "desc")]).parse().unwrap();
        assert_eq!(q.sort, FilmSort { field: SortField::Id, desc: true });
        let q = query(&[("sort_by", "rating")]).parse().unwrap();
        assert_eq!(q.sort.field, SortField::Rating);
    }

    #[test]
    fn reports_every_bad_value() {
        let err = query(&[
            ("genre_ids", "1,a"),
            ("min_rating", "lots"),
            ("released_from", "2020-13-01"),
            ("page", "0"),
        ])
        .parse()
        .unwrap_err();
        let AppError::Validation(errors) = err else { panic!("expected validation error") };
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["genre_ids", "min_rating", "released_from", "page"]);
    }

    #[test]
    fn inverted_ranges_are_rejected() {
        assert!(query(&[("min_rating", "80"), ("max_rating", "20")]).parse().is_err());
        assert!(query(&[("released_from", "2020-01-01"), ("released_to", "2019-01-01")]).parse().is_err());
        assert!(query(&[("max_rating", "101")]).parse().is_err());
    }

    #[test]
    fn equivalent_queries_share_a_key() {
        let a = query(&[("genre_ids", "2,1"), ("title", " Heat ")]).parse().unwrap();
        let b = query(&[("title", "heat"), ("genre_ids", "1,2,2")]).parse().unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
        assert!(a.cache_key().starts_with(keys::FILMS));

        let c = query(&[("genre_ids", "1,2"), ("title", "heat"), ("page", "2")]).parse().unwrap();
        assert_ne!(a.cache_key(), c.cache_key());
    }
}
