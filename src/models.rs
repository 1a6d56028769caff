use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    validation::{FieldError, Validator, parse_ids, parse_num},
};

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;
/// Keeps the row offset within SQLite's signed 64-bit range.
pub const MAX_PAGE: u64 = i64::MAX as u64 / MAX_PAGE_SIZE;

/// 1-indexed page with a bounded size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub page: u64,
    pub page_size: u64,
}

impl Page {
    pub fn new(page: u64, page_size: u64) -> AppResult<Self> {
        let mut v = Validator::new();
        let page = Self { page, page_size };
        page.check(&mut v);
        v.finish()?;
        Ok(page)
    }

    /// Reads raw `page`/`page_size` query values, recording failures in `v`.
    pub fn parse(v: &mut Validator, page: Option<&str>, page_size: Option<&str>) -> Self {
        let page = page.and_then(|raw| v.parsed(parse_num("page", raw))).unwrap_or(1);
        let page_size = page_size
            .and_then(|raw| v.parsed(parse_num("page_size", raw)))
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let page = Self { page, page_size };
        page.check(v);
        page
    }

    fn check(&self, v: &mut Validator) {
        v.range("page", self.page, 1, MAX_PAGE).range("page_size", self.page_size, 1, MAX_PAGE_SIZE);
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1, page_size: DEFAULT_PAGE_SIZE }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl PageQuery {
    pub fn into_page(self) -> AppResult<Page> {
        Page::new(self.page.unwrap_or(1), self.page_size.unwrap_or(DEFAULT_PAGE_SIZE))
    }
}

/// `?ids=1,2,3` on bulk deletes.
#[derive(Debug, Deserialize)]
pub struct IdsQuery {
    #[serde(default)]
    pub ids: String,
}

impl IdsQuery {
    pub fn parse(&self) -> AppResult<Vec<i32>> {
        let ids = parse_ids("ids", &self.ids).map_err(|e| AppError::Validation(vec![e]))?;
        if ids.is_empty() {
            return Err(AppError::Validation(vec![FieldError::new("ids", "is a required field")]));
        }
        Ok(ids)
    }
}

/// An uploaded file part.
#[derive(Clone, Debug)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// What an update does to a stored image URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageChange {
    Keep,
    Set(String),
    Remove,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct BulkDeleted {
    pub deleted: u64,
}
