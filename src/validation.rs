use std::fmt::Display;

use crate::error::{AppError, AppResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

pub fn join(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("field {} {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Collects every field failure before rejecting, so a client sees all of them at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, field: &'static str, message: impl Into<String>) -> &mut Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    pub fn required(&mut self, field: &'static str, value: &str) -> &mut Self {
        self.check(!value.trim().is_empty(), field, "is a required field")
    }

    pub fn max_len(&mut self, field: &'static str, value: &str, max: usize) -> &mut Self {
        self.check(
            value.chars().count() <= max,
            field,
            format!("must be at most {max} characters"),
        )
    }

    pub fn range<T: PartialOrd + Display>(
        &mut self,
        field: &'static str,
        value: T,
        min: T,
        max: T,
    ) -> &mut Self {
        let ok = value >= min && value <= max;
        self.check(ok, field, format!("must be between {min} and {max}"))
    }

    pub fn email(&mut self, field: &'static str, value: &str) -> &mut Self {
        self.check(is_email(value), field, "is not a valid email")
    }

    pub fn push(&mut self, err: FieldError) -> &mut Self {
        self.errors.push(err);
        self
    }

    /// Records a parse failure and yields the parsed value otherwise.
    pub fn parsed<T>(&mut self, result: Result<T, FieldError>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.errors.push(e);
                None
            },
        }
    }

    pub fn finish(self) -> AppResult<()> {
        if self.errors.is_empty() { Ok(()) } else { Err(AppError::Validation(self.errors)) }
    }
}

fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.chars().any(char::is_whitespace)
}

/// Parses `"1,2,3"` into ids; duplicates are dropped, order is kept.
pub fn parse_ids(field: &'static str, raw: &str) -> Result<Vec<i32>, FieldError> {
    let mut out = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id: i32 = part
            .parse()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| FieldError::new(field, "must be a comma separated list of positive ids"))?;
        if !out.contains(&id) {
            out.push(id);
        }
    }
    Ok(out)
}

pub fn parse_date(field: &'static str, raw: &str) -> Result<jiff::civil::Date, FieldError> {
    raw.trim()
        .parse()
        .map_err(|_| FieldError::new(field, "must be a date in YYYY-MM-DD format"))
}

pub fn parse_num<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, FieldError> {
    raw.trim().parse().map_err(|_| FieldError::new(field, "has an invalid value"))
}

/// Escapes `LIKE` wildcards for a pattern using a backslash `ESCAPE`.
pub fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
