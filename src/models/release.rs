use std::fmt;

use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReleaseType {
    Album,
    Single,
}

impl ReleaseType {
    pub fn code(self) -> i64 {
        match self {
            ReleaseType::Album => 1,
            ReleaseType::Single => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(ReleaseType::Album),
            2 => Some(ReleaseType::Single),
            _ => None,
        }
    }
}

impl ToSql for ReleaseType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for ReleaseType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = value.as_i64()?;
        ReleaseType::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

/// A catalog release. `artist.id` is zero until the artist has been resolved
/// against the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: i64,
    pub artist: Artist,
    pub title: String,
    pub kind: ReleaseType,
    pub date: NaiveDate,
    /// `None` until the cover sweep resolves artwork for this release.
    pub cover_url: Option<String>,
}

impl Release {
    pub fn new(id: i64, artist: &str, title: &str, kind: ReleaseType, date: NaiveDate) -> Self {
        Self {
            id,
            artist: Artist {
                id: 0,
                name: artist.to_string(),
            },
            title: title.to_string(),
            kind,
            date,
            cover_url: None,
        }
    }

    /// Search term for the cover lookup.
    pub fn cover_query(&self) -> String {
        format!("{} - {}", self.artist.name, self.title)
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} (out {})",
            self.artist.name,
            self.title,
            self.date.format("%Y-%m-%d")
        )
    }
}

/// Outcome of a cover lookup. `NotFound` is an expected result, not a fault,
/// and is never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cover {
    Found(String),
    NotFound,
}
