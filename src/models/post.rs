use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A raw entry from the release listing API, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "ID")]
    pub id: i64,
    /// "Artist - Title", as published.
    #[serde(rename = "post_title")]
    pub query: String,
    #[serde(rename = "post_date", default)]
    pub raw_date: Option<String>,
}

impl Post {
    pub fn new(id: i64, query: &str, raw_date: &str) -> Self {
        Self {
            id,
            query: query.to_string(),
            raw_date: Some(raw_date.to_string()),
        }
    }
}

/// A "today in history" item scraped from the history page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodayPost {
    pub text: String,
    pub image_url: Option<String>,
    pub date: NaiveDate,
}
