mod history;
mod normalize;
mod releases;
mod transport;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{Post, TodayPost};

pub use history::HistoryFetcher;
pub use normalize::normalize_posts;
pub use releases::ReleaseFetcher;
pub use transport::{HttpTransport, ReqwestTransport};

#[cfg(test)]
pub use transport::stub::ScriptedTransport;

/// Paginated access to the release listing API.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Album release posts for `month` of `year`; month 0 means the whole year.
    async fn fetch_release_posts(&self, year: i32, month: u32) -> Result<Vec<Post>>;

    /// Single posts for the whole of `year`.
    async fn fetch_single_posts(&self, year: i32) -> Result<Vec<Post>>;

    async fn close(&self) {}
}

/// Source of "today in history" items.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Items dated `day`, falling back to earlier days while still within the
    /// lookback window measured from `today`.
    async fn fetch_today_history_posts(&self, day: NaiveDate, today: NaiveDate) -> Result<Vec<TodayPost>>;

    async fn close(&self) {}
}
