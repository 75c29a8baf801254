mod repository;
mod schema;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Artist, PageCursor, PageView, Release, User};

pub use repository::Repository;

/// LIMIT/OFFSET window applied after date ordering. `limit: None` returns
/// every remaining row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Paging {
    pub limit: Option<u32>,
    pub offset: u32,
}

impl Paging {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: Some(limit),
            offset,
        }
    }

    /// 1-based page of `size` rows.
    pub fn page(page: u32, size: u32) -> Self {
        Self::new(size, page.saturating_sub(1) * size)
    }
}

/// Month value meaning "the whole year".
pub const ALL_MONTHS: u32 = 0;

/// Persistence boundary for artists, releases and subscribers.
///
/// Inserts report uniqueness collisions as `ArtistExists`/`ReleaseExists`/
/// `UserExists`; range and listing queries report an empty result as
/// `NotFound`. Range queries are ordered by release date ascending.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn add_artist(&self, name: &str) -> Result<i64>;
    async fn get_artist_by_name(&self, name: &str) -> Result<Option<Artist>>;

    async fn add_release(&self, release: &Release, artist_id: i64) -> Result<i64>;
    async fn get_release(&self, id: i64) -> Result<Option<Release>>;
    async fn releases_by_month(&self, year: i32, month: u32, paging: Paging) -> Result<Vec<Release>>;
    async fn releases_by_year(&self, year: i32, paging: Paging) -> Result<Vec<Release>>;
    async fn releases_by_day(
        &self,
        year: i32,
        month: u32,
        day: u32,
        paging: Paging,
    ) -> Result<Vec<Release>>;
    async fn releases_missing_cover(&self) -> Result<Vec<Release>>;
    async fn update_release_cover(&self, id: i64, url: &str) -> Result<()>;
    async fn release_count(&self) -> Result<u64>;

    async fn add_user(&self, user: &User) -> Result<()>;
    async fn get_user(&self, id: i64) -> Result<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn set_daily_subscription(&self, user_id: i64, subscribed: bool) -> Result<()>;
    async fn set_page_cursor(&self, user_id: i64, view: PageView, cursor: PageCursor) -> Result<()>;
    async fn subscribers(&self) -> Result<Vec<User>>;

    async fn close(&self) -> Result<()>;
}
