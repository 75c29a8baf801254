use serde::{Deserialize, Serialize};

/// The two independently paged release views a user can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageView {
    /// Releases of the current month.
    Releases,
    /// Releases out today.
    TodayReleases,
}

/// Where a user is in a paged view. Page 0 means the view was never opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageCursor {
    pub message_id: i64,
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Chat id assigned by the messaging platform.
    pub id: i64,
    pub username: String,
    pub daily_subscription: bool,
    pub releases: PageCursor,
    pub today_releases: PageCursor,
}

impl User {
    pub fn new(id: i64, username: &str) -> Self {
        Self {
            id,
            username: username.to_string(),
            daily_subscription: false,
            releases: PageCursor::default(),
            today_releases: PageCursor::default(),
        }
    }

    pub fn cursor(&self, view: PageView) -> PageCursor {
        match view {
            PageView::Releases => self.releases,
            PageView::TodayReleases => self.today_releases,
        }
    }
}
