use std::sync::Arc;

use chrono::{Datelike, FixedOffset, NaiveDate, Utc};

use crate::config::Config;
use crate::db::{CatalogStore, Paging};
use crate::error::{AppError, Result};
use crate::feed::HistorySource;
use crate::models::{PageCursor, PageView, Release, TodayPost, User};
use crate::updater::{IngestReport, Updater};

/// Direction of a page turn in a release view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTurn {
    Next,
    Previous,
}

/// One page of a release view, ready to be rendered by a notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasePage {
    pub view: PageView,
    /// 1-based.
    pub page: u32,
    pub releases: Vec<Release>,
    pub has_previous: bool,
    pub has_next: bool,
}

impl ReleasePage {
    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }
}

/// User-facing operations behind the bot commands: subscriptions, history,
/// paged release views and the admin refresh.
pub struct App {
    store: Arc<dyn CatalogStore>,
    history: Arc<dyn HistorySource>,
    updater: Arc<Updater>,
    admin_id: Option<i64>,
    page_size: u32,
    utc_offset: FixedOffset,
}

impl App {
    pub fn new(
        config: &Config,
        store: Arc<dyn CatalogStore>,
        history: Arc<dyn HistorySource>,
        updater: Arc<Updater>,
    ) -> Result<Self> {
        Ok(Self {
            store,
            history,
            updater,
            admin_id: config.admin_id,
            page_size: config.page_size,
            utc_offset: config.utc_offset()?,
        })
    }

    /// Current date in the configured local offset.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.utc_offset).date_naive()
    }

    /// Fetch the user, creating it on first contact.
    pub async fn ensure_user(&self, id: i64, username: &str) -> Result<User> {
        if let Some(user) = self.store.get_user(id).await? {
            return Ok(user);
        }

        let user = User::new(id, username);
        match self.store.add_user(&user).await {
            Ok(()) => {
                tracing::info!("New user {} ({})", id, username);
                Ok(user)
            }
            Err(AppError::UserExists(_)) => self.user(id).await,
            Err(e) => Err(e),
        }
    }

    pub async fn set_subscription(&self, user_id: i64, subscribed: bool) -> Result<()> {
        self.store.set_daily_subscription(user_id, subscribed).await
    }

    pub async fn is_subscribed(&self, user_id: i64) -> Result<bool> {
        Ok(self.user(user_id).await?.daily_subscription)
    }

    /// Users who opted into the daily broadcast. Empty when there are none.
    pub async fn subscribers(&self) -> Result<Vec<User>> {
        match self.store.subscribers().await {
            Ok(users) => Ok(users),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    pub async fn today_history(&self, today: NaiveDate) -> Result<Vec<TodayPost>> {
        self.history.fetch_today_history_posts(today, today).await
    }

    /// Release the history source once nothing will ask for history again.
    pub async fn close(&self) {
        self.history.close().await;
    }

    /// Reopen a view at the page the user last saw, or page 1 if that page
    /// no longer has releases.
    pub async fn open_view(&self, user_id: i64, view: PageView, today: NaiveDate) -> Result<ReleasePage> {
        let cursor = self.user(user_id).await?.cursor(view);

        let mut page = self.load_page(view, cursor.page.max(1), today).await?;
        if page.is_empty() && page.page > 1 {
            page = self.load_page(view, 1, today).await?;
        }

        self.store_page(user_id, view, cursor, page.page).await?;
        Ok(page)
    }

    /// Move one page forward or back. Previous on page 1 stays on page 1 and
    /// Next past the last page stays on the last page.
    pub async fn turn_page(
        &self,
        user_id: i64,
        view: PageView,
        turn: PageTurn,
        today: NaiveDate,
    ) -> Result<ReleasePage> {
        let cursor = self.user(user_id).await?.cursor(view);
        let current = cursor.page.max(1);

        let target = match turn {
            PageTurn::Next => current + 1,
            PageTurn::Previous => current.saturating_sub(1).max(1),
        };

        let mut page = self.load_page(view, target, today).await?;
        if page.is_empty() && target != current {
            page = self.load_page(view, current, today).await?;
        }

        self.store_page(user_id, view, cursor, page.page).await?;
        Ok(page)
    }

    /// Remember which message shows `page` so the next turn replaces it.
    pub async fn record_page_message(&self, user_id: i64, page: &ReleasePage, message_id: i64) -> Result<()> {
        self.store
            .set_page_cursor(
                user_id,
                page.view,
                PageCursor {
                    message_id,
                    page: page.page,
                },
            )
            .await
    }

    /// One page of a view without touching any user state. The month view
    /// covers the month of `today`, the today view covers `today` itself.
    pub async fn load_page(&self, view: PageView, page: u32, today: NaiveDate) -> Result<ReleasePage> {
        let page = page.max(1);
        let window = Paging::page(page, self.page_size);
        // One extra row tells whether a next page exists.
        let lookahead = Paging::new(self.page_size + 1, window.offset);

        let result = match view {
            PageView::Releases => {
                self.store
                    .releases_by_month(today.year(), today.month(), lookahead)
                    .await
            }
            PageView::TodayReleases => {
                self.store
                    .releases_by_day(today.year(), today.month(), today.day(), lookahead)
                    .await
            }
        };

        let mut releases = match result {
            Ok(releases) => releases,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };

        let has_next = releases.len() > self.page_size as usize;
        releases.truncate(self.page_size as usize);

        Ok(ReleasePage {
            view,
            page,
            releases,
            has_previous: page > 1,
            has_next,
        })
    }

    /// Run one catalog refresh on behalf of the admin.
    pub async fn manual_refresh(&self, user_id: i64) -> Result<Vec<IngestReport>> {
        if self.admin_id != Some(user_id) {
            return Err(AppError::Forbidden(format!("user {user_id} may not refresh releases")));
        }

        tracing::info!("Manual refresh requested by {}", user_id);
        Ok(self.updater.run_cycle().await)
    }

    async fn user(&self, id: i64) -> Result<User> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("user {id}")))
    }

    async fn store_page(&self, user_id: i64, view: PageView, cursor: PageCursor, page: u32) -> Result<()> {
        if cursor.page == page {
            return Ok(());
        }
        self.store
            .set_page_cursor(
                user_id,
                view,
                PageCursor {
                    message_id: cursor.message_id,
                    page,
                },
            )
            .await
    }
}

#[cfg(test)]
pub(crate) mod stubs {
    use super::*;
    use crate::db::Repository;
    use crate::feed::ReleaseSource;
    use crate::models::{Cover, Post, ReleaseType};
    use crate::services::CoverLookup;
    use crate::updater::UpdaterSettings;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    pub struct NoReleases;

    #[async_trait]
    impl ReleaseSource for NoReleases {
        async fn fetch_release_posts(&self, _year: i32, _month: u32) -> Result<Vec<Post>> {
            Ok(Vec::new())
        }

        async fn fetch_single_posts(&self, _year: i32) -> Result<Vec<Post>> {
            Ok(Vec::new())
        }
    }

    pub struct NoCovers;

    #[async_trait]
    impl CoverLookup for NoCovers {
        async fn lookup_cover(&self, _query: &str, _size: u32) -> Result<Cover> {
            Ok(Cover::NotFound)
        }
    }

    #[derive(Default)]
    pub struct FixedHistory {
        pub posts: Vec<TodayPost>,
        pub closed: AtomicUsize,
    }

    #[async_trait]
    impl HistorySource for FixedHistory {
        async fn fetch_today_history_posts(&self, day: NaiveDate, _today: NaiveDate) -> Result<Vec<TodayPost>> {
            let posts: Vec<_> = self.posts.iter().filter(|p| p.date == day).cloned().collect();
            if posts.is_empty() {
                return Err(AppError::not_found("history"));
            }
            Ok(posts)
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub const ADMIN: i64 = 1;
    pub const USER: i64 = 2;

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub async fn app_with(page_size: u32) -> (App, Arc<Repository>) {
        let history = Arc::new(FixedHistory {
            posts: vec![TodayPost {
                text: "Illmatic turns 30".to_string(),
                image_url: None,
                date: date(2024, 4, 19),
            }],
            ..Default::default()
        });
        app_with_history(page_size, history).await
    }

    pub async fn app_with_history(page_size: u32, history: Arc<FixedHistory>) -> (App, Arc<Repository>) {
        let store = Arc::new(Repository::open_in_memory().await.unwrap());
        let updater = Arc::new(Updater::new(
            Arc::new(NoReleases),
            store.clone(),
            Arc::new(NoCovers),
            UpdaterSettings {
                years: vec![2024],
                refresh_interval: Duration::from_secs(3600),
                startup_delay: Duration::ZERO,
                cover_size: 600,
            },
        ));
        let config = Config {
            admin_id: Some(ADMIN),
            page_size,
            ..Config::default()
        };
        let app = App::new(&config, store.clone(), history, updater).unwrap();
        (app, store)
    }

    /// Seven releases in January 2024, three of them on the 12th.
    pub async fn seed(store: &Repository) {
        let artist = store.add_artist("21 Savage").await.unwrap();
        for (id, day) in [(1, 5), (2, 12), (3, 12), (4, 12), (5, 19), (6, 26), (7, 30)] {
            let release = Release::new(id, "21 Savage", &format!("Track {id}"), ReleaseType::Single, date(2024, 1, day));
            store.add_release(&release, artist).await.unwrap();
        }
    }
}
