use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, FixedOffset, NaiveDate, Utc};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::app::{App, ReleasePage};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{PageView, TodayPost, User};
use crate::notify::{Notifier, GENERIC_ERROR_TEXT};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BroadcastReport {
    pub subscribers: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Daily push of today's history item and today's releases to every
/// subscriber.
pub struct Scheduler {
    app: Arc<App>,
    notifier: Arc<dyn Notifier>,
    send_hour: u32,
    utc_offset: FixedOffset,
    admin_id: Option<i64>,
}

impl Scheduler {
    pub fn new(config: &Config, app: Arc<App>, notifier: Arc<dyn Notifier>) -> Result<Self> {
        Ok(Self {
            app,
            notifier,
            send_hour: config.send_hour,
            utc_offset: config.utc_offset()?,
            admin_id: config.admin_id,
        })
    }

    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            let now = Utc::now().with_timezone(&self.utc_offset);
            let next = match next_run(now, self.send_hour) {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!("Cannot schedule broadcast: {}", e);
                    break;
                }
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tracing::info!("Next broadcast at {}", next.format("%H:%M %d.%m.%Y"));

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            let report = self.broadcast(next.date_naive()).await;
            tracing::info!(
                "Broadcast done: {} subscribers, {} delivered, {} failed",
                report.subscribers,
                report.delivered,
                report.failed
            );
        }

        tracing::info!("Scheduler stopped");
        self.app.close().await;
    }

    /// Send the daily messages for `today` to every subscriber. One failing
    /// subscriber never holds back the others.
    pub async fn broadcast(&self, today: NaiveDate) -> BroadcastReport {
        let subscribers = match self.app.subscribers().await {
            Ok(users) => users,
            Err(e) => {
                tracing::error!("Failed to load subscribers: {}", e);
                self.alert_admin(&e).await;
                return BroadcastReport::default();
            }
        };
        if subscribers.is_empty() {
            tracing::info!("No subscribers, skipping broadcast");
            return BroadcastReport::default();
        }

        let history = self.app.today_history(today).await;
        if let Err(e) = &history {
            tracing::warn!("No history item for {}: {}", today, e);
        }

        let releases = match self.app.load_page(PageView::TodayReleases, 1, today).await {
            Ok(page) if !page.is_empty() => Some(page),
            Ok(_) => {
                tracing::info!("No releases out on {}, skipping them", today);
                None
            }
            Err(e) => {
                tracing::warn!("Failed to load today's releases: {}", e);
                None
            }
        };

        let results = join_all(
            subscribers
                .iter()
                .map(|user| self.deliver(user, &history, releases.as_ref())),
        )
        .await;

        let mut report = BroadcastReport {
            subscribers: subscribers.len(),
            ..Default::default()
        };
        for (user, result) in subscribers.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!("Broadcast to {} failed: {}", user.id, e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    async fn deliver(
        &self,
        user: &User,
        history: &Result<Vec<TodayPost>>,
        releases: Option<&ReleasePage>,
    ) -> Result<()> {
        match history {
            Ok(posts) => {
                for post in posts {
                    self.notifier.send_history(user.id, post).await?;
                }
            }
            Err(_) => {
                self.notifier.send_text(user.id, GENERIC_ERROR_TEXT).await?;
            }
        }

        if let Some(page) = releases {
            let message_id = self.notifier.send_releases(user.id, page).await?;
            self.app.record_page_message(user.id, page, message_id).await?;
        }

        Ok(())
    }

    async fn alert_admin(&self, error: &AppError) {
        let Some(admin_id) = self.admin_id else {
            return;
        };
        let text = format!("An error occurred: {error}");
        if let Err(e) = self.notifier.send_text(admin_id, &text).await {
            tracing::warn!("Failed to alert admin: {}", e);
        }
    }
}

/// The first `send_hour:00` strictly after `now`, in `now`'s offset.
pub fn next_run(now: DateTime<FixedOffset>, send_hour: u32) -> Result<DateTime<FixedOffset>> {
    let at = |day: NaiveDate| {
        day.and_hms_opt(send_hour, 0, 0)
            .and_then(|t| t.and_local_timezone(*now.offset()).single())
            .ok_or_else(|| AppError::Config(format!("invalid send hour {send_hour}")))
    };

    let today = at(now.date_naive())?;
    if today > now {
        return Ok(today);
    }

    let tomorrow = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .ok_or_else(|| AppError::Config("date out of range".to_string()))?;
    at(tomorrow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::stubs::{app_with, app_with_history, date, seed, FixedHistory, USER};
    use crate::db::CatalogStore;
    use crate::models::PageCursor;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Sent {
        Text(i64, String),
        History(i64, String),
        Releases(i64, Vec<i64>),
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Sent>>,
        failing_chat: Option<i64>,
        next_id: AtomicI64,
    }

    impl RecordingNotifier {
        fn failing_for(chat_id: i64) -> Self {
            Self {
                failing_chat: Some(chat_id),
                ..Default::default()
            }
        }

        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn record(&self, chat_id: i64, message: Sent) -> Result<i64> {
            if self.failing_chat == Some(chat_id) {
                return Err(AppError::Notify(format!("chat {chat_id} blocked the bot")));
            }
            self.sent.lock().unwrap().push(message);
            Ok(100 + self.next_id.fetch_add(1, Ordering::SeqCst))
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_text(&self, chat_id: i64, text: &str) -> Result<i64> {
            self.record(chat_id, Sent::Text(chat_id, text.to_string()))
        }

        async fn send_history(&self, chat_id: i64, post: &TodayPost) -> Result<i64> {
            self.record(chat_id, Sent::History(chat_id, post.text.clone()))
        }

        async fn send_releases(&self, chat_id: i64, page: &ReleasePage) -> Result<i64> {
            let ids = page.releases.iter().map(|r| r.id).collect();
            self.record(chat_id, Sent::Releases(chat_id, ids))
        }
    }

    const OTHER: i64 = 3;

    async fn scheduler(notifier: Arc<RecordingNotifier>) -> (Scheduler, Arc<App>, Arc<crate::db::Repository>) {
        let (app, store) = app_with(2).await;
        seed(&store).await;
        for (id, name) in [(USER, "geek"), (OTHER, "head")] {
            app.ensure_user(id, name).await.unwrap();
            app.set_subscription(id, true).await.unwrap();
        }
        let app = Arc::new(app);
        let scheduler = Scheduler::new(&Config::default(), app.clone(), notifier).unwrap();
        (scheduler, app, store)
    }

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    #[test]
    fn next_run_is_later_today_before_the_hour() {
        let now = offset().with_ymd_and_hms(2024, 1, 12, 8, 30, 0).unwrap();

        let next = next_run(now, 9).unwrap();

        assert_eq!(next, offset().with_ymd_and_hms(2024, 1, 12, 9, 0, 0).unwrap());
    }

    #[test]
    fn next_run_rolls_over_at_and_after_the_hour() {
        let at_hour = offset().with_ymd_and_hms(2024, 1, 12, 9, 0, 0).unwrap();
        let late = offset().with_ymd_and_hms(2024, 12, 31, 23, 59, 0).unwrap();

        assert_eq!(
            next_run(at_hour, 9).unwrap(),
            offset().with_ymd_and_hms(2024, 1, 13, 9, 0, 0).unwrap()
        );
        assert_eq!(
            next_run(late, 9).unwrap(),
            offset().with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn subscribers_get_history_error_notice_and_releases() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (scheduler, _, store) = scheduler(notifier.clone()).await;

        // No history item is dated 2024-01-12, releases exist.
        let report = scheduler.broadcast(date(2024, 1, 12)).await;

        assert_eq!(
            report,
            BroadcastReport {
                subscribers: 2,
                delivered: 2,
                failed: 0
            }
        );
        let sent = notifier.sent();
        for chat in [USER, OTHER] {
            assert!(sent.contains(&Sent::Text(chat, GENERIC_ERROR_TEXT.to_string())));
            assert!(sent.contains(&Sent::Releases(chat, vec![2, 3])));
        }

        let user = store.get_user(USER).await.unwrap().unwrap();
        assert_eq!(user.today_releases.page, 1);
        assert!(user.today_releases.message_id >= 100);
        assert_ne!(user.today_releases, PageCursor::default());
    }

    #[tokio::test]
    async fn days_without_releases_send_only_history() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (scheduler, _, _) = scheduler(notifier.clone()).await;

        scheduler.broadcast(date(2024, 4, 19)).await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.contains(&Sent::History(USER, "Illmatic turns 30".to_string())));
        assert!(sent.contains(&Sent::History(OTHER, "Illmatic turns 30".to_string())));
    }

    #[tokio::test]
    async fn one_failing_subscriber_does_not_block_others() {
        let notifier = Arc::new(RecordingNotifier::failing_for(USER));
        let (scheduler, _, store) = scheduler(notifier.clone()).await;

        let report = scheduler.broadcast(date(2024, 1, 12)).await;

        assert_eq!((report.delivered, report.failed), (1, 1));
        assert!(notifier.sent().contains(&Sent::Releases(OTHER, vec![2, 3])));
        let blocked = store.get_user(USER).await.unwrap().unwrap();
        assert_eq!(blocked.today_releases, PageCursor::default());
    }

    #[tokio::test]
    async fn nobody_subscribed_sends_nothing() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (scheduler, app, _) = scheduler(notifier.clone()).await;
        app.set_subscription(USER, false).await.unwrap();
        app.set_subscription(OTHER, false).await.unwrap();

        let report = scheduler.broadcast(date(2024, 1, 12)).await;

        assert_eq!(report, BroadcastReport::default());
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn cancellation_ends_the_wait() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (scheduler, _, _) = scheduler(notifier.clone()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), scheduler.run(cancel))
            .await
            .unwrap();

        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn stopping_closes_the_history_source() {
        let history = Arc::new(FixedHistory::default());
        let (app, _) = app_with_history(2, history.clone()).await;
        let scheduler = Scheduler::new(
            &Config::default(),
            Arc::new(app),
            Arc::new(RecordingNotifier::default()),
        )
        .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        scheduler.run(cancel).await;

        assert_eq!(history.closed.load(Ordering::SeqCst), 1);
    }
}
