use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;

use crate::app::ReleasePage;
use crate::error::Result;
use crate::models::{PageView, Release, ReleaseType, TodayPost};

/// Shown to users whenever a request fails on our side.
pub const GENERIC_ERROR_TEXT: &str = "Something went wrong on the server while handling your request.";

pub const HISTORY_HEADER: &str = "Today in Hip Hop History:";

/// Picture used for a release page when none of its releases has a cover.
pub const DEFAULT_RELEASES_PICTURE: &str =
    "https://assets.sentaifilmworks.com/category-defaults/NewReleases.jpg";

const ALBUM_EMOJI: &str = "💿";
const SINGLE_EMOJI: &str = "🎤";

/// Outbound messaging. Every send returns the platform id of the message it
/// created.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i64>;

    async fn send_history(&self, chat_id: i64, post: &TodayPost) -> Result<i64>;

    async fn send_releases(&self, chat_id: i64, page: &ReleasePage) -> Result<i64>;
}

fn emoji(kind: ReleaseType) -> &'static str {
    match kind {
        ReleaseType::Album => ALBUM_EMOJI,
        ReleaseType::Single => SINGLE_EMOJI,
    }
}

/// `💿 Artist - Title (12 January 2024)`
pub fn release_caption(release: &Release) -> String {
    format!(
        "{} {} - {} ({})",
        emoji(release.kind),
        release.artist.name,
        release.title,
        release.date.format("%-d %B %Y")
    )
}

/// Caption without the date, for releases that are out today.
pub fn today_release_caption(release: &Release) -> String {
    format!("{} {} - {}", emoji(release.kind), release.artist.name, release.title)
}

pub fn page_caption(page: &ReleasePage) -> String {
    let caption: fn(&Release) -> String = match page.view {
        PageView::Releases => release_caption,
        PageView::TodayReleases => today_release_caption,
    };
    page.releases
        .iter()
        .map(caption)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// First available cover on the page, else the generic picture.
pub fn page_picture(page: &ReleasePage) -> &str {
    page.releases
        .iter()
        .find_map(|r| r.cover_url.as_deref())
        .unwrap_or(DEFAULT_RELEASES_PICTURE)
}

pub fn history_caption(post: &TodayPost) -> String {
    format!("{}\n{}", HISTORY_HEADER, post.text)
}

/// Notifier that writes every message to the log.
#[derive(Debug, Default)]
pub struct LogNotifier {
    next_id: AtomicI64,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_message_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i64> {
        tracing::info!("[chat {}] {}", chat_id, text);
        Ok(self.next_message_id())
    }

    async fn send_history(&self, chat_id: i64, post: &TodayPost) -> Result<i64> {
        tracing::info!(
            "[chat {}] {} (photo: {})",
            chat_id,
            history_caption(post),
            post.image_url.as_deref().unwrap_or("none")
        );
        Ok(self.next_message_id())
    }

    async fn send_releases(&self, chat_id: i64, page: &ReleasePage) -> Result<i64> {
        tracing::info!(
            "[chat {}] page {} ({}):\n{}",
            chat_id,
            page.page,
            page_picture(page),
            page_caption(page)
        );
        Ok(self.next_message_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn release(id: i64, title: &str, kind: ReleaseType) -> Release {
        let date = NaiveDate::from_ymd_opt(2024, 1, 12).unwrap();
        Release::new(id, "21 Savage", title, kind, date)
    }

    fn page(view: PageView, releases: Vec<Release>) -> ReleasePage {
        ReleasePage {
            view,
            page: 1,
            releases,
            has_previous: false,
            has_next: false,
        }
    }

    #[test]
    fn captions_carry_type_and_date() {
        assert_eq!(
            release_caption(&release(1, "American Dream", ReleaseType::Album)),
            "💿 21 Savage - American Dream (12 January 2024)"
        );
        assert_eq!(
            today_release_caption(&release(2, "redrum", ReleaseType::Single)),
            "🎤 21 Savage - redrum"
        );
    }

    #[test]
    fn page_caption_follows_the_view() {
        let releases = vec![
            release(1, "American Dream", ReleaseType::Album),
            release(2, "redrum", ReleaseType::Single),
        ];

        let month = page_caption(&page(PageView::Releases, releases.clone()));
        assert_eq!(
            month,
            "💿 21 Savage - American Dream (12 January 2024)\n\n🎤 21 Savage - redrum (12 January 2024)"
        );

        let today = page_caption(&page(PageView::TodayReleases, releases));
        assert_eq!(today, "💿 21 Savage - American Dream\n\n🎤 21 Savage - redrum");
    }

    #[test]
    fn picture_prefers_the_first_cover() {
        let mut with_cover = release(2, "redrum", ReleaseType::Single);
        with_cover.cover_url = Some("https://art.test/redrum.jpg".to_string());

        let bare = page(PageView::Releases, vec![release(1, "American Dream", ReleaseType::Album)]);
        assert_eq!(page_picture(&bare), DEFAULT_RELEASES_PICTURE);

        let mixed = page(
            PageView::Releases,
            vec![release(1, "American Dream", ReleaseType::Album), with_cover],
        );
        assert_eq!(page_picture(&mixed), "https://art.test/redrum.jpg");
    }

    #[tokio::test]
    async fn log_notifier_hands_out_increasing_ids() {
        let notifier = LogNotifier::new();

        let first = notifier.send_text(1, "hello").await.unwrap();
        let second = notifier
            .send_releases(1, &page(PageView::TodayReleases, Vec::new()))
            .await
            .unwrap();

        assert_eq!((first, second), (1, 2));
    }
}
