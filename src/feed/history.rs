use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::TodayPost;

use super::transport::HttpTransport;
use super::HistorySource;

const CAPTION_PREFIX: &str = "Today in Hip Hop History:";

/// How many days before `today` the lookup may step back.
pub const MAX_LOOKBACK_DAYS: i64 = 2;

const DATE_LAYOUTS: [&str; 3] = ["%b. %d %Y", "%b %d %Y", "%B %d %Y"];

struct BlockPatterns {
    post_start: Regex,
    date: Regex,
    photo: Regex,
    caption: Regex,
}

static PATTERNS: OnceLock<BlockPatterns> = OnceLock::new();

fn patterns() -> &'static BlockPatterns {
    PATTERNS.get_or_init(|| BlockPatterns {
        post_start: Regex::new(r#"<div[^>]*\bclass=["'](?:[^"']*\s)?post(?:\s[^"']*)?["'][^>]*>"#)
            .expect("valid post regex"),
        date: Regex::new(r#"(?s)\bclass=["']date["'][^>]*>.*?<a[^>]*>([^<]+)</a>"#)
            .expect("valid date regex"),
        photo: Regex::new(r#"\bdata-big-photo=["']([^"']+)["']"#).expect("valid photo regex"),
        caption: Regex::new(r#"(?s)<div[^>]*\bclass=["']caption["'][^>]*>(.*?)</div>"#)
            .expect("valid caption regex"),
    })
}

/// Scraper for the "today in hip hop history" page.
pub struct HistoryFetcher {
    transport: Arc<dyn HttpTransport>,
    url: Url,
}

impl HistoryFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, url: &str) -> Result<Self> {
        Ok(Self {
            transport,
            url: Url::parse(url)?,
        })
    }

    async fn fetch_page(&self) -> Result<String> {
        let response = self.transport.get(&self.url).await?;
        if !response.is_success() {
            return Err(AppError::UnexpectedStatus {
                status: response.status,
                url: self.url.to_string(),
            });
        }
        Ok(response.body)
    }
}

#[async_trait]
impl HistorySource for HistoryFetcher {
    async fn fetch_today_history_posts(&self, day: NaiveDate, today: NaiveDate) -> Result<Vec<TodayPost>> {
        let html = self.fetch_page().await?;
        let posts = parse_history_page(&html);
        tracing::debug!("History page has {} dated posts", posts.len());
        posts_for_day(&posts, day, today)
    }

    async fn close(&self) {
        tracing::debug!("History fetcher closed");
    }
}

/// Posts dated `day`. When none match, step back one day at a time while
/// `today - day` stays under the lookback window.
pub fn posts_for_day(posts: &[TodayPost], mut day: NaiveDate, today: NaiveDate) -> Result<Vec<TodayPost>> {
    for _ in 0..=MAX_LOOKBACK_DAYS {
        let matching: Vec<TodayPost> = posts.iter().filter(|p| p.date == day).cloned().collect();
        if !matching.is_empty() {
            return Ok(matching);
        }
        if (today - day).num_days() >= MAX_LOOKBACK_DAYS {
            break;
        }
        match day.pred_opt() {
            Some(previous) => {
                tracing::debug!("No history post for {}, trying {}", day, previous);
                day = previous;
            }
            None => break,
        }
    }

    Err(AppError::not_found(format!("history post for {today}")))
}

/// Every post block that carries a parsable date and a caption.
pub fn parse_history_page(html: &str) -> Vec<TodayPost> {
    let p = patterns();
    let starts: Vec<usize> = p.post_start.find_iter(html).map(|m| m.start()).collect();

    let mut posts = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(html.len());
        if let Some(post) = parse_block(&html[start..end]) {
            posts.push(post);
        }
    }
    posts
}

fn parse_block(block: &str) -> Option<TodayPost> {
    let p = patterns();

    let raw_date = p.date.captures(block)?.get(1)?.as_str().trim();
    let Some(date) = parse_history_date(raw_date) else {
        tracing::debug!("Unparsable history date {:?}", raw_date);
        return None;
    };

    let caption_html = p.caption.captures(block)?.get(1)?.as_str();
    let text = caption_text(caption_html)?;

    let image_url = p
        .photo
        .captures(block)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    Some(TodayPost {
        text,
        image_url,
        date,
    })
}

fn parse_history_date(raw: &str) -> Option<NaiveDate> {
    DATE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(raw, layout).ok())
}

fn caption_text(html: &str) -> Option<String> {
    let text = match html2text::from_read(html.as_bytes(), 10_000) {
        Ok(t) => t,
        Err(e) => {
            tracing::debug!("Failed to convert caption to text: {}", e);
            return None;
        }
    };

    let text = text.trim();
    let text = text.strip_prefix(CAPTION_PREFIX).unwrap_or(text);
    let cleaned = text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}
