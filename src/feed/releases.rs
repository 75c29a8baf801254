use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::db::ALL_MONTHS;
use crate::error::{AppError, Result};
use crate::models::Post;

use super::transport::{HttpResponse, HttpTransport};
use super::ReleaseSource;

const RELEASE_POST_TYPE: &str = "release-date";
const SINGLE_POST_TYPE: &str = "single";
const RELEASE_POSTS_PER_PAGE: u32 = 99;
const SINGLE_POSTS_PER_PAGE: u32 = 100;
const POST_STATUS: &str = "publish,future";

pub const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60);

const TOO_MANY_REQUESTS: u16 = 429;

#[derive(Debug, Deserialize)]
struct PostsEnvelope {
    data: PostsData,
}

#[derive(Debug, Deserialize)]
struct PostsData {
    #[serde(default)]
    posts: Vec<Post>,
}

/// Client for the release listing API. Walks `paged=1,2,…` until a page comes
/// back empty.
pub struct ReleaseFetcher {
    transport: Arc<dyn HttpTransport>,
    base_url: Url,
    cooldown: Duration,
}

impl ReleaseFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: &str) -> Result<Self> {
        Ok(Self {
            transport,
            base_url: Url::parse(base_url)?,
            cooldown: RATE_LIMIT_COOLDOWN,
        })
    }

    /// Pause applied after a 429 before the single retry.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    fn build_url(&self, post_type: &str, per_page: u32, page: u32, year: i32, month: u32) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("post_type", post_type)
                .append_pair("posts_per_page", &per_page.to_string())
                .append_pair("paged", &page.to_string())
                .append_pair("post_status", POST_STATUS)
                .append_pair("year", &year.to_string());
            if month != ALL_MONTHS {
                query.append_pair("monthnum", &month.to_string());
            }
        }
        url
    }

    async fn fetch_all_pages(
        &self,
        post_type: &str,
        per_page: u32,
        year: i32,
        month: u32,
    ) -> Result<Vec<Post>> {
        let mut posts = Vec::new();

        for page in 1u32.. {
            let url = self.build_url(post_type, per_page, page, year, month);
            let response = self.get_with_retry(&url).await?;
            let batch = parse_posts(&response.body)?;
            if batch.is_empty() {
                break;
            }
            tracing::debug!("Page {} of {} {}/{}: {} posts", page, post_type, year, month, batch.len());
            posts.extend(batch);
        }

        Ok(posts)
    }

    /// One GET, retried exactly once after the cooldown if rate limited.
    async fn get_with_retry(&self, url: &Url) -> Result<HttpResponse> {
        let mut response = self.transport.get(url).await?;

        if response.status == TOO_MANY_REQUESTS {
            tracing::warn!("Too many requests, sleeping {:?} before retrying {}", self.cooldown, url);
            tokio::time::sleep(self.cooldown).await;
            response = self.transport.get(url).await?;
            if response.status == TOO_MANY_REQUESTS {
                return Err(AppError::RateLimited {
                    url: url.to_string(),
                });
            }
        }

        if !response.is_success() {
            return Err(AppError::UnexpectedStatus {
                status: response.status,
                url: url.to_string(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ReleaseSource for ReleaseFetcher {
    async fn fetch_release_posts(&self, year: i32, month: u32) -> Result<Vec<Post>> {
        self.fetch_all_pages(RELEASE_POST_TYPE, RELEASE_POSTS_PER_PAGE, year, month)
            .await
    }

    async fn fetch_single_posts(&self, year: i32) -> Result<Vec<Post>> {
        self.fetch_all_pages(SINGLE_POST_TYPE, SINGLE_POSTS_PER_PAGE, year, ALL_MONTHS)
            .await
    }

    async fn close(&self) {
        tracing::debug!("Release fetcher closed");
    }
}

fn parse_posts(body: &str) -> Result<Vec<Post>> {
    let envelope: PostsEnvelope = serde_json::from_str(body).map_err(|e| {
        let head: String = body.chars().take(200).collect();
        AppError::MalformedPayload(format!("{e}. Response: {head}"))
    })?;
    Ok(envelope.data.posts)
}
