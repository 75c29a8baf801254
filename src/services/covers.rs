use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::feed::HttpTransport;
use crate::models::Cover;

use super::CoverLookup;

const SEARCH_ENTITIES: &str = "musicArtist,musicTrack,album,mix,song";
const DEFAULT_ARTWORK_SUFFIX: &str = "100x100bb.jpg";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "resultCount", default)]
    #[allow(dead_code)]
    result_count: u32,
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(rename = "artworkUrl100", default)]
    artwork_url: Option<String>,
}

/// Cover art search against a music catalog search endpoint.
pub struct CoverClient {
    transport: Arc<dyn HttpTransport>,
    search_url: Url,
}

impl CoverClient {
    pub fn new(transport: Arc<dyn HttpTransport>, search_url: &str) -> Result<Self> {
        Ok(Self {
            transport,
            search_url: Url::parse(search_url)?,
        })
    }

    fn build_url(&self, query: &str) -> Url {
        let mut url = self.search_url.clone();
        url.query_pairs_mut()
            .append_pair("term", query)
            .append_pair("limit", "1")
            .append_pair("entity", SEARCH_ENTITIES)
            .append_pair("media", "music");
        url
    }
}

#[async_trait]
impl CoverLookup for CoverClient {
    async fn lookup_cover(&self, query: &str, size: u32) -> Result<Cover> {
        let url = self.build_url(query);
        let response = self.transport.get(&url).await?;

        if !response.is_success() {
            return Err(AppError::UnexpectedStatus {
                status: response.status,
                url: url.to_string(),
            });
        }

        let search: SearchResponse = serde_json::from_str(&response.body)
            .map_err(|e| AppError::MalformedPayload(format!("cover search: {e}")))?;

        let artwork = search
            .results
            .into_iter()
            .next()
            .and_then(|result| result.artwork_url)
            .filter(|url| !url.is_empty());

        Ok(match artwork {
            Some(artwork) => Cover::Found(resize_artwork(&artwork, size)),
            None => Cover::NotFound,
        })
    }
}

/// Swap the default 100px artwork suffix for the requested square size.
pub fn resize_artwork(url: &str, size: u32) -> String {
    let base = url.strip_suffix(DEFAULT_ARTWORK_SUFFIX).unwrap_or(url);
    format!("{base}{size}x{size}.jpg")
}
