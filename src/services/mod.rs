mod covers;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Cover;

pub use covers::CoverClient;

/// Best-effort cover art lookup. A missing cover is `Cover::NotFound`, not an
/// error; `Err` is reserved for transport and payload failures.
#[async_trait]
pub trait CoverLookup: Send + Sync {
    async fn lookup_cover(&self, query: &str, size: u32) -> Result<Cover>;
}
