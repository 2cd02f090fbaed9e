pub mod battlemetrics;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::server::{SearchHit, ServerSnapshot};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rate limited by BattleMetrics")]
    RateLimited,
    #[error("BattleMetrics returned status {0}")]
    Status(u16),
}

/// Live server state provider.
#[async_trait]
pub trait ServerSource: Send + Sync {
    /// Fetches one server. Every failure (timeout, 429, other status, bad
    /// body) is logged and comes back as `None`.
    async fn fetch(&self, server_id: &str, token: Option<&str>) -> Option<ServerSnapshot>;

    async fn search(
        &self,
        query: &str,
        game: &str,
        page_size: u32,
        token: Option<&str>,
    ) -> Result<Vec<SearchHit>, SourceError>;
}
