pub mod discord;

use async_trait::async_trait;
use log::{debug, error};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: f64 },
    #[error("missing permissions: {0}")]
    Forbidden(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
}

pub const GUILD_VOICE: u8 = 2;
pub const GUILD_CATEGORY: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub name: String,
    pub kind: u8,
    pub guild_id: Option<String>,
}

impl ChannelInfo {
    pub fn is_category_in(&self, guild_id: &str) -> bool {
        self.kind == GUILD_CATEGORY && self.guild_id.as_deref() == Some(guild_id)
    }
}

/// Destination platform operations on named channels.
#[async_trait]
pub trait ChannelApi: Send + Sync {
    /// The channel as the destination sees it, `None` when it no longer exists.
    async fn channel(&self, channel_id: &str) -> Result<Option<ChannelInfo>, ChannelError>;

    async fn channel_name(&self, channel_id: &str) -> Result<Option<String>, ChannelError> {
        Ok(self.channel(channel_id).await?.map(|c| c.name))
    }

    async fn rename_channel(&self, channel_id: &str, name: &str) -> Result<(), ChannelError>;

    /// Creates a locked voice channel under `category_id`, returning its id.
    async fn create_channel(
        &self,
        guild_id: &str,
        category_id: &str,
        name: &str,
        reason: &str,
    ) -> Result<String, ChannelError>;

    async fn delete_channel(&self, channel_id: &str, reason: &str) -> Result<(), ChannelError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Unchanged,
    ChannelMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Updated,
    Skipped(SkipReason),
    Failed,
}

/// Renames channels only when their live name differs from the wanted one.
pub struct ChannelSink {
    api: Arc<dyn ChannelApi>,
    pacing: Duration,
}

impl ChannelSink {
    pub fn new(api: Arc<dyn ChannelApi>, pacing: Duration) -> Self {
        Self { api, pacing }
    }

    pub fn api(&self) -> &Arc<dyn ChannelApi> {
        &self.api
    }

    /// Delay a caller must observe after every `apply_if_changed` in a batch.
    pub fn pacing_delay(&self) -> Duration {
        self.pacing
    }

    pub async fn apply_if_changed(&self, channel_id: &str, desired: &str) -> ApplyOutcome {
        let current = match self.api.channel_name(channel_id).await {
            Ok(Some(name)) => name,
            Ok(None) => {
                debug!("Channel {} no longer exists, skipping", channel_id);
                return ApplyOutcome::Skipped(SkipReason::ChannelMissing);
            }
            Err(e) => {
                error!("Failed to look up channel {}: {}", channel_id, e);
                return ApplyOutcome::Failed;
            }
        };

        if current == desired {
            return ApplyOutcome::Skipped(SkipReason::Unchanged);
        }

        match self.api.rename_channel(channel_id, desired).await {
            Ok(()) => {
                debug!("Updated channel {} to: {}", channel_id, desired);
                ApplyOutcome::Updated
            }
            Err(e) => {
                error!("Failed to update channel {}: {}", channel_id, e);
                ApplyOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeChannels;

    fn sink(channels: &Arc<FakeChannels>) -> ChannelSink {
        ChannelSink::new(channels.clone(), Duration::ZERO)
    }

    #[tokio::test]
    async fn renames_then_skips_unchanged() {
        let channels = Arc::new(FakeChannels::default());
        channels.insert("c1", "old");
        let sink = sink(&channels);

        assert_eq!(sink.apply_if_changed("c1", "[1/2] A").await, ApplyOutcome::Updated);
        assert_eq!(
            sink.apply_if_changed("c1", "[1/2] A").await,
            ApplyOutcome::Skipped(SkipReason::Unchanged)
        );
        assert_eq!(channels.rename_count(), 1);
        assert_eq!(channels.name_of("c1").as_deref(), Some("[1/2] A"));
    }

    #[tokio::test]
    async fn missing_channel_is_skipped() {
        let channels = Arc::new(FakeChannels::default());
        let sink = sink(&channels);

        assert_eq!(
            sink.apply_if_changed("gone", "x").await,
            ApplyOutcome::Skipped(SkipReason::ChannelMissing)
        );
        assert_eq!(channels.rename_count(), 0);
    }

    #[tokio::test]
    async fn rejected_rename_is_failed() {
        let channels = Arc::new(FakeChannels::default());
        channels.insert("c1", "old");
        channels.fail_renames_for("c1");
        let sink = sink(&channels);

        assert_eq!(sink.apply_if_changed("c1", "new").await, ApplyOutcome::Failed);
        assert_eq!(channels.name_of("c1").as_deref(), Some("old"));
    }
}
