//! Collaborator traits

use async_trait::async_trait;
use studyhall_api::{Event, Occupant};
use studyhall_util::ChannelId;
use thiserror::Error;

/// Errors from presence and notification operations
#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("Presence source unavailable: {0}")]
    Unavailable(String),

    #[error("Notification sink closed")]
    SinkClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type PresenceResult<T> = Result<T, PresenceError>;

/// Who is in a channel right now
#[async_trait]
pub trait PresenceSource: Send + Sync {
    /// Non-bot occupants of the channel. Unknown channels are empty.
    async fn occupants(&self, channel_id: &ChannelId) -> PresenceResult<Vec<Occupant>>;

    /// Optional: check if the source is healthy
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Where session notifications go
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: Event) -> PresenceResult<()>;
}
