//! Core error type

use studyhall_api::ErrorCode;
use studyhall_presence::PresenceError;
use studyhall_store::StoreError;
use studyhall_util::ChannelId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid session configuration: {0}")]
    InvalidConfig(String),

    #[error("Nobody is in channel {0}")]
    ChannelEmpty(ChannelId),

    #[error("Channel {0} already has an active session")]
    Conflict(ChannelId),

    #[error("No active session in channel {0}")]
    NoActiveSession(ChannelId),

    #[error("Storage failure: {0}")]
    StorageFailure(#[from] StoreError),

    #[error("Presence source failure: {0}")]
    PresenceSourceFailure(#[from] PresenceError),

    #[error("Unknown organization: {0}")]
    UnknownOrganization(String),
}

impl CoreError {
    /// Protocol error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::InvalidConfig(_) => ErrorCode::InvalidConfig,
            CoreError::ChannelEmpty(_) => ErrorCode::ChannelEmpty,
            CoreError::Conflict(_) => ErrorCode::SessionActive,
            CoreError::NoActiveSession(_) => ErrorCode::NoActiveSession,
            CoreError::StorageFailure(_) => ErrorCode::StorageFailure,
            CoreError::PresenceSourceFailure(_) => ErrorCode::PresenceUnavailable,
            CoreError::UnknownOrganization(_) => ErrorCode::UnknownOrganization,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
