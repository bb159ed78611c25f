//! Command types for the studyhalld protocol

use serde::{Deserialize, Serialize};
use studyhall_util::{ChannelId, ClientId, MonthId, SessionId, UserId};

use crate::{
    HealthStatus, LeaderboardReport, Occupant, SessionView, StorageStats, API_VERSION,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    /// Study or break duration out of range
    InvalidConfig,
    /// No non-bot occupants in the channel
    ChannelEmpty,
    /// A session is already running in the channel
    SessionActive,
    NoActiveSession,
    UnknownOrganization,
    PresenceUnavailable,
    StorageFailure,
    InternalError,
}

/// All possible commands from the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Start a study session in a channel (defaults: 25 min study, 5 min break)
    StartSession {
        channel_id: ChannelId,
        channel_name: String,
        #[serde(default)]
        study_minutes: Option<u32>,
        #[serde(default)]
        break_minutes: Option<u32>,
    },

    /// Cancel the session running in a channel
    StopSession { channel_id: ChannelId },

    /// List active sessions
    ListSessions,

    /// Monthly leaderboard (defaults to the current month)
    GetLeaderboard {
        #[serde(default)]
        month: Option<MonthId>,
    },

    /// Persistence statistics
    GetStorageStats,

    /// Record a member's organization choice
    SetOrganization {
        user_id: UserId,
        username: String,
        organization: String,
    },

    /// List the configured organizations
    ListOrganizations,

    /// Replace the known occupants of a channel
    UpdatePresence {
        channel_id: ChannelId,
        occupants: Vec<Occupant>,
    },

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    /// Unsubscribe from events
    UnsubscribeEvents,

    /// Get health status
    GetHealth,

    /// Ping for keepalive
    Ping,
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    SessionStarted {
        session_id: SessionId,
        channel_id: ChannelId,
        participants: Vec<Occupant>,
        study_minutes: u32,
        break_minutes: u32,
    },
    SessionStopping {
        session_id: SessionId,
    },
    Sessions(Vec<SessionView>),
    Leaderboard(LeaderboardReport),
    StorageStats(StorageStats),
    OrganizationSet {
        user_id: UserId,
        organization: String,
    },
    Organizations(Vec<String>),
    PresenceUpdated {
        channel_id: ChannelId,
        occupant_count: usize,
    },
    Subscribed {
        client_id: ClientId,
    },
    Unsubscribed,
    Health(HealthStatus),
    Pong,
}
