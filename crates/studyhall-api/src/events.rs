//! Event types for studyhalld -> gateway streaming

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use studyhall_util::{ChannelId, SessionId, UserId};

use crate::{AbortReason, FailureKind, Occupant, SettlementSummary, TimerProgress, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: studyhall_util::now(),
            payload,
        }
    }

    /// Channel the event concerns, if it concerns one
    pub fn channel_id(&self) -> Option<&ChannelId> {
        use EventPayload::*;
        match &self.payload {
            SessionStarted { channel_id, .. }
            | LateJoiner { channel_id, .. }
            | StudyProgress { channel_id, .. }
            | StudyComplete { channel_id, .. }
            | CreditAwarded { channel_id, .. }
            | BreakStarted { channel_id, .. }
            | BreakProgress { channel_id, .. }
            | SessionCompleted { channel_id, .. }
            | SessionAborted { channel_id, .. }
            | TransientFailure { channel_id, .. } => Some(channel_id),
            Shutdown => None,
        }
    }
}

/// All possible notifications from the service to the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Study period began with the listed participants
    SessionStarted {
        session_id: SessionId,
        channel_id: ChannelId,
        channel_name: String,
        study_minutes: u32,
        break_minutes: u32,
        participants: Vec<Occupant>,
    },

    /// Someone joined the channel after the study period began
    LateJoiner {
        session_id: SessionId,
        channel_id: ChannelId,
        user_id: UserId,
        username: String,
        minutes_late: u32,
        /// Minutes they can still earn if they stay until the end
        potential_credit: u32,
    },

    /// Periodic study timer update
    StudyProgress {
        session_id: SessionId,
        channel_id: ChannelId,
        progress: TimerProgress,
        /// Current occupant count, when the presence source answered
        occupant_count: Option<usize>,
    },

    /// Study timer elapsed; settlement follows
    StudyComplete {
        session_id: SessionId,
        channel_id: ChannelId,
    },

    /// Settlement finished
    CreditAwarded {
        session_id: SessionId,
        channel_id: ChannelId,
        channel_name: String,
        summary: SettlementSummary,
        break_minutes: u32,
    },

    /// Break period began
    BreakStarted {
        session_id: SessionId,
        channel_id: ChannelId,
        break_minutes: u32,
        /// Members present at break start
        mentions: Vec<UserId>,
    },

    /// Periodic break timer update
    BreakProgress {
        session_id: SessionId,
        channel_id: ChannelId,
        progress: TimerProgress,
    },

    /// Break ended or was cut short
    SessionCompleted {
        session_id: SessionId,
        channel_id: ChannelId,
        final_occupants: Vec<Occupant>,
    },

    /// Session ended before settlement
    SessionAborted {
        session_id: SessionId,
        channel_id: ChannelId,
        reason: AbortReason,
    },

    /// A non-fatal operation failed; the session continues
    TransientFailure {
        session_id: SessionId,
        channel_id: ChannelId,
        kind: FailureKind,
        message: String,
    },

    /// Service is shutting down
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn event_serialization() {
        let event = Event::new(EventPayload::StudyProgress {
            session_id: SessionId::new(),
            channel_id: ChannelId::new("77"),
            progress: TimerProgress::new(Duration::from_secs(30), Duration::from_secs(1500)),
            occupant_count: Some(3),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"study_progress\""));

        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.api_version, API_VERSION);
        assert_eq!(parsed.channel_id(), Some(&ChannelId::new("77")));
    }

    #[test]
    fn shutdown_has_no_channel() {
        let event = Event::new(EventPayload::Shutdown);
        assert!(event.channel_id().is_none());
    }
}
