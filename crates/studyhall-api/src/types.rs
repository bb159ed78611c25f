//! Shared types for the studyhalld API

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use studyhall_util::{ChannelId, MonthId, SessionId, UserId};
use std::time::Duration;

/// Organization name used when a member belongs to none of the configured ones
pub const NO_ORGANIZATION: &str = "None";

/// A non-bot member currently in a channel, as reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    pub user_id: UserId,
    pub username: String,
    /// Organization tag derived from the member's roles, if any
    #[serde(default)]
    pub organization: Option<String>,
}

impl Occupant {
    pub fn new(user_id: impl Into<UserId>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            organization: None,
        }
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }
}

/// Lifecycle phase of a study session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Starting,
    Studying,
    Settling,
    OnBreak,
    Completed,
    Aborted,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Aborted)
    }
}

/// Why a session ended without settling credit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AbortReason {
    /// Nobody was in the channel when the session started
    ChannelEmpty,
    /// The session was cancelled before settlement
    Cancelled,
    /// The presence source could not be queried during setup
    PresenceUnavailable { message: String },
}

/// Operation that failed transiently during a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PresencePoll,
    SessionWrite,
    AggregateUpdate,
}

/// Active session information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub phase: SessionPhase,
    pub study_minutes: u32,
    pub break_minutes: u32,
    pub started_at: DateTime<Local>,
    pub participant_count: usize,
}

/// Credit awarded to one participant at settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLine {
    pub user_id: UserId,
    pub username: String,
    pub organization: String,
    pub minutes: u32,
    pub late_join: bool,
}

/// Outcome of settling a study period
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSummary {
    /// Participants who earned credit, highest first
    pub awarded: Vec<CreditLine>,
    /// Participants still present who earned zero minutes
    pub present_without_credit: usize,
    /// Participants absent from the channel at study end
    pub left_early: usize,
    /// Settlements whose session record could not be written
    pub failed_writes: usize,
}

impl SettlementSummary {
    pub fn total_minutes(&self) -> u64 {
        self.awarded.iter().map(|c| c.minutes as u64).sum()
    }

    pub fn any_late(&self) -> bool {
        self.awarded.iter().any(|c| c.late_join)
    }
}

/// One row of the monthly top-individuals leaderboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub username: String,
    pub organization: String,
    pub minutes: u64,
}

/// An organization's position in the monthly ranking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationStanding {
    pub rank: usize,
    pub organization: String,
    pub total_minutes: u64,
}

/// Monthly leaderboard report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardReport {
    pub month: MonthId,
    /// Organizations ranked by minutes, highest first
    pub organizations: Vec<OrganizationStanding>,
    pub top_individuals: Vec<LeaderboardEntry>,
    pub last_updated: Option<DateTime<Local>>,
}

impl LeaderboardReport {
    /// Whether any organization has logged minutes this month
    pub fn has_data(&self) -> bool {
        self.organizations.iter().any(|o| o.total_minutes > 0)
    }
}

/// Persistence statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_sessions: u64,
    pub total_users: u64,
    pub disk_usage_bytes: u64,
}

impl StorageStats {
    pub fn disk_usage_mb(&self) -> f64 {
        self.disk_usage_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
    pub active_sessions: usize,
}

/// Time remaining and progress of a running timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerProgress {
    pub elapsed: Duration,
    pub remaining: Duration,
    pub total: Duration,
}

impl TimerProgress {
    pub fn new(elapsed: Duration, total: Duration) -> Self {
        let elapsed = elapsed.min(total);
        Self {
            elapsed,
            remaining: total - elapsed,
            total,
        }
    }

    /// Whole percent complete, 0-100
    pub fn percent(&self) -> u8 {
        if self.total.is_zero() {
            return 100;
        }
        ((self.elapsed.as_millis() * 100) / self.total.as_millis()) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occupant_organization_is_optional() {
        let json = r#"{"user_id":"42","username":"ada"}"#;
        let occupant: Occupant = serde_json::from_str(json).unwrap();
        assert_eq!(occupant.user_id, UserId::new("42"));
        assert!(occupant.organization.is_none());
    }

    #[test]
    fn terminal_phases() {
        assert!(SessionPhase::Completed.is_terminal());
        assert!(SessionPhase::Aborted.is_terminal());
        assert!(!SessionPhase::OnBreak.is_terminal());
        assert!(!SessionPhase::Studying.is_terminal());
    }

    #[test]
    fn timer_progress_percent() {
        let total = Duration::from_secs(1500);
        assert_eq!(TimerProgress::new(Duration::ZERO, total).percent(), 0);
        assert_eq!(TimerProgress::new(Duration::from_secs(750), total).percent(), 50);
        assert_eq!(TimerProgress::new(Duration::from_secs(2000), total).percent(), 100);

        let progress = TimerProgress::new(Duration::from_secs(30), total);
        assert_eq!(progress.remaining, Duration::from_secs(1470));
    }

    #[test]
    fn leaderboard_without_minutes_has_no_data() {
        let report = LeaderboardReport {
            month: MonthId::new(2025, 2).unwrap(),
            organizations: vec![OrganizationStanding {
                rank: 1,
                organization: "VTK".into(),
                total_minutes: 0,
            }],
            top_individuals: vec![],
            last_updated: None,
        };
        assert!(!report.has_data());
    }

    #[test]
    fn abort_reason_serialization() {
        let reason = AbortReason::PresenceUnavailable {
            message: "gateway offline".into(),
        };
        let json = serde_json::to_string(&reason).unwrap();
        assert!(json.contains("presence_unavailable"));
    }
}
