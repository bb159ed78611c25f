//! Persisted record types

use chrono::{DateTime, Datelike, Local};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use studyhall_api::LeaderboardEntry;
use studyhall_util::{ChannelId, MonthId, SessionId, UserId};

/// One participant's settled credit for one session. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// `YYYY-MM-DD_<user id>_<session id>`
    pub record_key: String,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub username: String,
    pub organization: String,
    /// This participant's effective join time
    pub session_start: DateTime<Local>,
    /// End of the study period
    pub session_end: DateTime<Local>,
    pub duration_minutes: u32,
    pub month: u32,
    pub year: i32,
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub late_join: bool,
    pub completed: bool,
    pub recorded_at: DateTime<Local>,
}

impl SessionRecord {
    /// Key under which a participant's settlement is stored
    pub fn key_for(study_end: &DateTime<Local>, user_id: &UserId, session_id: &SessionId) -> String {
        format!("{}_{}_{}", study_end.format("%Y-%m-%d"), user_id, session_id)
    }

    /// Month the record counts towards
    pub fn month_id(&self) -> MonthId {
        MonthId::of(&self.session_end)
    }
}

/// Fields needed to build a [`SessionRecord`]
#[derive(Debug, Clone)]
pub struct NewSessionRecord {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub username: String,
    pub organization: String,
    pub joined_at: DateTime<Local>,
    pub study_end: DateTime<Local>,
    pub minutes: u32,
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub late_join: bool,
}

impl NewSessionRecord {
    pub fn into_record(self, recorded_at: DateTime<Local>) -> SessionRecord {
        SessionRecord {
            record_key: SessionRecord::key_for(&self.study_end, &self.user_id, &self.session_id),
            session_id: self.session_id,
            user_id: self.user_id,
            username: self.username,
            organization: self.organization,
            session_start: self.joined_at,
            session_end: self.study_end,
            duration_minutes: self.minutes,
            month: self.study_end.month(),
            year: self.study_end.year(),
            channel_id: self.channel_id,
            channel_name: self.channel_name,
            late_join: self.late_join,
            completed: true,
            recorded_at,
        }
    }
}

/// Running totals for one calendar month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyAggregate {
    pub month: MonthId,
    /// Organization name -> total minutes
    pub organization_minutes: BTreeMap<String, u64>,
    /// Unique per user, sorted by minutes descending
    pub top_individuals: Vec<LeaderboardEntry>,
    /// Record keys already added to the organization totals
    #[serde(default)]
    pub folded_records: BTreeSet<String>,
    pub last_updated: Option<DateTime<Local>>,
}

impl MonthlyAggregate {
    /// Empty aggregate with every organization at zero
    pub fn new<S: AsRef<str>>(month: MonthId, organizations: &[S]) -> Self {
        Self {
            month,
            organization_minutes: organizations
                .iter()
                .map(|o| (o.as_ref().to_string(), 0))
                .collect(),
            top_individuals: Vec::new(),
            folded_records: BTreeSet::new(),
            last_updated: None,
        }
    }

    pub fn total_minutes(&self) -> u64 {
        self.organization_minutes.values().sum()
    }
}

/// A member's chosen organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub username: String,
    pub organization: String,
    pub joined_at: DateTime<Local>,
    pub last_updated: DateTime<Local>,
}
