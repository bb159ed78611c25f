//! Validated settings structures

use crate::schema::{
    RawConfig, RawLeaderboardConfig, RawServiceConfig, RawSessionConfig, RawTimerConfig,
};
use std::path::PathBuf;
use std::time::Duration;
use studyhall_util::{default_data_dir, default_socket_path};

/// Organizations used when the config does not list any
pub const DEFAULT_ORGANIZATIONS: &[&str] = &[
    "Wina",
    "VTK",
    "Atmosphere",
    "Chemica",
    "BIOS",
    "Atlas",
    "Politeia",
    "VRG",
    "Ekonomika",
    "Medica",
];

/// Validated settings ready for use by the core
#[derive(Debug, Clone)]
pub struct Settings {
    pub service: ServiceConfig,
    pub organizations: Vec<String>,
    pub session: SessionDefaults,
    pub timers: TimerSettings,
    pub leaderboard: LeaderboardSettings,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let organizations = raw.organizations.unwrap_or_else(default_organizations);

        Self {
            service: ServiceConfig::from_raw(raw.service),
            organizations,
            session: SessionDefaults::from_raw(raw.session),
            timers: TimerSettings::from_raw(raw.timers),
            leaderboard: LeaderboardSettings::from_raw(raw.leaderboard),
        }
    }

    pub fn is_known_organization(&self, name: &str) -> bool {
        self.organizations.iter().any(|o| o == name)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            organizations: default_organizations(),
            session: SessionDefaults::default(),
            timers: TimerSettings::default(),
            leaderboard: LeaderboardSettings::default(),
        }
    }
}

fn default_organizations() -> Vec<String> {
    DEFAULT_ORGANIZATIONS.iter().map(|s| s.to_string()).collect()
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw.socket_path.unwrap_or_else(default_socket_path),
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            data_dir: default_data_dir(),
        }
    }
}

/// Durations used when a start command leaves them out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionDefaults {
    pub study_minutes: u32,
    pub break_minutes: u32,
}

impl SessionDefaults {
    fn from_raw(raw: RawSessionConfig) -> Self {
        let defaults = Self::default();
        Self {
            study_minutes: raw.default_study_minutes.unwrap_or(defaults.study_minutes),
            break_minutes: raw.default_break_minutes.unwrap_or(defaults.break_minutes),
        }
    }
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            study_minutes: 25,
            break_minutes: 5,
        }
    }
}

/// Cadence of the session timers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSettings {
    pub late_join_scan: Duration,
    pub study_tick: Duration,
    pub break_tick: Duration,
    /// Presence snapshot attempts at settlement, one scan interval apart
    pub settle_attempts: u32,
}

impl TimerSettings {
    fn from_raw(raw: RawTimerConfig) -> Self {
        let defaults = Self::default();
        Self {
            late_join_scan: raw
                .late_join_scan_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.late_join_scan),
            study_tick: raw
                .study_tick_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.study_tick),
            break_tick: raw
                .break_tick_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.break_tick),
            settle_attempts: raw.settle_attempts.unwrap_or(defaults.settle_attempts),
        }
    }
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            late_join_scan: Duration::from_secs(10),
            study_tick: Duration::from_secs(30),
            break_tick: Duration::from_secs(15),
            settle_attempts: 3,
        }
    }
}

/// Leaderboard sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderboardSettings {
    /// Maximum entries kept in the monthly top-individuals list
    pub capacity: usize,
    pub report_organizations: usize,
    pub report_individuals: usize,
}

impl LeaderboardSettings {
    fn from_raw(raw: RawLeaderboardConfig) -> Self {
        let defaults = Self::default();
        let capacity = raw.capacity.unwrap_or(defaults.capacity);
        Self {
            capacity,
            report_organizations: raw
                .report_organizations
                .unwrap_or(defaults.report_organizations),
            report_individuals: raw
                .report_individuals
                .unwrap_or(defaults.report_individuals)
                .min(capacity),
        }
    }
}

impl Default for LeaderboardSettings {
    fn default() -> Self {
        Self {
            capacity: 100,
            report_organizations: 10,
            report_individuals: 3,
        }
    }
}
