//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Organizations members can belong to. Defaults to the built-in list.
    #[serde(default)]
    pub organizations: Option<Vec<String>>,

    #[serde(default)]
    pub session: RawSessionConfig,

    #[serde(default)]
    pub timers: RawTimerConfig,

    #[serde(default)]
    pub leaderboard: RawLeaderboardConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path
    pub socket_path: Option<PathBuf>,

    /// Data directory for the store
    pub data_dir: Option<PathBuf>,
}

/// Session defaults applied when a start command omits durations
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSessionConfig {
    pub default_study_minutes: Option<u32>,
    pub default_break_minutes: Option<u32>,
}

/// Timer cadences
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawTimerConfig {
    /// Interval between late-joiner scans
    pub late_join_scan_seconds: Option<u64>,

    /// Interval between study progress updates
    pub study_tick_seconds: Option<u64>,

    /// Interval between break progress updates
    pub break_tick_seconds: Option<u64>,

    /// Presence snapshot attempts at settlement
    pub settle_attempts: Option<u32>,
}

/// Leaderboard sizing
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawLeaderboardConfig {
    /// Maximum entries kept in the monthly top-individuals list
    pub capacity: Option<usize>,

    /// Organizations shown in a report
    pub report_organizations: Option<usize>,

    /// Individuals shown in a report
    pub report_individuals: Option<usize>,
}
