//! Configuration validation

use crate::schema::RawConfig;
use std::collections::HashSet;
use studyhall_api::NO_ORGANIZATION;
use thiserror::Error;

/// Longest study period a session may request, in minutes
pub const MAX_STUDY_MINUTES: u32 = 120;

/// Longest break a session may request, in minutes
pub const MAX_BREAK_MINUTES: u32 = 60;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Duplicate organization: {0}")]
    DuplicateOrganization(String),

    #[error("Invalid organization name '{name}': {message}")]
    InvalidOrganization { name: String, message: String },

    #[error("Study minutes must be between 1 and {MAX_STUDY_MINUTES}, got {0}")]
    StudyMinutesOutOfRange(u32),

    #[error("Break minutes must be between 0 and {MAX_BREAK_MINUTES}, got {0}")]
    BreakMinutesOutOfRange(u32),

    #[error("Timer '{name}' must be at least 1 second")]
    ZeroInterval { name: &'static str },

    #[error("Leaderboard setting '{name}': {message}")]
    LeaderboardError { name: &'static str, message: String },

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Whether a study duration is acceptable for a session
pub fn study_minutes_in_range(minutes: u32) -> bool {
    (1..=MAX_STUDY_MINUTES).contains(&minutes)
}

/// Whether a break duration is acceptable for a session
pub fn break_minutes_in_range(minutes: u32) -> bool {
    minutes <= MAX_BREAK_MINUTES
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(organizations) = &config.organizations {
        errors.extend(validate_organizations(organizations));
    }

    if let Some(study) = config.session.default_study_minutes
        && !study_minutes_in_range(study)
    {
        errors.push(ValidationError::StudyMinutesOutOfRange(study));
    }
    if let Some(brk) = config.session.default_break_minutes
        && !break_minutes_in_range(brk)
    {
        errors.push(ValidationError::BreakMinutesOutOfRange(brk));
    }

    let timers = &config.timers;
    for (name, value) in [
        ("late_join_scan_seconds", timers.late_join_scan_seconds),
        ("study_tick_seconds", timers.study_tick_seconds),
        ("break_tick_seconds", timers.break_tick_seconds),
    ] {
        if value == Some(0) {
            errors.push(ValidationError::ZeroInterval { name });
        }
    }
    if timers.settle_attempts == Some(0) {
        errors.push(ValidationError::GlobalError(
            "settle_attempts must be at least 1".into(),
        ));
    }

    errors.extend(validate_leaderboard(config));

    errors
}

fn validate_organizations(organizations: &[String]) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if organizations.is_empty() {
        errors.push(ValidationError::GlobalError(
            "at least one organization must be configured".into(),
        ));
    }

    let mut seen = HashSet::new();
    for name in organizations {
        if name.trim().is_empty() {
            errors.push(ValidationError::InvalidOrganization {
                name: name.clone(),
                message: "name cannot be empty".into(),
            });
            continue;
        }
        if name == NO_ORGANIZATION {
            errors.push(ValidationError::InvalidOrganization {
                name: name.clone(),
                message: "name is reserved for members without an organization".into(),
            });
        }
        if !seen.insert(name.as_str()) {
            errors.push(ValidationError::DuplicateOrganization(name.clone()));
        }
    }

    errors
}

fn validate_leaderboard(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let lb = &config.leaderboard;

    if lb.capacity == Some(0) {
        errors.push(ValidationError::LeaderboardError {
            name: "capacity",
            message: "must be at least 1".into(),
        });
    }

    if let (Some(shown), Some(capacity)) = (lb.report_individuals, lb.capacity)
        && shown > capacity
    {
        errors.push(ValidationError::LeaderboardError {
            name: "report_individuals",
            message: format!("{} exceeds capacity {}", shown, capacity),
        });
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> RawConfig {
        toml::from_str("config_version = 1").unwrap()
    }

    #[test]
    fn duration_ranges() {
        assert!(study_minutes_in_range(1));
        assert!(study_minutes_in_range(120));
        assert!(!study_minutes_in_range(0));
        assert!(!study_minutes_in_range(121));

        assert!(break_minutes_in_range(0));
        assert!(break_minutes_in_range(60));
        assert!(!break_minutes_in_range(61));
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&base()).is_empty());
    }

    #[test]
    fn duplicate_and_reserved_organizations() {
        let mut config = base();
        config.organizations = Some(vec!["VTK".into(), "VTK".into(), "None".into()]);

        let errors = validate_config(&config);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateOrganization(n) if n == "VTK")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidOrganization { name, .. } if name == "None")));
    }

    #[test]
    fn zero_intervals_rejected() {
        let mut config = base();
        config.timers.study_tick_seconds = Some(0);
        config.timers.settle_attempts = Some(0);

        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::ZeroInterval {
                name: "study_tick_seconds"
            }
        )));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::GlobalError(_))));
    }

    #[test]
    fn out_of_range_session_defaults() {
        let mut config = base();
        config.session.default_study_minutes = Some(0);
        config.session.default_break_minutes = Some(90);

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn report_larger_than_capacity() {
        let mut config = base();
        config.leaderboard.capacity = Some(5);
        config.leaderboard.report_individuals = Some(10);

        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::LeaderboardError {
                name: "report_individuals",
                ..
            }
        )));
    }
}
