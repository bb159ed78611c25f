//! Credit accounting
//!
//! Pure functions that turn a participant's join time into whole minutes of
//! credit. A participant is only evaluated if they are still present when the
//! study period ends.

use chrono::{DateTime, Local};

/// What the accountant needs to know about one present participant
#[derive(Debug, Clone, Copy)]
pub struct CreditInput {
    pub join_time: DateTime<Local>,
    pub late_join: bool,
    pub session_start: DateTime<Local>,
    pub study_end: DateTime<Local>,
    pub study_minutes: u32,
}

/// Whole minutes from `from` to `to`, never negative
pub fn whole_minutes_between(from: DateTime<Local>, to: DateTime<Local>) -> u32 {
    let minutes = to.signed_duration_since(from).num_minutes();
    minutes.clamp(0, u32::MAX as i64) as u32
}

/// Most a participant who joined `minutes_late` minutes in can still earn
pub fn potential_credit(study_minutes: u32, minutes_late: u32) -> u32 {
    study_minutes.saturating_sub(minutes_late)
}

/// Minutes credited to a participant present at study end
pub fn compute_credit(input: &CreditInput) -> u32 {
    let time_in_session = whole_minutes_between(input.join_time, input.study_end);
    let mut minutes = time_in_session.min(input.study_minutes);

    if input.late_join {
        let elapsed_at_join = whole_minutes_between(input.session_start, input.join_time);
        minutes = minutes.min(potential_credit(input.study_minutes, elapsed_at_join));
    }

    minutes
}
