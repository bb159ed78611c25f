//! Session state machine
//!
//! A session runs on its own task:
//! `Starting -> Studying -> Settling -> OnBreak -> Completed`, or
//! `Aborted` if cancelled before settlement.
//!
//! While studying, the late-joiner scan and the progress timer are joined on
//! the session task and share the participant list. Settlement starts only
//! once the timer has seen the full study length and the scan has stopped.

use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use studyhall_api::{
    AbortReason, CreditLine, Event, EventPayload, FailureKind, Occupant, SessionPhase,
    SettlementSummary, TimerProgress, NO_ORGANIZATION,
};
use studyhall_config::TimerSettings;
use studyhall_presence::{NotificationSink, PresenceSource};
use studyhall_store::{NewSessionRecord, Store};
use studyhall_util::{format_countdown, ChannelId, Clock, SessionId, UserId};
use tokio::sync::watch;
use tokio::time::{interval_at, sleep, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::credit::{compute_credit, potential_credit, whole_minutes_between, CreditInput};
use crate::{Aggregator, RegistryGuard, SessionStatus};

/// Collaborators shared by every session
#[derive(Clone)]
pub struct SessionContext {
    pub presence: Arc<dyn PresenceSource>,
    pub sink: Arc<dyn NotificationSink>,
    pub store: Arc<dyn Store>,
    pub aggregator: Arc<Aggregator>,
    pub clock: Arc<dyn Clock>,
    pub timers: TimerSettings,
    /// Organizations members may be credited to
    pub organizations: Arc<[String]>,
}

impl SessionContext {
    pub(crate) async fn emit(&self, payload: EventPayload) {
        if let Err(e) = self.sink.notify(Event::new(payload)).await {
            warn!(error = %e, "Failed to deliver notification");
        }
    }

    fn is_known_organization(&self, name: &str) -> bool {
        self.organizations.iter().any(|o| o == name)
    }

    /// Organization tag from the gateway, else the stored profile, else "None".
    /// Only configured organizations are accepted from either source.
    pub(crate) fn resolve_organization(&self, occupant: &Occupant) -> String {
        match occupant.organization.as_deref() {
            Some(org) if self.is_known_organization(org) => return org.to_string(),
            Some(org) if !org.is_empty() => {
                debug!(user_id = %occupant.user_id, tag = %org, "Ignoring unknown organization tag");
            }
            _ => {}
        }

        match self.store.get_user_profile(&occupant.user_id) {
            Ok(Some(profile)) if self.is_known_organization(&profile.organization) => {
                profile.organization
            }
            Ok(_) => NO_ORGANIZATION.to_string(),
            Err(e) => {
                warn!(user_id = %occupant.user_id, error = %e, "Profile lookup failed");
                NO_ORGANIZATION.to_string()
            }
        }
    }
}

/// Fixed parameters of one session
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub session_id: SessionId,
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub study_minutes: u32,
    pub break_minutes: u32,
}

/// A member taking part in the study period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub user_id: UserId,
    pub username: String,
    pub organization: String,
    pub join_time: DateTime<Local>,
    /// Joined strictly after the session started
    pub late: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StudyOutcome {
    Finished { study_end: DateTime<Local> },
    Cancelled,
}

/// A running study session
pub struct StudySession {
    params: SessionParams,
    ctx: SessionContext,
    session_start: DateTime<Local>,
    participants: Mutex<Vec<Participant>>,
    cancel: CancellationToken,
    status: watch::Sender<SessionStatus>,
}

impl StudySession {
    pub fn new(
        params: SessionParams,
        ctx: SessionContext,
        session_start: DateTime<Local>,
        participants: Vec<Participant>,
        cancel: CancellationToken,
        status: watch::Sender<SessionStatus>,
    ) -> Self {
        Self {
            params,
            ctx,
            session_start,
            participants: Mutex::new(participants),
            cancel,
            status,
        }
    }

    fn participants(&self) -> MutexGuard<'_, Vec<Participant>> {
        self.participants
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_phase(&self, phase: SessionPhase) {
        let participant_count = self.participants().len();
        self.status.send_replace(SessionStatus {
            phase,
            participant_count,
        });
        debug!(session_id = %self.params.session_id, phase = ?phase, "Session phase changed");
    }

    fn study_length(&self) -> Duration {
        Duration::from_secs(self.params.study_minutes as u64 * 60)
    }

    async fn transient_failure(&self, kind: FailureKind, message: String) {
        warn!(
            session_id = %self.params.session_id,
            kind = ?kind,
            %message,
            "Transient session failure"
        );
        self.ctx
            .emit(EventPayload::TransientFailure {
                session_id: self.params.session_id.clone(),
                channel_id: self.params.channel_id.clone(),
                kind,
                message,
            })
            .await;
    }

    /// Drive the session to a terminal state. The guard retires the channel on return.
    pub async fn run(self, _guard: RegistryGuard) {
        let session_id = self.params.session_id.clone();
        info!(
            session_id = %session_id,
            channel_id = %self.params.channel_id,
            study_minutes = self.params.study_minutes,
            break_minutes = self.params.break_minutes,
            "Study period started"
        );

        self.set_phase(SessionPhase::Studying);
        let study_end = match self.study_period().await {
            StudyOutcome::Finished { study_end } => study_end,
            StudyOutcome::Cancelled => {
                self.set_phase(SessionPhase::Aborted);
                info!(session_id = %session_id, "Session cancelled before settlement");
                self.ctx
                    .emit(EventPayload::SessionAborted {
                        session_id,
                        channel_id: self.params.channel_id.clone(),
                        reason: AbortReason::Cancelled,
                    })
                    .await;
                return;
            }
        };

        self.set_phase(SessionPhase::Settling);
        self.ctx
            .emit(EventPayload::StudyComplete {
                session_id: session_id.clone(),
                channel_id: self.params.channel_id.clone(),
            })
            .await;

        let summary = self.settle(study_end).await;
        info!(
            session_id = %session_id,
            awarded = summary.awarded.len(),
            total_minutes = summary.total_minutes(),
            left_early = summary.left_early,
            failed_writes = summary.failed_writes,
            "Settlement complete"
        );
        self.ctx
            .emit(EventPayload::CreditAwarded {
                session_id: session_id.clone(),
                channel_id: self.params.channel_id.clone(),
                channel_name: self.params.channel_name.clone(),
                summary,
                break_minutes: self.params.break_minutes,
            })
            .await;

        self.set_phase(SessionPhase::OnBreak);
        self.break_period().await;

        let final_occupants = self.occupants_or_empty().await;
        self.set_phase(SessionPhase::Completed);
        info!(session_id = %session_id, "Session completed");
        self.ctx
            .emit(EventPayload::SessionCompleted {
                session_id,
                channel_id: self.params.channel_id.clone(),
                final_occupants,
            })
            .await;
    }

    async fn study_period(&self) -> StudyOutcome {
        let start = Instant::now();
        let scan_stop = self.cancel.child_token();

        let scan = self.scan_late_joiners(start, &scan_stop);
        let timer = async {
            let outcome = self.study_timer(start).await;
            scan_stop.cancel();
            outcome
        };

        let ((), outcome) = tokio::join!(scan, timer);
        outcome
    }

    async fn study_timer(&self, start: Instant) -> StudyOutcome {
        let total = self.study_length();
        let deadline = start + total;
        let mut ticks = interval_at(start, self.ctx.timers.study_tick);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return StudyOutcome::Cancelled,
                _ = sleep_until(deadline) => {
                    return StudyOutcome::Finished { study_end: self.ctx.clock.now() };
                }
                _ = ticks.tick() => {
                    let progress = TimerProgress::new(start.elapsed(), total);
                    debug!(
                        session_id = %self.params.session_id,
                        remaining = %format_countdown(progress.remaining),
                        "Study tick"
                    );
                    let occupant_count = match self.ctx.presence.occupants(&self.params.channel_id).await {
                        Ok(occupants) => Some(occupants.len()),
                        Err(e) => {
                            debug!(session_id = %self.params.session_id, error = %e, "Occupant count unavailable");
                            None
                        }
                    };
                    self.ctx
                        .emit(EventPayload::StudyProgress {
                            session_id: self.params.session_id.clone(),
                            channel_id: self.params.channel_id.clone(),
                            progress,
                            occupant_count,
                        })
                        .await;
                }
            }
        }
    }

    async fn scan_late_joiners(&self, start: Instant, stop: &CancellationToken) {
        let period = self.ctx.timers.late_join_scan;
        let mut ticks = interval_at(start + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticks.tick() => self.scan_once().await,
            }
        }
    }

    /// Add anyone present who is not yet a participant
    async fn scan_once(&self) {
        let occupants = match self.ctx.presence.occupants(&self.params.channel_id).await {
            Ok(occupants) => occupants,
            Err(e) => {
                self.transient_failure(FailureKind::PresencePoll, e.to_string()).await;
                return;
            }
        };

        let newcomers: Vec<Occupant> = {
            let participants = self.participants();
            let known: HashSet<&UserId> = participants.iter().map(|p| &p.user_id).collect();
            occupants
                .into_iter()
                .filter(|o| !known.contains(&o.user_id))
                .collect()
        };
        if newcomers.is_empty() {
            return;
        }

        for occupant in newcomers {
            let organization = self.ctx.resolve_organization(&occupant);
            let now = self.ctx.clock.now();
            let minutes_late = whole_minutes_between(self.session_start, now);
            let participant = Participant {
                user_id: occupant.user_id.clone(),
                username: occupant.username.clone(),
                organization,
                join_time: now,
                late: now > self.session_start,
            };

            let added = {
                let mut participants = self.participants();
                if participants.iter().any(|p| p.user_id == participant.user_id) {
                    false
                } else {
                    participants.push(participant);
                    true
                }
            };
            if !added {
                continue;
            }

            info!(
                session_id = %self.params.session_id,
                user_id = %occupant.user_id,
                minutes_late,
                "Late joiner added"
            );
            self.ctx
                .emit(EventPayload::LateJoiner {
                    session_id: self.params.session_id.clone(),
                    channel_id: self.params.channel_id.clone(),
                    user_id: occupant.user_id,
                    username: occupant.username,
                    minutes_late,
                    potential_credit: potential_credit(self.params.study_minutes, minutes_late),
                })
                .await;
        }

        let count = self.participants().len();
        self.status.send_modify(|status| status.participant_count = count);
    }

    /// Presence snapshot for settlement, retried one scan interval apart
    async fn settlement_snapshot(&self) -> Option<Vec<Occupant>> {
        let attempts = self.ctx.timers.settle_attempts.max(1);
        for attempt in 1..=attempts {
            match self.ctx.presence.occupants(&self.params.channel_id).await {
                Ok(occupants) => return Some(occupants),
                Err(e) => {
                    warn!(
                        session_id = %self.params.session_id,
                        attempt,
                        attempts,
                        error = %e,
                        "Settlement presence snapshot failed"
                    );
                    if attempt < attempts {
                        sleep(self.ctx.timers.late_join_scan).await;
                    }
                }
            }
        }
        None
    }

    async fn settle(&self, study_end: DateTime<Local>) -> SettlementSummary {
        let mut summary = SettlementSummary::default();

        let Some(present) = self.settlement_snapshot().await else {
            self.transient_failure(
                FailureKind::PresencePoll,
                "presence unavailable at study end; no credit awarded".into(),
            )
            .await;
            return summary;
        };
        let present: HashSet<UserId> = present.into_iter().map(|o| o.user_id).collect();

        let participants = self.participants().clone();
        for participant in participants {
            if !present.contains(&participant.user_id) {
                summary.left_early += 1;
                continue;
            }

            let minutes = compute_credit(&CreditInput {
                join_time: participant.join_time,
                late_join: participant.late,
                session_start: self.session_start,
                study_end,
                study_minutes: self.params.study_minutes,
            });
            if minutes == 0 {
                summary.present_without_credit += 1;
                continue;
            }

            let record = NewSessionRecord {
                session_id: self.params.session_id.clone(),
                user_id: participant.user_id.clone(),
                username: participant.username.clone(),
                organization: participant.organization.clone(),
                joined_at: participant.join_time,
                study_end,
                minutes,
                channel_id: self.params.channel_id.clone(),
                channel_name: self.params.channel_name.clone(),
                late_join: participant.late,
            }
            .into_record(self.ctx.clock.now());

            match self.ctx.store.put_session_record(&record) {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        session_id = %self.params.session_id,
                        record_key = %record.record_key,
                        "Session record already exists, not crediting again"
                    );
                    continue;
                }
                Err(e) => {
                    summary.failed_writes += 1;
                    self.transient_failure(
                        FailureKind::SessionWrite,
                        format!("could not save credit for {}: {}", participant.username, e),
                    )
                    .await;
                    continue;
                }
            }

            if let Err(e) = self.ctx.aggregator.fold_session(&record).await {
                self.transient_failure(
                    FailureKind::AggregateUpdate,
                    format!("could not update monthly stats for {}: {}", participant.username, e),
                )
                .await;
            }

            summary.awarded.push(CreditLine {
                user_id: participant.user_id,
                username: participant.username,
                organization: participant.organization,
                minutes,
                late_join: participant.late,
            });
        }

        summary.awarded.sort_by(|a, b| b.minutes.cmp(&a.minutes));
        summary
    }

    async fn occupants_or_empty(&self) -> Vec<Occupant> {
        match self.ctx.presence.occupants(&self.params.channel_id).await {
            Ok(occupants) => occupants,
            Err(e) => {
                warn!(session_id = %self.params.session_id, error = %e, "Presence unavailable");
                Vec::new()
            }
        }
    }

    async fn break_period(&self) {
        let mentions = self
            .occupants_or_empty()
            .await
            .into_iter()
            .map(|o| o.user_id)
            .collect();

        self.ctx
            .emit(EventPayload::BreakStarted {
                session_id: self.params.session_id.clone(),
                channel_id: self.params.channel_id.clone(),
                break_minutes: self.params.break_minutes,
                mentions,
            })
            .await;

        let total = Duration::from_secs(self.params.break_minutes as u64 * 60);
        if total.is_zero() {
            return;
        }

        let start = Instant::now();
        let deadline = start + total;
        let mut ticks = interval_at(start, self.ctx.timers.break_tick);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(session_id = %self.params.session_id, "Break cut short");
                    return;
                }
                _ = sleep_until(deadline) => return,
                _ = ticks.tick() => {
                    let progress = TimerProgress::new(start.elapsed(), total);
                    debug!(
                        session_id = %self.params.session_id,
                        remaining = %format_countdown(progress.remaining),
                        "Break tick"
                    );
                    self.ctx
                        .emit(EventPayload::BreakProgress {
                            session_id: self.params.session_id.clone(),
                            channel_id: self.params.channel_id.clone(),
                            progress,
                        })
                        .await;
                }
            }
        }
    }
}
