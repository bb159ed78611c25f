//! Study service: the command surface used by the daemon

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use studyhall_api::{
    AbortReason, EventPayload, HealthStatus, LeaderboardReport, Occupant, SessionPhase,
    SessionView, StorageStats,
};
use studyhall_config::{
    break_minutes_in_range, study_minutes_in_range, Settings, MAX_BREAK_MINUTES,
    MAX_STUDY_MINUTES,
};
use studyhall_presence::{NotificationSink, PresenceSource};
use studyhall_store::{Store, UserProfile};
use studyhall_util::{ChannelId, Clock, MonotonicClock, MonthId, SessionId, UserId};
use tracing::{info, warn};

use crate::{
    Admission, Aggregator, CoreError, CoreResult, Participant, SessionContext, SessionParams,
    SessionRegistry, SessionStatus, SessionTicket, StudySession,
};

/// Result of a successful start
#[derive(Debug, Clone)]
pub struct StartedSession {
    pub session_id: SessionId,
    pub channel_id: ChannelId,
    /// Initial participants, with resolved organizations
    pub participants: Vec<Occupant>,
    pub study_minutes: u32,
    pub break_minutes: u32,
}

pub struct StudyService {
    settings: Settings,
    registry: SessionRegistry,
    ctx: SessionContext,
}

impl StudyService {
    pub fn new(
        settings: Settings,
        store: Arc<dyn Store>,
        presence: Arc<dyn PresenceSource>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let aggregator = Arc::new(Aggregator::new(
            store.clone(),
            settings.organizations.clone(),
            settings.leaderboard,
        ));

        info!(
            organizations = settings.organizations.len(),
            default_study_minutes = settings.session.study_minutes,
            default_break_minutes = settings.session.break_minutes,
            "Study service initialized"
        );

        let ctx = SessionContext {
            presence,
            sink,
            store,
            aggregator,
            clock: Arc::new(MonotonicClock::new()),
            timers: settings.timers,
            organizations: settings.organizations.clone().into(),
        };

        Self {
            settings,
            registry: SessionRegistry::new(),
            ctx,
        }
    }

    /// Replace the clock sessions read timestamps from
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.ctx.clock = clock;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Start a session in a channel. Durations default to the configured ones.
    pub async fn start_session(
        &self,
        channel_id: ChannelId,
        channel_name: String,
        study_minutes: Option<u32>,
        break_minutes: Option<u32>,
    ) -> CoreResult<StartedSession> {
        let study_minutes = study_minutes.unwrap_or(self.settings.session.study_minutes);
        let break_minutes = break_minutes.unwrap_or(self.settings.session.break_minutes);

        if !study_minutes_in_range(study_minutes) {
            return Err(CoreError::InvalidConfig(format!(
                "study minutes must be between 1 and {}, got {}",
                MAX_STUDY_MINUTES, study_minutes
            )));
        }
        if !break_minutes_in_range(break_minutes) {
            return Err(CoreError::InvalidConfig(format!(
                "break minutes must be between 0 and {}, got {}",
                MAX_BREAK_MINUTES, break_minutes
            )));
        }

        let session_id = SessionId::new();
        let session_start = self.ctx.clock.now();

        let Admission {
            guard,
            cancel,
            status,
        } = self.registry.admit(SessionTicket {
            session_id: session_id.clone(),
            channel_id: channel_id.clone(),
            channel_name: channel_name.clone(),
            study_minutes,
            break_minutes,
            started_at: session_start,
        })?;

        let occupants = match self.ctx.presence.occupants(&channel_id).await {
            Ok(occupants) => occupants,
            Err(e) => {
                warn!(channel_id = %channel_id, error = %e, "Presence unavailable at session start");
                self.abort_setup(
                    &session_id,
                    &channel_id,
                    AbortReason::PresenceUnavailable {
                        message: e.to_string(),
                    },
                )
                .await;
                return Err(e.into());
            }
        };

        if occupants.is_empty() {
            info!(channel_id = %channel_id, "Refusing to start session in empty channel");
            self.abort_setup(&session_id, &channel_id, AbortReason::ChannelEmpty)
                .await;
            return Err(CoreError::ChannelEmpty(channel_id));
        }

        let mut seen = HashSet::new();
        let participants: Vec<Participant> = occupants
            .iter()
            .filter(|occupant| seen.insert(occupant.user_id.clone()))
            .map(|occupant| Participant {
                user_id: occupant.user_id.clone(),
                username: occupant.username.clone(),
                organization: self.ctx.resolve_organization(occupant),
                join_time: session_start,
                late: false,
            })
            .collect();
        let roster: Vec<Occupant> = participants
            .iter()
            .map(|p| {
                Occupant::new(p.user_id.clone(), p.username.clone())
                    .with_organization(p.organization.clone())
            })
            .collect();

        status.send_replace(SessionStatus {
            phase: SessionPhase::Starting,
            participant_count: participants.len(),
        });

        self.ctx
            .emit(EventPayload::SessionStarted {
                session_id: session_id.clone(),
                channel_id: channel_id.clone(),
                channel_name: channel_name.clone(),
                study_minutes,
                break_minutes,
                participants: roster.clone(),
            })
            .await;

        let session = StudySession::new(
            SessionParams {
                session_id: session_id.clone(),
                channel_id: channel_id.clone(),
                channel_name,
                study_minutes,
                break_minutes,
            },
            self.ctx.clone(),
            session_start,
            participants,
            cancel,
            status,
        );
        tokio::spawn(session.run(guard));

        Ok(StartedSession {
            session_id,
            channel_id,
            participants: roster,
            study_minutes,
            break_minutes,
        })
    }

    async fn abort_setup(&self, session_id: &SessionId, channel_id: &ChannelId, reason: AbortReason) {
        self.ctx
            .emit(EventPayload::SessionAborted {
                session_id: session_id.clone(),
                channel_id: channel_id.clone(),
                reason,
            })
            .await;
    }

    /// Cancel the session running in a channel
    pub fn stop_session(&self, channel_id: &ChannelId) -> CoreResult<SessionId> {
        let session_id = self
            .registry
            .cancel(channel_id)
            .ok_or_else(|| CoreError::NoActiveSession(channel_id.clone()))?;
        info!(session_id = %session_id, channel_id = %channel_id, "Session stop requested");
        Ok(session_id)
    }

    pub fn list_active_sessions(&self) -> Vec<SessionView> {
        self.registry.list()
    }

    /// Leaderboard for a month (the current month if none is given)
    pub fn get_leaderboard(&self, month: Option<MonthId>) -> CoreResult<LeaderboardReport> {
        let month = month.unwrap_or_else(MonthId::current);
        self.ctx.aggregator.leaderboard(month)
    }

    pub fn get_storage_stats(&self) -> CoreResult<StorageStats> {
        Ok(self.ctx.store.storage_stats()?)
    }

    /// Record a member's organization. The first join date is kept.
    pub fn set_organization(
        &self,
        user_id: UserId,
        username: String,
        organization: String,
    ) -> CoreResult<UserProfile> {
        if !self.settings.is_known_organization(&organization) {
            return Err(CoreError::UnknownOrganization(organization));
        }

        let now = self.ctx.clock.now();
        let joined_at = self
            .ctx
            .store
            .get_user_profile(&user_id)?
            .map(|p| p.joined_at)
            .unwrap_or(now);

        let profile = UserProfile {
            user_id,
            username,
            organization,
            joined_at,
            last_updated: now,
        };
        self.ctx.store.put_user_profile(&profile)?;

        info!(user_id = %profile.user_id, organization = %profile.organization, "Organization set");
        Ok(profile)
    }

    pub fn list_organizations(&self) -> Vec<String> {
        self.settings.organizations.clone()
    }

    pub fn health(&self) -> HealthStatus {
        let store_ok = self.ctx.store.is_healthy();
        HealthStatus {
            live: true,
            ready: store_ok && self.ctx.presence.is_healthy(),
            store_ok,
            active_sessions: self.registry.len(),
        }
    }

    /// Cancel every session and wait up to `grace` for them to retire.
    /// Returns how many sessions were cancelled.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        let cancelled = self.registry.cancel_all();
        if cancelled > 0 {
            info!(sessions = cancelled, "Cancelling active sessions");
        }

        let deadline = tokio::time::Instant::now() + grace;
        while !self.registry.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if !self.registry.is_empty() {
            warn!(remaining = self.registry.len(), "Sessions still running at shutdown");
        }
        cancelled
    }
}
