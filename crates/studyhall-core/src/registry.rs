//! Active session registry
//!
//! At most one session runs per channel. Admission hands out a
//! [`RegistryGuard`]; the session task owns the guard, so the channel is
//! retired whenever the task ends, including by panic or abort.

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use studyhall_api::{SessionPhase, SessionView};
use studyhall_util::{ChannelId, SessionId};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{CoreError, CoreResult};

/// Live status published by a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub participant_count: usize,
}

/// What the registry needs to admit a session
#[derive(Debug, Clone)]
pub struct SessionTicket {
    pub session_id: SessionId,
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub study_minutes: u32,
    pub break_minutes: u32,
    pub started_at: DateTime<Local>,
}

struct RegistryEntry {
    ticket: SessionTicket,
    cancel: CancellationToken,
    status: watch::Receiver<SessionStatus>,
}

/// Handles the session task needs once admitted
pub struct Admission {
    pub guard: RegistryGuard,
    pub cancel: CancellationToken,
    pub status: watch::Sender<SessionStatus>,
}

/// Channel -> running session
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<ChannelId, RegistryEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChannelId, RegistryEntry>> {
        // A poisoned map is still consistent: every mutation is a single insert or remove
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim a channel, or fail with `Conflict` if it already has a session
    pub fn admit(&self, ticket: SessionTicket) -> CoreResult<Admission> {
        let mut sessions = self.lock();

        if sessions.contains_key(&ticket.channel_id) {
            warn!(channel_id = %ticket.channel_id, "Session already active in channel");
            return Err(CoreError::Conflict(ticket.channel_id));
        }

        let cancel = CancellationToken::new();
        let (status_tx, status_rx) = watch::channel(SessionStatus {
            phase: SessionPhase::Starting,
            participant_count: 0,
        });

        let guard = RegistryGuard {
            registry: self.clone(),
            channel_id: ticket.channel_id.clone(),
            session_id: ticket.session_id.clone(),
        };

        debug!(
            session_id = %ticket.session_id,
            channel_id = %ticket.channel_id,
            "Session admitted"
        );
        sessions.insert(
            ticket.channel_id.clone(),
            RegistryEntry {
                ticket,
                cancel: cancel.clone(),
                status: status_rx,
            },
        );

        Ok(Admission {
            guard,
            cancel,
            status: status_tx,
        })
    }

    /// Remove a channel's session. Retiring an idle channel is a no-op.
    pub fn retire(&self, channel_id: &ChannelId) -> bool {
        self.lock().remove(channel_id).is_some()
    }

    fn retire_session(&self, channel_id: &ChannelId, session_id: &SessionId) {
        let mut sessions = self.lock();
        if sessions
            .get(channel_id)
            .is_some_and(|e| &e.ticket.session_id == session_id)
        {
            sessions.remove(channel_id);
            info!(session_id = %session_id, channel_id = %channel_id, "Session retired");
        }
    }

    /// Cancel the session in a channel, returning its id
    pub fn cancel(&self, channel_id: &ChannelId) -> Option<SessionId> {
        let sessions = self.lock();
        let entry = sessions.get(channel_id)?;
        entry.cancel.cancel();
        Some(entry.ticket.session_id.clone())
    }

    /// Cancel every live session. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let sessions = self.lock();
        for entry in sessions.values() {
            entry.cancel.cancel();
        }
        sessions.len()
    }

    pub fn list(&self) -> Vec<SessionView> {
        let sessions = self.lock();
        let mut views: Vec<SessionView> = sessions
            .values()
            .map(|entry| {
                let status = *entry.status.borrow();
                SessionView {
                    session_id: entry.ticket.session_id.clone(),
                    channel_id: entry.ticket.channel_id.clone(),
                    channel_name: entry.ticket.channel_name.clone(),
                    phase: status.phase,
                    study_minutes: entry.ticket.study_minutes,
                    break_minutes: entry.ticket.break_minutes,
                    started_at: entry.ticket.started_at,
                    participant_count: status.participant_count,
                }
            })
            .collect();
        views.sort_by_key(|v| v.started_at);
        views
    }

    pub fn is_active(&self, channel_id: &ChannelId) -> bool {
        self.lock().contains_key(channel_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Retires its channel when dropped
pub struct RegistryGuard {
    registry: SessionRegistry,
    channel_id: ChannelId,
    session_id: SessionId,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.registry.retire_session(&self.channel_id, &self.session_id);
    }
}
