//! Mock presence source and recording sink for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use studyhall_api::{Event, EventPayload, Occupant};
use studyhall_util::{ChannelId, UserId};

use crate::{NotificationSink, PresenceError, PresenceResult, PresenceSource};

/// Mock presence source for unit/integration testing
#[derive(Default)]
pub struct MockPresence {
    channels: Mutex<HashMap<ChannelId, Vec<Occupant>>>,
    queries: AtomicU64,

    /// Number of upcoming queries that fail
    failures_pending: AtomicU32,

    /// Configure every query to fail
    pub fail_always: Arc<Mutex<bool>>,
}

impl MockPresence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a member in a channel (replacing any previous entry for them)
    pub fn join(&self, channel_id: &ChannelId, occupant: Occupant) {
        let mut channels = self.channels.lock().unwrap();
        let occupants = channels.entry(channel_id.clone()).or_default();
        occupants.retain(|o| o.user_id != occupant.user_id);
        occupants.push(occupant);
    }

    /// Replace a channel's occupant list verbatim, as a gateway push would
    pub fn set_occupants(&self, channel_id: &ChannelId, occupants: Vec<Occupant>) {
        self.channels
            .lock()
            .unwrap()
            .insert(channel_id.clone(), occupants);
    }

    /// Remove a member from a channel
    pub fn leave(&self, channel_id: &ChannelId, user_id: &UserId) {
        if let Some(occupants) = self.channels.lock().unwrap().get_mut(channel_id) {
            occupants.retain(|o| &o.user_id != user_id);
        }
    }

    /// Make the next `n` queries fail
    pub fn fail_next(&self, n: u32) {
        self.failures_pending.store(n, Ordering::SeqCst);
    }

    pub fn set_fail_always(&self, fail: bool) {
        *self.fail_always.lock().unwrap() = fail;
    }

    /// Number of queries answered or failed so far
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PresenceSource for MockPresence {
    async fn occupants(&self, channel_id: &ChannelId) -> PresenceResult<Vec<Occupant>> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        if *self.fail_always.lock().unwrap() {
            return Err(PresenceError::Unavailable("Mock presence failure".into()));
        }
        let pending = self.failures_pending.load(Ordering::SeqCst);
        if pending > 0 {
            self.failures_pending.store(pending - 1, Ordering::SeqCst);
            return Err(PresenceError::Unavailable("Mock presence failure".into()));
        }

        Ok(self
            .channels
            .lock()
            .unwrap()
            .get(channel_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Sink that keeps every event it receives
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn payloads(&self) -> Vec<EventPayload> {
        self.events().into_iter().map(|e| e.payload).collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, event: Event) -> PresenceResult<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_join_and_leave() {
        let presence = MockPresence::new();
        let channel = ChannelId::new("5");

        presence.join(&channel, Occupant::new("1", "ada"));
        presence.join(&channel, Occupant::new("2", "lin"));
        presence.join(&channel, Occupant::new("1", "ada"));
        assert_eq!(presence.occupants(&channel).await.unwrap().len(), 2);

        presence.leave(&channel, &UserId::new("1"));
        let occupants = presence.occupants(&channel).await.unwrap();
        assert_eq!(occupants.len(), 1);
        assert_eq!(occupants[0].user_id, UserId::new("2"));
        assert_eq!(presence.query_count(), 2);
    }

    #[tokio::test]
    async fn mock_failures() {
        let presence = MockPresence::new();
        let channel = ChannelId::new("5");

        presence.fail_next(1);
        assert!(presence.occupants(&channel).await.is_err());
        assert!(presence.occupants(&channel).await.is_ok());

        presence.set_fail_always(true);
        assert!(presence.occupants(&channel).await.is_err());
    }

    #[tokio::test]
    async fn recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.notify(Event::new(EventPayload::Shutdown)).await.unwrap();
        sink.notify(Event::new(EventPayload::Shutdown)).await.unwrap();
        assert_eq!(sink.events().len(), 2);
    }
}
