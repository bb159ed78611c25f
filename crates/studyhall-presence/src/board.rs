//! Gateway-fed presence snapshot and channel-backed notification sink

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use studyhall_api::{Event, Occupant};
use studyhall_util::ChannelId;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{NotificationSink, PresenceError, PresenceResult, PresenceSource};

/// Latest occupant list per channel, as pushed by the chat gateway
#[derive(Debug, Default)]
pub struct PresenceBoard {
    channels: RwLock<HashMap<ChannelId, Vec<Occupant>>>,
}

impl PresenceBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a channel's occupants. Repeated members keep their first entry.
    /// Returns the new occupant count.
    pub fn update(&self, channel_id: ChannelId, mut occupants: Vec<Occupant>) -> PresenceResult<usize> {
        let mut seen = HashSet::new();
        occupants.retain(|o| seen.insert(o.user_id.clone()));
        let count = occupants.len();
        let mut channels = self
            .channels
            .write()
            .map_err(|_| PresenceError::Internal("presence board lock poisoned".into()))?;

        if occupants.is_empty() {
            channels.remove(&channel_id);
        } else {
            channels.insert(channel_id.clone(), occupants);
        }

        debug!(channel_id = %channel_id, occupants = count, "Presence updated");
        Ok(count)
    }

    /// Number of channels with at least one occupant
    pub fn channel_count(&self) -> usize {
        self.channels.read().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PresenceSource for PresenceBoard {
    async fn occupants(&self, channel_id: &ChannelId) -> PresenceResult<Vec<Occupant>> {
        let channels = self
            .channels
            .read()
            .map_err(|_| PresenceError::Internal("presence board lock poisoned".into()))?;
        Ok(channels.get(channel_id).cloned().unwrap_or_default())
    }

    fn is_healthy(&self) -> bool {
        self.channels.read().is_ok()
    }
}

/// Sink that forwards events into an mpsc channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn notify(&self, event: Event) -> PresenceResult<()> {
        self.tx.send(event).map_err(|_| PresenceError::SinkClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studyhall_api::EventPayload;

    #[tokio::test]
    async fn board_reports_latest_snapshot() {
        let board = PresenceBoard::new();
        let channel = ChannelId::new("10");

        assert!(board.occupants(&channel).await.unwrap().is_empty());

        board
            .update(
                channel.clone(),
                vec![Occupant::new("1", "ada"), Occupant::new("2", "lin")],
            )
            .unwrap();
        assert_eq!(board.occupants(&channel).await.unwrap().len(), 2);
        assert_eq!(board.channel_count(), 1);

        board.update(channel.clone(), vec![Occupant::new("2", "lin")]).unwrap();
        let occupants = board.occupants(&channel).await.unwrap();
        assert_eq!(occupants.len(), 1);
        assert_eq!(occupants[0].username, "lin");

        board.update(channel.clone(), vec![]).unwrap();
        assert_eq!(board.channel_count(), 0);
    }

    #[tokio::test]
    async fn board_keeps_one_entry_per_member() {
        let board = PresenceBoard::new();
        let channel = ChannelId::new("10");

        let count = board
            .update(
                channel.clone(),
                vec![
                    Occupant::new("1", "ada").with_organization("VTK"),
                    Occupant::new("1", "ada"),
                    Occupant::new("2", "lin"),
                ],
            )
            .unwrap();
        assert_eq!(count, 2);

        let occupants = board.occupants(&channel).await.unwrap();
        assert_eq!(occupants.len(), 2);
        assert_eq!(occupants[0].organization.as_deref(), Some("VTK"));
    }

    #[tokio::test]
    async fn channel_sink_forwards_and_reports_closed() {
        let (sink, mut rx) = ChannelSink::new();

        sink.notify(Event::new(EventPayload::Shutdown)).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(event.payload, EventPayload::Shutdown));

        drop(rx);
        let result = sink.notify(Event::new(EventPayload::Shutdown)).await;
        assert!(matches!(result, Err(PresenceError::SinkClosed)));
    }
}
