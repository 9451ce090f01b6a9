//! Phase-transition events.
//!
//! Every reconciliation pass that changes a filesystem's phase publishes a
//! structured event for audit and external verification.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::FilesystemPhase;

/// One observed phase transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// Filesystem that transitioned.
    pub filesystem: String,
    /// Phase before the pass.
    pub from: FilesystemPhase,
    /// Phase after the pass.
    pub to: FilesystemPhase,
    /// Why the transition happened.
    pub reason: String,
    /// Seconds-since-epoch of the transition.
    pub timestamp_secs: u64,
}

/// Broadcast bus for transition events.
pub struct EventBus {
    sender: broadcast::Sender<TransitionEvent>,
}

impl EventBus {
    /// Create a bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Returns the number of receivers that saw it.
    pub fn publish(&self, event: TransitionEvent) -> usize {
        if self.sender.receiver_count() == 0 {
            return 0;
        }
        let _ = self.sender.send(event);
        self.sender.receiver_count()
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<TransitionEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(from: FilesystemPhase, to: FilesystemPhase) -> TransitionEvent {
        TransitionEvent {
            filesystem: "testfs".to_string(),
            from,
            to,
            reason: "test".to_string(),
            timestamp_secs: 0,
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(16);
        let seen = bus.publish(event(
            FilesystemPhase::Requested,
            FilesystemPhase::ProvisioningPools,
        ));
        assert_eq!(seen, 0);
    }

    #[tokio::test]
    async fn test_subscribe_and_receive() {
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();
        bus.publish(event(
            FilesystemPhase::SchedulingMetadata,
            FilesystemPhase::Active,
        ));
        let received = receiver.recv().await.unwrap();
        assert_eq!(received.filesystem, "testfs");
        assert_eq!(received.to, FilesystemPhase::Active);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        bus.publish(event(FilesystemPhase::Active, FilesystemPhase::Degraded));
        assert_eq!(a.recv().await.unwrap().to, FilesystemPhase::Degraded);
        assert_eq!(b.recv().await.unwrap().to, FilesystemPhase::Degraded);
    }

    #[test]
    fn test_event_serde_roundtrip() {
        let e = event(FilesystemPhase::Deleting, FilesystemPhase::Deleted);
        let json = serde_json::to_string(&e).unwrap();
        let decoded: TransitionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, e);
    }
}
