//! Change notifications
//!
//! Writes that callers ask to be announced are published through a
//! [`ChangeNotifier`]. The broadcast notifier fans them out over a tokio
//! broadcast channel; slow subscribers miss messages rather than block
//! writers.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Saved,
}

/// What changed. Bulk operations report a count and leave `ids` empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityChanged {
    pub kind: ChangeKind,
    pub organization_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    pub count: usize,
}

impl EntityChanged {
    pub fn added(organization_id: impl Into<String>, ids: Vec<String>) -> Self {
        Self {
            kind: ChangeKind::Added,
            organization_id: organization_id.into(),
            stack_id: None,
            count: ids.len(),
            ids,
        }
    }

    pub fn stack_saved(
        organization_id: impl Into<String>,
        stack_id: impl Into<String>,
        count: usize,
    ) -> Self {
        Self {
            kind: ChangeKind::Saved,
            organization_id: organization_id.into(),
            stack_id: Some(stack_id.into()),
            ids: Vec::new(),
            count,
        }
    }
}

/// A published change with its position in the stream
#[derive(Debug, Clone, Serialize)]
pub struct ChangeMessage {
    #[serde(flatten)]
    pub change: EntityChanged,
    pub sequence_id: u64,
    pub timestamp: i64,
}

pub trait ChangeNotifier: Send + Sync {
    fn notify(&self, change: EntityChanged);
}

/// Drops every change
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl ChangeNotifier for NullNotifier {
    fn notify(&self, _change: EntityChanged) {}
}

pub struct BroadcastNotifier {
    tx: broadcast::Sender<ChangeMessage>,
    sequence_counter: AtomicU64,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            sequence_counter: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeMessage> {
        self.tx.subscribe()
    }

    pub fn current_sequence_id(&self) -> u64 {
        self.sequence_counter.load(Ordering::SeqCst)
    }
}

impl ChangeNotifier for BroadcastNotifier {
    fn notify(&self, change: EntityChanged) {
        let sequence_id = self.sequence_counter.fetch_add(1, Ordering::SeqCst);
        let message = ChangeMessage {
            change,
            sequence_id,
            timestamp: chrono::Utc::now().timestamp(),
        };
        // No receivers is not an error.
        let _ = self.tx.send(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_increments_sequence() {
        let notifier = BroadcastNotifier::new(16);
        assert_eq!(notifier.current_sequence_id(), 0);
        notifier.notify(EntityChanged::added("org", vec!["a".into()]));
        assert_eq!(notifier.current_sequence_id(), 1);
    }

    #[test]
    fn test_subscribers_receive_changes() {
        let notifier = BroadcastNotifier::new(16);
        let mut rx = notifier.subscribe();

        notifier.notify(EntityChanged::stack_saved("org", "stack", 42));

        let message = rx.try_recv().unwrap();
        assert_eq!(message.sequence_id, 0);
        assert_eq!(message.change.kind, ChangeKind::Saved);
        assert_eq!(message.change.count, 42);

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["kind"], "saved");
        assert_eq!(json["stack_id"], "stack");
        assert!(json.get("ids").is_none());
    }
}
