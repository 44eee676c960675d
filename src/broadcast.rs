// 📡 Broadcast Channel - ephemeral fan-out of ledger events
//
// Transport-agnostic: a transport registers a Listener on connect,
// removes it on disconnect, and receives serialized events via send().
//
// Every listener gets every event; filtering by relevance happens on the
// client. Delivery is best-effort: a listener that is gone at broadcast
// time misses the event and catches up from its durable notifications.

use crate::error::LedgerResult;
use crate::identity::StableId;
use crate::views::{ExpenseView, SplitView};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info};

// ============================================================================
// EVENTS
// ============================================================================

/// The only two event kinds the ledger emits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    ExpenseAdded {
        expense: ExpenseView,
        #[serde(rename = "groupId")]
        group_id: Option<StableId>,
    },
    PaymentSettled {
        split: SplitView,
    },
}

impl LedgerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::ExpenseAdded { .. } => "expense_added",
            LedgerEvent::PaymentSettled { .. } => "payment_settled",
        }
    }
}

// ============================================================================
// LISTENERS
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("listener disconnected")]
    Disconnected,

    #[error("transport error: {0}")]
    Transport(String),
}

/// One connected real-time client, as seen by the transport
pub trait Listener: Send + Sync {
    fn send(&self, payload: &str) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

// ============================================================================
// BROADCAST CHANNEL
// ============================================================================

#[derive(Default)]
pub struct BroadcastChannel {
    listeners: RwLock<HashMap<ListenerId, Arc<dyn Listener>>>,
    next_id: AtomicU64,
    events_broadcast: AtomicU64,
}

impl BroadcastChannel {
    pub fn new() -> Self {
        Self::default()
    }

    // Registry updates are single inserts/removes, so a poisoned lock is still consistent.
    fn listeners(&self) -> RwLockReadGuard<'_, HashMap<ListenerId, Arc<dyn Listener>>> {
        self.listeners.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn listeners_mut(&self) -> RwLockWriteGuard<'_, HashMap<ListenerId, Arc<dyn Listener>>> {
        self.listeners.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// onConnect hook
    pub fn connect(&self, listener: Arc<dyn Listener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let total = {
            let mut listeners = self.listeners_mut();
            listeners.insert(id, listener);
            listeners.len()
        };
        info!(listener = id.0, listeners = total, "Listener connected");
        id
    }

    /// onDisconnect hook; false when the listener was already gone
    pub fn disconnect(&self, id: ListenerId) -> bool {
        let removed = self.listeners_mut().remove(&id).is_some();
        if removed {
            info!(listener = id.0, "Listener disconnected");
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }

    pub fn events_broadcast(&self) -> u64 {
        self.events_broadcast.load(Ordering::Relaxed)
    }

    /// Push an event to every connected listener
    ///
    /// Iterates over a snapshot, so connects and disconnects during the
    /// pass are safe. Listeners whose send fails are dropped afterwards.
    /// Returns how many listeners accepted the event.
    pub fn broadcast(&self, event: &LedgerEvent) -> LedgerResult<usize> {
        let payload = serde_json::to_string(event)?;
        self.events_broadcast.fetch_add(1, Ordering::Relaxed);

        let snapshot: Vec<(ListenerId, Arc<dyn Listener>)> = self
            .listeners()
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, listener) in snapshot {
            match listener.send(&payload) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(listener = id.0, error = %e, "Dropping event for unreachable listener");
                    dead.push(id);
                }
            }
        }

        if !dead.is_empty() {
            let mut listeners = self.listeners_mut();
            for id in &dead {
                listeners.remove(id);
            }
        }

        debug!(
            event = event.kind(),
            delivered,
            pruned = dead.len(),
            "Event broadcast"
        );
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ClosedListener, RecordingListener};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::thread;

    fn settled_event() -> LedgerEvent {
        LedgerEvent::PaymentSettled {
            split: SplitView {
                id: StableId(7),
                expense_id: StableId(5),
                member_id: StableId(2),
                amount: dec!(10.00),
                settled: true,
                settled_at: Some(Utc::now()),
            },
        }
    }

    #[test]
    fn test_broadcast_reaches_every_listener() {
        let channel = BroadcastChannel::new();
        let first = Arc::new(RecordingListener::default());
        let second = Arc::new(RecordingListener::default());
        channel.connect(first.clone());
        channel.connect(second.clone());

        let delivered = channel.broadcast(&settled_event()).unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(first.events().len(), 1);
        assert_eq!(second.events()[0]["type"], "payment_settled");
        assert_eq!(second.events()[0]["split"]["amount"], "10.00");
        assert_eq!(channel.events_broadcast(), 1);
    }

    #[test]
    fn test_broadcast_without_listeners_is_not_an_error() {
        let channel = BroadcastChannel::new();
        assert_eq!(channel.broadcast(&settled_event()).unwrap(), 0);
    }

    #[test]
    fn test_disconnected_listener_misses_events() {
        let channel = BroadcastChannel::new();
        let listener = Arc::new(RecordingListener::default());
        let id = channel.connect(listener.clone());

        assert!(channel.disconnect(id));
        assert!(!channel.disconnect(id));
        channel.broadcast(&settled_event()).unwrap();

        assert!(listener.events().is_empty());
        assert_eq!(channel.listener_count(), 0);
    }

    #[test]
    fn test_failing_listener_is_pruned_silently() {
        let channel = BroadcastChannel::new();
        let healthy = Arc::new(RecordingListener::default());
        channel.connect(Arc::new(ClosedListener));
        channel.connect(healthy.clone());

        let delivered = channel.broadcast(&settled_event()).unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(healthy.events().len(), 1);
        assert_eq!(channel.listener_count(), 1);
    }

    #[test]
    fn test_expense_added_wire_shape() {
        let event = LedgerEvent::ExpenseAdded {
            expense: ExpenseView {
                id: StableId(5),
                amount: dec!(30.00),
                description: "Dinner".to_string(),
                category_id: StableId(4),
                payer_id: StableId(1),
                group_id: Some(StableId(3)),
                currency: "USD".to_string(),
                created_at: Utc::now(),
            },
            group_id: Some(StableId(3)),
        };

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "expense_added");
        assert_eq!(json["groupId"], 3);
        assert_eq!(json["expense"]["amount"], "30.00");
    }

    #[test]
    fn test_connect_during_broadcast_is_safe() {
        let channel = Arc::new(BroadcastChannel::new());
        let event = settled_event();

        let churn = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                for _ in 0..500 {
                    let id = channel.connect(Arc::new(RecordingListener::default()));
                    channel.disconnect(id);
                }
            })
        };
        let steady = Arc::new(RecordingListener::default());
        channel.connect(steady.clone());

        for _ in 0..200 {
            channel.broadcast(&event).unwrap();
        }
        churn.join().unwrap();

        assert_eq!(steady.events().len(), 200);
        assert_eq!(channel.listener_count(), 1);
    }
}
