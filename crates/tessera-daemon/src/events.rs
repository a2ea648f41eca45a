//! Event emission system.
//!
//! Ledger events drained after each committed operation are pushed to
//! `watch_events` subscribers as JSON-RPC notifications. Each subscriber has
//! an independent buffer; slow subscribers lose the oldest events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tessera_types::events::LedgerEvent;
use tessera_types::Identity;
use tokio::sync::broadcast;

/// A ledger event stamped with its bus sequence number.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Monotonic per-process sequence, starting at 1.
    pub sequence: u64,
    #[serde(flatten)]
    pub event: LedgerEvent,
}

/// Filter for event subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Only events about these partners. Events without a partner pass.
    #[serde(default)]
    pub partners: Option<Vec<Identity>>,
    /// Only these event names (e.g. "Settled").
    #[serde(default)]
    pub event_types: Option<Vec<String>>,
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: LedgerEvent) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(EventEnvelope { sequence, event });
    }

    /// Emit a batch in order.
    pub fn emit_all(&self, events: Vec<LedgerEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    /// Subscribe to events. Returns a receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Get the current sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl EventFilter {
    /// Check if an event matches this filter.
    pub fn matches(&self, event: &LedgerEvent) -> bool {
        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.name()) {
                return false;
            }
        }

        if let Some(ref partners) = self.partners {
            if let Some(partner) = event_partner(event) {
                if !partners.contains(partner) {
                    return false;
                }
            }
        }

        true
    }
}

/// Partner an event concerns, if any.
fn event_partner(event: &LedgerEvent) -> Option<&Identity> {
    match event {
        LedgerEvent::PartnerRegistered { partner, .. }
        | LedgerEvent::PartnerUpdated { partner, .. }
        | LedgerEvent::OwnerAdded { partner, .. }
        | LedgerEvent::OwnerRemoved { partner, .. }
        | LedgerEvent::PartnerLocked { partner, .. }
        | LedgerEvent::Subscribed { partner, .. }
        | LedgerEvent::Settled { partner, .. } => Some(partner),
        LedgerEvent::MembershipStarted { .. } => None,
    }
}
