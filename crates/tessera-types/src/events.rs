//! Ledger events.
//!
//! The ledger buffers one event per committed state change; hosts drain the
//! buffer after each operation and forward it to their subscribers. Failed
//! operations never produce events.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{Amount, Identity, ReceiptId, Tick};

/// A committed ledger state change.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    PartnerRegistered {
        partner: Identity,
        payout_destination: Identity,
        display_name: String,
        tick: Tick,
    },
    PartnerUpdated {
        partner: Identity,
        payout_destination: Identity,
        display_name: String,
        tick: Tick,
    },
    OwnerAdded {
        partner: Identity,
        owner: Identity,
        tick: Tick,
    },
    OwnerRemoved {
        partner: Identity,
        owner: Identity,
        tick: Tick,
    },
    /// The partner's owner set became empty; administrative operations on it
    /// can no longer succeed.
    PartnerLocked {
        partner: Identity,
        tick: Tick,
    },
    MembershipStarted {
        member: Identity,
        expiry_tick: Tick,
        payment: Amount,
        tick: Tick,
    },
    Subscribed {
        member: Identity,
        partner: Identity,
        expiry_tick: Tick,
        /// Number of partners the member now splits this period with.
        split_count: u32,
        tick: Tick,
    },
    Settled {
        partner: Identity,
        destination: Identity,
        ticks: Vec<Tick>,
        payments: usize,
        total: Amount,
        #[serde_as(as = "serde_with::hex::Hex")]
        receipt_id: ReceiptId,
        tick: Tick,
    },
}

impl LedgerEvent {
    /// Stable event name used by hosts for routing and filtering.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PartnerRegistered { .. } => "PartnerRegistered",
            Self::PartnerUpdated { .. } => "PartnerUpdated",
            Self::OwnerAdded { .. } => "OwnerAdded",
            Self::OwnerRemoved { .. } => "OwnerRemoved",
            Self::PartnerLocked { .. } => "PartnerLocked",
            Self::MembershipStarted { .. } => "MembershipStarted",
            Self::Subscribed { .. } => "Subscribed",
            Self::Settled { .. } => "Settled",
        }
    }

    /// Tick at which the change committed.
    pub fn tick(&self) -> Tick {
        match self {
            Self::PartnerRegistered { tick, .. }
            | Self::PartnerUpdated { tick, .. }
            | Self::OwnerAdded { tick, .. }
            | Self::OwnerRemoved { tick, .. }
            | Self::PartnerLocked { tick, .. }
            | Self::MembershipStarted { tick, .. }
            | Self::Subscribed { tick, .. }
            | Self::Settled { tick, .. } => *tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_serialization() {
        let event = LedgerEvent::OwnerAdded {
            partner: Identity::derive("p"),
            owner: Identity::derive("o"),
            tick: 3,
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["type"], "owner_added");
        assert_eq!(value["tick"], 3);
        let back: LedgerEvent = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, event);
    }

    #[test]
    fn test_settled_receipt_is_hex() {
        let event = LedgerEvent::Settled {
            partner: Identity::derive("p"),
            destination: Identity::derive("d"),
            ticks: vec![10, 12],
            payments: 3,
            total: 150_000,
            receipt_id: [0x0F; 32],
            tick: 14,
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["receipt_id"], "0f".repeat(32));
        assert_eq!(event.name(), "Settled");
        assert_eq!(event.tick(), 14);
    }
}
