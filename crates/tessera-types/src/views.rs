//! Read-only views of ledger records handed out to hosts.

use serde::{Deserialize, Serialize};

use crate::{Identity, Tick};

/// Snapshot of a partner record at query time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerSummary {
    pub partner: Identity,
    pub payout_destination: Identity,
    pub display_name: String,
    pub owners: Vec<Identity>,
    /// Ticks with unsettled subscribers, oldest first.
    pub pending_ticks: Vec<Tick>,
    /// Subscriber entries across all pending ticks.
    pub pending_subscribers: usize,
}

/// Snapshot of a member record at query time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub member: Identity,
    pub expiry_tick: Tick,
    pub active: bool,
    /// Partners sharing the current period's fee (0 when inactive).
    pub current_split: u32,
}
