//! # tessera-types
//!
//! Shared domain types used across the Tessera workspace: identities,
//! ticks, amounts, ledger events and the read-only views handed to hosts.

pub mod events;
pub mod identity;
pub mod views;

pub use identity::{Identity, IdentityParseError};

/// Discrete, externally advanced time step (e.g. a block height).
pub type Tick = u64;

/// Value in the smallest transferable unit.
pub type Amount = u64;

/// Deterministic settlement receipt identifier.
pub type ReceiptId = [u8; 32];

/// Identity length in bytes.
pub const IDENTITY_LEN: usize = 32;

/// Registered BLAKE3 derive-key contexts.
pub mod contexts {
    /// Deriving an identity from a human-readable label.
    pub const IDENTITY_LABEL: &str = "Tessera v1 identity-label";
    /// Settlement receipt identifiers.
    pub const SETTLEMENT_RECEIPT: &str = "Tessera v1 settlement-receipt";
}
