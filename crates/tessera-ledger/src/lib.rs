//! # tessera-ledger
//!
//! Shared membership ledger. Members pay one recurring fee for a
//! time-boxed membership and split it across any number of partners; each
//! partner later settles a fee share per subscriber, proportional to how
//! many partners that subscriber split the period with.
//!
//! Every operation runs to completion against the whole ledger and either
//! commits all of its mutations or none. The caller identity and current
//! tick are passed explicitly through [`ledger::CallContext`].
//!
//! ## Modules
//!
//! - [`config`]: Fee and membership length
//! - [`owners`]: Owner sets gating partner administration
//! - [`index`]: Per-partner expiry queue and tick-keyed subscriber sets
//! - [`partner`]: Partner directory
//! - [`member`]: Member directory
//! - [`enrollment`]: Membership start and subscriptions
//! - [`settlement`]: Payout planning, disbursement and queue compaction
//! - [`payout`]: Value-transfer capability
//! - [`ledger`]: The ledger facade, clock guard and snapshots

pub mod config;
pub mod enrollment;
pub mod index;
pub mod ledger;
pub mod member;
pub mod owners;
pub mod partner;
pub mod payout;
pub mod settlement;

pub use config::LedgerConfig;
pub use ledger::{CallContext, Ledger};
pub use payout::{InMemoryBook, PayoutBatch, PayoutError, PayoutSink};
pub use settlement::{Payment, SettlementReport};

use tessera_types::{Amount, Tick};

/// Error types for ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The caller already has a partner record.
    #[error("caller is already a partner")]
    AlreadyPartner,

    /// The caller is not in the partner's owner set.
    #[error("caller is not an owner of this partner")]
    NotAuthorizedOwner,

    /// The caller's membership is still active.
    #[error("caller is already an active member")]
    AlreadyMember,

    /// The payment does not cover the membership fee.
    #[error("payment {payment} is below the membership fee {fee}")]
    PaymentTooLow {
        /// Amount offered.
        payment: Amount,
        /// Configured fee.
        fee: Amount,
    },

    /// The caller has no active membership.
    #[error("caller is not an active member")]
    NotAMember,

    /// The caller already subscribed to this partner for the current period.
    #[error("caller is already subscribed to this partner for the current period")]
    AlreadySubscribed,

    /// No partner record exists for the identity.
    #[error("partner does not exist")]
    PartnerDoesNotExist,

    /// The caller's period has reached its expiry tick and may already be
    /// settling; it accepts no further subscriptions.
    #[error("membership period ending at tick {expiry_tick} is closed to new subscriptions")]
    PeriodClosed {
        /// Expiry tick of the closed period.
        expiry_tick: Tick,
    },

    /// The payout sink refused the settlement batch.
    #[error("payout transfer failed: {0}")]
    TransferFailed(#[from] PayoutError),

    /// A mutating call presented a tick below one already committed.
    #[error("clock regressed: last committed tick {last}, presented {now}")]
    ClockRegressed {
        /// Highest tick at which a mutation committed.
        last: Tick,
        /// Tick presented by the caller.
        now: Tick,
    },

    /// The partner already settled at or past this expiry tick.
    #[error("expiry tick {tick} is not after settled tick {settled_through}")]
    QueueOrder {
        /// Tick being queued.
        tick: Tick,
        /// Highest tick the partner has settled.
        settled_through: Tick,
    },

    /// Arithmetic overflow in tick or value accounting.
    #[error("arithmetic overflow in ledger accounting")]
    Overflow,

    /// Configuration rejected at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A loaded snapshot violates a ledger invariant.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
