//! Value-transfer capability.
//!
//! Settlement never moves value itself. It hands one [`PayoutBatch`] per
//! call to a [`PayoutSink`], which must apply the whole batch or none of
//! it. A rejected batch aborts the settlement with no ledger mutation.
//!
//! [`InMemoryBook`] is a balance book implementing the sink; hosts without
//! a real payment backend use it directly, and tests use its frozen-account
//! switch to exercise the abort path.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tessera_types::{Amount, Identity};

use crate::settlement::Payment;

/// Errors a sink reports when refusing a batch.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum PayoutError {
    /// The backend cannot fund the batch.
    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds {
        /// Batch total.
        required: Amount,
        /// Funds available to the backend.
        available: Amount,
    },

    /// The destination account may not receive value.
    #[error("destination account {0} is frozen")]
    AccountFrozen(Identity),

    /// Any other refusal.
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// All shares settled by one payout call, bound for one destination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutBatch {
    pub destination: Identity,
    pub payments: Vec<Payment>,
}

impl PayoutBatch {
    /// Sum of all payments, or `None` on overflow.
    pub fn total(&self) -> Option<Amount> {
        self.payments
            .iter()
            .try_fold(0u64, |acc, p| acc.checked_add(p.amount))
    }
}

/// A backend able to apply a payout batch atomically.
pub trait PayoutSink {
    /// Apply every payment in `batch`, or none of them.
    fn disburse(&mut self, batch: &PayoutBatch) -> Result<(), PayoutError>;
}

impl<S: PayoutSink + ?Sized> PayoutSink for &mut S {
    fn disburse(&mut self, batch: &PayoutBatch) -> Result<(), PayoutError> {
        (**self).disburse(batch)
    }
}

/// In-memory balance book.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryBook {
    balances: BTreeMap<Identity, Amount>,
    frozen: BTreeSet<Identity>,
    batches_applied: u64,
}

impl InMemoryBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance credited to `account` so far.
    pub fn balance(&self, account: &Identity) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Sum of all balances.
    pub fn total_credited(&self) -> Amount {
        self.balances.values().fold(0, |acc, b| acc.saturating_add(*b))
    }

    /// Number of batches accepted.
    pub fn batches_applied(&self) -> u64 {
        self.batches_applied
    }

    /// Refuse all further batches bound for `account`.
    pub fn freeze(&mut self, account: Identity) {
        tracing::warn!(account = %account, "payout book: account frozen");
        self.frozen.insert(account);
    }

    /// Lift a freeze placed by [`freeze`](Self::freeze).
    pub fn unfreeze(&mut self, account: &Identity) {
        self.frozen.remove(account);
    }
}

impl PayoutSink for InMemoryBook {
    fn disburse(&mut self, batch: &PayoutBatch) -> Result<(), PayoutError> {
        if self.frozen.contains(&batch.destination) {
            return Err(PayoutError::AccountFrozen(batch.destination));
        }
        let total = batch
            .total()
            .ok_or_else(|| PayoutError::Rejected("batch total overflows".to_string()))?;
        let new_balance = self
            .balance(&batch.destination)
            .checked_add(total)
            .ok_or_else(|| PayoutError::Rejected("destination balance overflows".to_string()))?;

        self.balances.insert(batch.destination, new_balance);
        self.batches_applied += 1;

        tracing::debug!(
            destination = %batch.destination,
            payments = batch.payments.len(),
            total,
            "payout book: batch applied"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(destination: &str, amounts: &[Amount]) -> PayoutBatch {
        PayoutBatch {
            destination: Identity::derive(destination),
            payments: amounts
                .iter()
                .enumerate()
                .map(|(i, &amount)| Payment {
                    member: Identity::derive(&format!("member-{i}")),
                    tick: 10,
                    split_count: 1,
                    amount,
                })
                .collect(),
        }
    }

    #[test]
    fn test_disburse_credits_destination() {
        let mut book = InMemoryBook::new();
        book.disburse(&batch("wallet", &[50_000, 50_000]))
            .expect("disburse");
        assert_eq!(book.balance(&Identity::derive("wallet")), 100_000);
        assert_eq!(book.batches_applied(), 1);
        assert_eq!(book.total_credited(), 100_000);
    }

    #[test]
    fn test_frozen_account_rejects_whole_batch() {
        let mut book = InMemoryBook::new();
        book.freeze(Identity::derive("wallet"));
        let err = book
            .disburse(&batch("wallet", &[1, 2, 3]))
            .expect_err("frozen");
        assert_eq!(err, PayoutError::AccountFrozen(Identity::derive("wallet")));
        assert_eq!(book.balance(&Identity::derive("wallet")), 0);
        assert_eq!(book.batches_applied(), 0);

        book.unfreeze(&Identity::derive("wallet"));
        book.disburse(&batch("wallet", &[1, 2, 3])).expect("unfrozen");
        assert_eq!(book.balance(&Identity::derive("wallet")), 6);
    }

    #[test]
    fn test_overflow_rejected_without_credit() {
        let mut book = InMemoryBook::new();
        book.disburse(&batch("wallet", &[u64::MAX])).expect("max");
        assert!(matches!(
            book.disburse(&batch("wallet", &[1])),
            Err(PayoutError::Rejected(_))
        ));
        assert_eq!(book.balance(&Identity::derive("wallet")), u64::MAX);
        assert!(batch("x", &[u64::MAX, 1]).total().is_none());
    }

    #[test]
    fn test_sink_through_mut_reference() {
        fn pay<S: PayoutSink>(mut sink: S) -> Result<(), PayoutError> {
            sink.disburse(&batch("wallet", &[7]))
        }
        let mut book = InMemoryBook::new();
        pay(&mut book).expect("via &mut");
        assert_eq!(book.balance(&Identity::derive("wallet")), 7);
    }
}
