//! Payout settlement.
//!
//! Settling a partner walks its expiry queue from the front. Every tick at
//! or before the current tick is matured; for each subscriber recorded at a
//! matured tick the partner is owed
//!
//! ```text
//! share = fee / split_count(subscriber, tick)    (floor division)
//! ```
//!
//! The remainder of the division is forfeited and stays in escrow. The walk
//! stops at the first unmatured tick.
//!
//! Settlement runs in two phases. [`Ledger::plan_settlement`] computes the
//! payments without touching any record. The plan is then handed to the
//! [`PayoutSink`] as a single batch; only when the sink accepts it is the
//! matured prefix removed from the queue and escrow debited. A refused
//! batch leaves the ledger exactly as it was.
//!
//! [`Ledger::payout_up_to`] caps the number of ticks settled per call so a
//! long backlog can be worked off over several calls; each call resumes at
//! the new queue front.

use serde::{Deserialize, Serialize};
use tessera_types::events::LedgerEvent;
use tessera_types::{contexts, Amount, Identity, ReceiptId, Tick};
use tracing::{debug, info, warn};

use crate::ledger::{CallContext, Ledger};
use crate::payout::{PayoutBatch, PayoutSink};
use crate::{LedgerError, Result};

/// One subscriber's share for one matured tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub member: Identity,
    pub tick: Tick,
    /// Partners the member split the period with.
    pub split_count: u32,
    pub amount: Amount,
}

/// Payments a settlement would make, computed without mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementPlan {
    pub partner: Identity,
    pub destination: Identity,
    /// Matured ticks covered, oldest first.
    pub ticks: Vec<Tick>,
    pub payments: Vec<Payment>,
    pub total: Amount,
}

impl SettlementPlan {
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

/// Outcome of a payout call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub partner: Identity,
    pub destination: Identity,
    pub ticks_settled: Vec<Tick>,
    pub payments: Vec<Payment>,
    pub total: Amount,
    /// Ticks still queued after this call.
    pub remaining_ticks: usize,
    /// Receipt for non-empty settlements.
    pub receipt_id: Option<ReceiptId>,
}

/// Floor share of `fee` for a member split across `split_count` partners.
///
/// # Errors
///
/// - [`LedgerError::CorruptSnapshot`] if `split_count` is zero, which no
///   queued subscriber can have
pub fn share(fee: Amount, split_count: u32) -> Result<Amount> {
    if split_count == 0 {
        return Err(LedgerError::CorruptSnapshot(
            "queued subscriber has a zero split count".to_string(),
        ));
    }
    Ok(fee / Amount::from(split_count))
}

/// Deterministic receipt id for a committed settlement.
pub fn receipt_id(partner: &Identity, sequence: u64, ticks: &[Tick], total: Amount) -> ReceiptId {
    let mut hasher = blake3::Hasher::new_derive_key(contexts::SETTLEMENT_RECEIPT);
    hasher.update(partner.as_bytes());
    hasher.update(&sequence.to_le_bytes());
    hasher.update(&(ticks.len() as u64).to_le_bytes());
    for tick in ticks {
        hasher.update(&tick.to_le_bytes());
    }
    hasher.update(&total.to_le_bytes());
    *hasher.finalize().as_bytes()
}

impl Ledger {
    /// Compute what settling `partner` at `now` would pay, settling at most
    /// `max_ticks` matured ticks when given.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::PartnerDoesNotExist`] if `partner` is not registered
    /// - [`LedgerError::Overflow`] if the total overflows
    pub fn plan_settlement(
        &self,
        partner: &Identity,
        now: Tick,
        max_ticks: Option<usize>,
    ) -> Result<SettlementPlan> {
        let record = self
            .partners
            .get(partner)
            .ok_or(LedgerError::PartnerDoesNotExist)?;
        let fee = self.config.fee;

        let ticks = record.index.matured(now, max_ticks).to_vec();
        let mut payments = Vec::new();
        let mut total: Amount = 0;
        for &tick in &ticks {
            for member in record.index.subscribers_at(tick) {
                let split_count = self.members.split_count(member, tick);
                let amount = share(fee, split_count)?;
                total = total.checked_add(amount).ok_or(LedgerError::Overflow)?;
                payments.push(Payment {
                    member: *member,
                    tick,
                    split_count,
                    amount,
                });
            }
        }

        Ok(SettlementPlan {
            partner: *partner,
            destination: record.payout_destination,
            ticks,
            payments,
            total,
        })
    }

    /// Value `partner` would receive from a payout at `now`.
    pub fn pending_payout(&self, partner: &Identity, now: Tick) -> Result<Amount> {
        Ok(self.plan_settlement(partner, now, None)?.total)
    }

    /// Settle every matured tick of `partner`.
    ///
    /// # Errors
    ///
    /// See [`payout_up_to`](Self::payout_up_to).
    pub fn payout<S: PayoutSink>(
        &mut self,
        ctx: &CallContext,
        partner: &Identity,
        sink: &mut S,
    ) -> Result<SettlementReport> {
        self.payout_up_to(ctx, partner, None, sink)
    }

    /// Settle up to `max_ticks` matured ticks of `partner` (all when `None`).
    ///
    /// With nothing matured the call succeeds, moves no value and does not
    /// invoke the sink.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotAuthorizedOwner`] unless the caller owns `partner`
    /// - [`LedgerError::TransferFailed`] if the sink refuses the batch
    /// - [`LedgerError::Overflow`] if escrow cannot cover the batch
    pub fn payout_up_to<S: PayoutSink>(
        &mut self,
        ctx: &CallContext,
        partner: &Identity,
        max_ticks: Option<usize>,
        sink: &mut S,
    ) -> Result<SettlementReport> {
        self.transact(ctx, "payout", |ledger| {
            if !ledger.partners.is_owner(partner, &ctx.caller) {
                return Err(LedgerError::NotAuthorizedOwner);
            }
            let plan = ledger.plan_settlement(partner, ctx.tick, max_ticks)?;

            if plan.is_empty() {
                let remaining_ticks = ledger
                    .partners
                    .get(partner)
                    .map_or(0, |p| p.index.queue().len());
                debug!(partner = ?partner, tick = ctx.tick, remaining_ticks, "payout: nothing matured");
                return Ok(SettlementReport {
                    partner: plan.partner,
                    destination: plan.destination,
                    ticks_settled: Vec::new(),
                    payments: Vec::new(),
                    total: 0,
                    remaining_ticks,
                    receipt_id: None,
                });
            }

            let escrow = ledger
                .escrow
                .checked_sub(plan.total)
                .ok_or(LedgerError::Overflow)?;
            let sequence = ledger
                .settlements
                .checked_add(1)
                .ok_or(LedgerError::Overflow)?;

            let batch = PayoutBatch {
                destination: plan.destination,
                payments: plan.payments,
            };
            if let Err(e) = sink.disburse(&batch) {
                warn!(partner = ?partner, total = plan.total, error = %e, "payout: batch refused");
                return Err(e.into());
            }

            let record = ledger.partners.existing_mut(partner)?;
            record.index.compact(plan.ticks.len());
            let remaining_ticks = record.index.queue().len();
            ledger.escrow = escrow;
            ledger.settlements = sequence;

            let receipt = receipt_id(partner, sequence, &plan.ticks, plan.total);
            info!(
                partner = ?partner,
                destination = ?plan.destination,
                ticks = plan.ticks.len(),
                payments = batch.payments.len(),
                total = plan.total,
                remaining_ticks,
                "payout settled"
            );
            ledger.events.push(LedgerEvent::Settled {
                partner: *partner,
                destination: plan.destination,
                ticks: plan.ticks.clone(),
                payments: batch.payments.len(),
                total: plan.total,
                receipt_id: receipt,
                tick: ctx.tick,
            });

            Ok(SettlementReport {
                partner: *partner,
                destination: plan.destination,
                ticks_settled: plan.ticks,
                payments: batch.payments,
                total: plan.total,
                remaining_ticks,
                receipt_id: Some(receipt),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::payout::{InMemoryBook, PayoutError};

    const FEE: Amount = 100_000;

    fn id(label: &str) -> Identity {
        Identity::derive(label)
    }

    fn ctx(label: &str, tick: Tick) -> CallContext {
        CallContext::new(id(label), tick)
    }

    fn ledger_with_partners(partners: &[&str]) -> Ledger {
        let mut ledger = Ledger::new(LedgerConfig::new(FEE, 10).expect("config")).expect("ledger");
        for p in partners {
            ledger
                .become_partner(&ctx(p, 0), id(&format!("{p}-wallet")), p)
                .expect("become partner");
        }
        ledger
    }

    /// Sink that refuses every batch and counts attempts.
    #[derive(Default)]
    struct RefusingSink {
        attempts: usize,
    }

    impl PayoutSink for RefusingSink {
        fn disburse(&mut self, _batch: &PayoutBatch) -> std::result::Result<(), PayoutError> {
            self.attempts += 1;
            Err(PayoutError::Rejected("backend offline".to_string()))
        }
    }

    #[test]
    fn test_share_floor_division() {
        assert_eq!(share(100_000, 1).expect("share"), 100_000);
        assert_eq!(share(100_000, 2).expect("share"), 50_000);
        assert_eq!(share(100_000, 3).expect("share"), 33_333);
        assert_eq!(share(2, 3).expect("share"), 0);
        assert!(share(100, 0).is_err());
    }

    #[test]
    fn test_single_member_full_fee() {
        let mut ledger = ledger_with_partners(&["p1"]);
        let mut book = InMemoryBook::new();
        ledger
            .apply_and_subscribe(&ctx("m", 0), &id("p1"), FEE)
            .expect("apply");

        let early = ledger
            .payout(&ctx("p1", 9), &id("p1"), &mut book)
            .expect("early payout");
        assert_eq!(early.total, 0);
        assert!(early.receipt_id.is_none());
        assert_eq!(early.remaining_ticks, 1);
        assert_eq!(book.batches_applied(), 0, "sink not invoked for no-op");

        let report = ledger
            .payout(&ctx("p1", 10), &id("p1"), &mut book)
            .expect("payout");
        assert_eq!(report.total, FEE);
        assert_eq!(report.ticks_settled, vec![10]);
        assert_eq!(report.remaining_ticks, 0);
        assert_eq!(book.balance(&id("p1-wallet")), FEE);
        assert_eq!(ledger.escrow(), 0);
    }

    #[test]
    fn test_split_member_pays_half_to_each() {
        let mut ledger = ledger_with_partners(&["p1", "p2"]);
        let mut book = InMemoryBook::new();
        ledger
            .apply_and_subscribe(&ctx("m", 0), &id("p1"), FEE)
            .expect("apply");
        ledger.subscribe(&ctx("m", 1), &id("p2")).expect("subscribe");

        ledger
            .payout(&ctx("p1", 10), &id("p1"), &mut book)
            .expect("p1 payout");
        ledger
            .payout(&ctx("p2", 10), &id("p2"), &mut book)
            .expect("p2 payout");
        assert_eq!(book.balance(&id("p1-wallet")), 50_000);
        assert_eq!(book.balance(&id("p2-wallet")), 50_000);
        assert_eq!(ledger.escrow(), 0);
    }

    #[test]
    fn test_remainder_forfeited_to_escrow() {
        let mut ledger = ledger_with_partners(&["p1", "p2", "p3"]);
        let mut book = InMemoryBook::new();
        ledger
            .apply_and_subscribe(&ctx("m", 0), &id("p1"), FEE)
            .expect("apply");
        ledger.subscribe(&ctx("m", 0), &id("p2")).expect("p2");
        ledger.subscribe(&ctx("m", 0), &id("p3")).expect("p3");

        for p in ["p1", "p2", "p3"] {
            let report = ledger
                .payout(&ctx(p, 10), &id(p), &mut book)
                .expect("payout");
            assert_eq!(report.total, 33_333);
        }
        assert_eq!(book.total_credited(), 99_999);
        assert_eq!(ledger.escrow(), 1);
    }

    #[test]
    fn test_payout_requires_owner() {
        let mut ledger = ledger_with_partners(&["p1"]);
        let mut book = InMemoryBook::new();
        assert!(matches!(
            ledger.payout(&ctx("mallory", 10), &id("p1"), &mut book),
            Err(LedgerError::NotAuthorizedOwner)
        ));
        assert!(matches!(
            ledger.payout(&ctx("p1", 10), &id("ghost"), &mut book),
            Err(LedgerError::NotAuthorizedOwner)
        ));
    }

    #[test]
    fn test_co_owner_can_settle() {
        let mut ledger = ledger_with_partners(&["p1"]);
        let mut book = InMemoryBook::new();
        ledger
            .add_owner(&ctx("p1", 0), &id("p1"), id("ops"))
            .expect("add owner");
        ledger
            .apply_and_subscribe(&ctx("m", 0), &id("p1"), FEE)
            .expect("apply");
        let report = ledger
            .payout(&ctx("ops", 12), &id("p1"), &mut book)
            .expect("co-owner payout");
        assert_eq!(report.destination, id("p1-wallet"));
        assert_eq!(book.balance(&id("p1-wallet")), FEE);
    }

    #[test]
    fn test_refused_batch_rolls_nothing() {
        let mut ledger = ledger_with_partners(&["p1"]);
        ledger
            .apply_and_subscribe(&ctx("m", 0), &id("p1"), FEE)
            .expect("apply");
        ledger.drain_events();
        let before = ledger.clone();

        let mut sink = RefusingSink::default();
        let err = ledger
            .payout(&ctx("p1", 10), &id("p1"), &mut sink)
            .expect_err("refused");
        assert!(matches!(err, LedgerError::TransferFailed(PayoutError::Rejected(_))));
        assert_eq!(sink.attempts, 1);
        assert_eq!(ledger, before);
        assert!(ledger.drain_events().is_empty());
    }

    #[test]
    fn test_frozen_destination_aborts_then_recovers() {
        let mut ledger = ledger_with_partners(&["p1"]);
        let mut book = InMemoryBook::new();
        ledger
            .apply_and_subscribe(&ctx("m", 0), &id("p1"), FEE)
            .expect("apply");

        book.freeze(id("p1-wallet"));
        assert!(ledger.payout(&ctx("p1", 10), &id("p1"), &mut book).is_err());
        assert_eq!(ledger.pending_payout(&id("p1"), 10).expect("pending"), FEE);

        book.unfreeze(&id("p1-wallet"));
        let report = ledger
            .payout(&ctx("p1", 10), &id("p1"), &mut book)
            .expect("retry");
        assert_eq!(report.total, FEE);
    }

    #[test]
    fn test_second_payout_same_tick_is_noop() {
        let mut ledger = ledger_with_partners(&["p1"]);
        let mut book = InMemoryBook::new();
        ledger
            .apply_and_subscribe(&ctx("m", 0), &id("p1"), FEE)
            .expect("apply");
        ledger
            .payout(&ctx("p1", 10), &id("p1"), &mut book)
            .expect("first");
        let second = ledger
            .payout(&ctx("p1", 10), &id("p1"), &mut book)
            .expect("second");
        assert_eq!(second.total, 0);
        assert_eq!(book.balance(&id("p1-wallet")), FEE);
        assert_eq!(book.batches_applied(), 1);
    }

    #[test]
    fn test_bounded_payout_resumes() {
        let mut ledger = ledger_with_partners(&["p1"]);
        let mut book = InMemoryBook::new();
        for (who, tick) in [("a", 0), ("b", 1), ("c", 2)] {
            ledger
                .apply_and_subscribe(&ctx(who, tick), &id("p1"), FEE)
                .expect("apply");
        }

        let first = ledger
            .payout_up_to(&ctx("p1", 20), &id("p1"), Some(2), &mut book)
            .expect("bounded");
        assert_eq!(first.ticks_settled, vec![10, 11]);
        assert_eq!(first.remaining_ticks, 1);

        let second = ledger
            .payout_up_to(&ctx("p1", 20), &id("p1"), Some(2), &mut book)
            .expect("resume");
        assert_eq!(second.ticks_settled, vec![12]);
        assert_eq!(second.remaining_ticks, 0);
        assert_eq!(book.balance(&id("p1-wallet")), 3 * FEE);
        assert_ne!(first.receipt_id, second.receipt_id);
    }

    #[test]
    fn test_receipt_id_deterministic() {
        let a = receipt_id(&id("p"), 1, &[10, 12], 5);
        assert_eq!(a, receipt_id(&id("p"), 1, &[10, 12], 5));
        assert_ne!(a, receipt_id(&id("p"), 2, &[10, 12], 5));
        assert_ne!(a, receipt_id(&id("q"), 1, &[10, 12], 5));
    }

    #[test]
    fn test_pending_payout_unknown_partner() {
        let ledger = ledger_with_partners(&[]);
        assert!(matches!(
            ledger.pending_payout(&id("ghost"), 0),
            Err(LedgerError::PartnerDoesNotExist)
        ));
    }
}
