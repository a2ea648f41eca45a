//! Membership start and subscriptions.
//!
//! `apply_and_subscribe` opens a new period of `membership_length` ticks
//! and attaches the member to its first partner; `subscribe` attaches an
//! active member to further partners for the same period. Every attached
//! partner later settles `fee / split_count` for the member, where
//! `split_count` is the number of partners the member attached to in that
//! period.
//!
//! A period accepts subscriptions only strictly before its expiry tick.
//! At the expiry tick the member is still active but the period is already
//! eligible for settlement, and a late subscription would change the split
//! count under a partner that has already been paid.

use tessera_types::events::LedgerEvent;
use tessera_types::{Amount, Identity, Tick};
use tracing::info;

use crate::ledger::{CallContext, Ledger};
use crate::{LedgerError, Result};

impl Ledger {
    /// Start (or renew) the caller's membership and subscribe to `partner`.
    ///
    /// The whole `payment` is taken into escrow; anything above the fee is
    /// retained. Returns the new expiry tick.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AlreadyMember`] if the caller is still active
    /// - [`LedgerError::PaymentTooLow`] if `payment < fee`
    /// - [`LedgerError::PartnerDoesNotExist`] if `partner` is not registered
    /// - [`LedgerError::Overflow`] if the expiry tick or escrow overflows
    pub fn apply_and_subscribe(
        &mut self,
        ctx: &CallContext,
        partner: &Identity,
        payment: Amount,
    ) -> Result<Tick> {
        self.transact(ctx, "apply_and_subscribe", |ledger| {
            if ledger.members.is_active(&ctx.caller, ctx.tick) {
                return Err(LedgerError::AlreadyMember);
            }
            let fee = ledger.config.fee;
            if payment < fee {
                return Err(LedgerError::PaymentTooLow { payment, fee });
            }
            let expiry_tick = ctx
                .tick
                .checked_add(ledger.config.membership_length)
                .ok_or(LedgerError::Overflow)?;
            let escrow = ledger
                .escrow
                .checked_add(payment)
                .ok_or(LedgerError::Overflow)?;
            ledger.check_subscription(ctx, partner, expiry_tick)?;

            ledger.members.start_period(ctx.caller, expiry_tick);
            ledger.escrow = escrow;
            info!(
                member = ?ctx.caller,
                expiry_tick,
                payment,
                "membership started"
            );
            ledger.events.push(LedgerEvent::MembershipStarted {
                member: ctx.caller,
                expiry_tick,
                payment,
                tick: ctx.tick,
            });

            ledger.commit_subscription(ctx, partner, expiry_tick)?;
            Ok(expiry_tick)
        })
    }

    /// Subscribe the active caller to `partner` for the current period.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotAMember`] if the caller is not active
    /// - [`LedgerError::PartnerDoesNotExist`] if `partner` is not registered
    /// - [`LedgerError::AlreadySubscribed`] if already subscribed this period
    /// - [`LedgerError::PeriodClosed`] if the current tick is the expiry tick
    pub fn subscribe(&mut self, ctx: &CallContext, partner: &Identity) -> Result<()> {
        self.transact(ctx, "subscribe", |ledger| {
            let expiry_tick = ledger.members.active(&ctx.caller, ctx.tick)?.expiry_tick;
            ledger.check_subscription(ctx, partner, expiry_tick)?;
            ledger.commit_subscription(ctx, partner, expiry_tick)
        })
    }

    /// Whether `identity` is active at `now` and subscribed to `partner`
    /// for its current period.
    ///
    /// Subscriptions already settled at the expiry tick are no longer
    /// reported.
    pub fn is_subscribed(&self, identity: &Identity, partner: &Identity, now: Tick) -> bool {
        let Ok(member) = self.members.active(identity, now) else {
            return false;
        };
        self.partners
            .get(partner)
            .is_some_and(|p| p.index.contains(member.expiry_tick, identity))
    }

    /// Validate a subscription of the caller to `partner` at `expiry_tick`.
    fn check_subscription(
        &self,
        ctx: &CallContext,
        partner: &Identity,
        expiry_tick: Tick,
    ) -> Result<()> {
        let record = self
            .partners
            .get(partner)
            .ok_or(LedgerError::PartnerDoesNotExist)?;
        if record.index.contains(expiry_tick, &ctx.caller) {
            return Err(LedgerError::AlreadySubscribed);
        }
        if expiry_tick <= ctx.tick {
            return Err(LedgerError::PeriodClosed { expiry_tick });
        }
        record.index.check_insert(expiry_tick, &ctx.caller)?;
        self.members
            .split_count(&ctx.caller, expiry_tick)
            .checked_add(1)
            .ok_or(LedgerError::Overflow)?;
        Ok(())
    }

    /// Apply a subscription validated by [`check_subscription`](Self::check_subscription).
    fn commit_subscription(
        &mut self,
        ctx: &CallContext,
        partner: &Identity,
        expiry_tick: Tick,
    ) -> Result<()> {
        let queued = self
            .partners
            .existing_mut(partner)?
            .index
            .insert(expiry_tick, ctx.caller)?;
        let split_count = self
            .members
            .active_mut(&ctx.caller, ctx.tick)?
            .record_subscription()?;

        info!(
            member = ?ctx.caller,
            partner = ?partner,
            expiry_tick,
            split_count,
            queued,
            "subscribed"
        );
        self.events.push(LedgerEvent::Subscribed {
            member: ctx.caller,
            partner: *partner,
            expiry_tick,
            split_count,
            tick: ctx.tick,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;

    const FEE: Amount = 100_000;
    const LENGTH: Tick = 10;

    fn id(label: &str) -> Identity {
        Identity::derive(label)
    }

    fn ctx(label: &str, tick: Tick) -> CallContext {
        CallContext::new(id(label), tick)
    }

    fn ledger_with_partners(partners: &[&str]) -> Ledger {
        let mut ledger =
            Ledger::new(LedgerConfig::new(FEE, LENGTH).expect("config")).expect("ledger");
        for p in partners {
            ledger
                .become_partner(&ctx(p, 0), id(&format!("{p}-wallet")), p)
                .expect("become partner");
        }
        ledger.drain_events();
        ledger
    }

    #[test]
    fn test_apply_sets_expiry_and_subscribes() {
        let mut ledger = ledger_with_partners(&["p1"]);
        let expiry = ledger
            .apply_and_subscribe(&ctx("m", 0), &id("p1"), FEE)
            .expect("apply");
        assert_eq!(expiry, 10);
        assert!(ledger.is_member(&id("m"), 0));
        assert!(ledger.is_member(&id("m"), 10));
        assert!(!ledger.is_member(&id("m"), 11));
        assert!(ledger.is_subscribed(&id("m"), &id("p1"), 5));
        assert_eq!(ledger.escrow(), FEE);

        let names: Vec<_> = ledger.drain_events().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["MembershipStarted", "Subscribed"]);
    }

    #[test]
    fn test_apply_while_active_rejected() {
        let mut ledger = ledger_with_partners(&["p1"]);
        ledger
            .apply_and_subscribe(&ctx("m", 0), &id("p1"), FEE)
            .expect("apply");
        assert!(matches!(
            ledger.apply_and_subscribe(&ctx("m", 10), &id("p1"), FEE),
            Err(LedgerError::AlreadyMember)
        ));
    }

    #[test]
    fn test_apply_after_expiry_resets_period() {
        let mut ledger = ledger_with_partners(&["p1"]);
        ledger
            .apply_and_subscribe(&ctx("m", 0), &id("p1"), FEE)
            .expect("apply");
        let expiry = ledger
            .apply_and_subscribe(&ctx("m", 11), &id("p1"), FEE)
            .expect("renew");
        assert_eq!(expiry, 21);
        assert_eq!(ledger.members().split_count(&id("m"), 10), 1);
        assert_eq!(ledger.members().split_count(&id("m"), 21), 1);
        assert_eq!(
            ledger.partners().get(&id("p1")).expect("p1").index.queue(),
            &[10, 21]
        );
    }

    #[test]
    fn test_payment_too_low() {
        let mut ledger = ledger_with_partners(&["p1"]);
        let err = ledger
            .apply_and_subscribe(&ctx("m", 0), &id("p1"), FEE - 1)
            .expect_err("underpaid");
        assert!(matches!(
            err,
            LedgerError::PaymentTooLow {
                payment: 99_999,
                fee: FEE
            }
        ));
        assert!(!ledger.is_member(&id("m"), 0));
    }

    #[test]
    fn test_apply_to_missing_partner_mutates_nothing() {
        let mut ledger = ledger_with_partners(&["p1"]);
        let before = ledger.clone();
        assert!(matches!(
            ledger.apply_and_subscribe(&ctx("m", 0), &id("ghost"), FEE),
            Err(LedgerError::PartnerDoesNotExist)
        ));
        assert_eq!(ledger, before);
        assert!(ledger.drain_events().is_empty());
    }

    #[test]
    fn test_overpayment_retained_in_escrow() {
        let mut ledger = ledger_with_partners(&["p1"]);
        ledger
            .apply_and_subscribe(&ctx("m", 0), &id("p1"), FEE + 5)
            .expect("apply");
        assert_eq!(ledger.escrow(), FEE + 5);
    }

    #[test]
    fn test_subscribe_requires_membership() {
        let mut ledger = ledger_with_partners(&["p1"]);
        assert!(matches!(
            ledger.subscribe(&ctx("m", 0), &id("p1")),
            Err(LedgerError::NotAMember)
        ));
    }

    #[test]
    fn test_subscribe_to_second_partner_increments_split() {
        let mut ledger = ledger_with_partners(&["p1", "p2"]);
        ledger
            .apply_and_subscribe(&ctx("m", 0), &id("p1"), FEE)
            .expect("apply");
        ledger.subscribe(&ctx("m", 3), &id("p2")).expect("subscribe p2");

        assert_eq!(ledger.members().split_count(&id("m"), 10), 2);
        assert!(ledger.is_subscribed(&id("m"), &id("p2"), 3));
        let summary = ledger.member_summary(&id("m"), 3).expect("summary");
        assert_eq!(summary.current_split, 2);
    }

    #[test]
    fn test_subscribe_twice_rejected() {
        let mut ledger = ledger_with_partners(&["p1"]);
        ledger
            .apply_and_subscribe(&ctx("m", 0), &id("p1"), FEE)
            .expect("apply");
        assert!(matches!(
            ledger.subscribe(&ctx("m", 1), &id("p1")),
            Err(LedgerError::AlreadySubscribed)
        ));
        assert_eq!(ledger.members().split_count(&id("m"), 10), 1);
    }

    #[test]
    fn test_subscribe_to_missing_partner() {
        let mut ledger = ledger_with_partners(&["p1"]);
        ledger
            .apply_and_subscribe(&ctx("m", 0), &id("p1"), FEE)
            .expect("apply");
        assert!(matches!(
            ledger.subscribe(&ctx("m", 1), &id("ghost")),
            Err(LedgerError::PartnerDoesNotExist)
        ));
    }

    #[test]
    fn test_subscribe_at_expiry_tick_closed() {
        let mut ledger = ledger_with_partners(&["p1", "p2"]);
        ledger
            .apply_and_subscribe(&ctx("m", 0), &id("p1"), FEE)
            .expect("apply");
        assert!(ledger.is_member(&id("m"), 10));
        assert!(matches!(
            ledger.subscribe(&ctx("m", 10), &id("p2")),
            Err(LedgerError::PeriodClosed { expiry_tick: 10 })
        ));
        assert!(matches!(
            ledger.subscribe(&ctx("m", 10), &id("p1")),
            Err(LedgerError::AlreadySubscribed)
        ));
    }

    #[test]
    fn test_is_subscribed_false_when_inactive() {
        let mut ledger = ledger_with_partners(&["p1"]);
        assert!(!ledger.is_subscribed(&id("m"), &id("p1"), 0));
        ledger
            .apply_and_subscribe(&ctx("m", 0), &id("p1"), FEE)
            .expect("apply");
        assert!(!ledger.is_subscribed(&id("m"), &id("p1"), 11));
        assert!(!ledger.is_subscribed(&id("m"), &id("ghost"), 1));
    }

    #[test]
    fn test_queue_stays_ascending_across_members() {
        let mut ledger = ledger_with_partners(&["p1"]);
        for (i, tick) in [0, 0, 2, 5, 5, 9].into_iter().enumerate() {
            ledger
                .apply_and_subscribe(&ctx(&format!("m{i}"), tick), &id("p1"), FEE)
                .expect("apply");
        }
        let index = &ledger.partners().get(&id("p1")).expect("p1").index;
        assert_eq!(index.queue(), &[10, 12, 15, 19]);
        index.check_invariants().expect("invariants");
        ledger.check_invariants().expect("ledger invariants");
    }
}
