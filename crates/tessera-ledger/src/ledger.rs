//! The ledger facade.
//!
//! [`Ledger`] owns every partner and member record. Each mutating operation
//! takes a [`CallContext`] naming the authenticated caller and the tick the
//! host observed, validates all preconditions before touching any record,
//! and either commits in full or returns an error with the ledger unchanged.
//!
//! The ledger also remembers the highest tick at which a mutating call
//! succeeded and rejects calls presenting an earlier tick, since the
//! ordering of every expiry queue depends on a non-decreasing clock.
//!
//! Enrollment lives in [`crate::enrollment`], settlement in
//! [`crate::settlement`]; both extend [`Ledger`] with further methods.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tessera_types::events::LedgerEvent;
use tessera_types::views::{MemberSummary, PartnerSummary};
use tessera_types::{Amount, Identity, Tick};
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::member::MemberDirectory;
use crate::partner::PartnerDirectory;
use crate::{LedgerError, Result};

/// Who is calling, and when.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
    /// Identity authenticated by the host.
    pub caller: Identity,
    /// Current tick as supplied by the host clock.
    pub tick: Tick,
}

impl CallContext {
    pub fn new(caller: Identity, tick: Tick) -> Self {
        Self { caller, tick }
    }
}

/// Shared membership ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub(crate) config: LedgerConfig,
    pub(crate) partners: PartnerDirectory,
    pub(crate) members: MemberDirectory,
    /// Value accepted from members and not yet settled.
    pub(crate) escrow: Amount,
    /// Highest tick at which a mutating call committed.
    pub(crate) last_tick: Tick,
    /// Number of non-empty settlements committed.
    pub(crate) settlements: u64,
    #[serde(skip)]
    pub(crate) events: Vec<LedgerEvent>,
}

impl Ledger {
    /// Create an empty ledger.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidConfig`] if the fee or membership length is zero
    pub fn new(config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        info!(
            fee = config.fee,
            membership_length = config.membership_length,
            "ledger created"
        );
        Ok(Self {
            config,
            partners: PartnerDirectory::default(),
            members: MemberDirectory::default(),
            escrow: 0,
            last_tick: 0,
            settlements: 0,
            events: Vec::new(),
        })
    }

    pub fn config(&self) -> LedgerConfig {
        self.config
    }

    /// Membership fee.
    pub fn fee(&self) -> Amount {
        self.config.fee
    }

    pub fn membership_length(&self) -> Tick {
        self.config.membership_length
    }

    /// Value held for unsettled shares (overpayments and forfeited
    /// remainders stay here permanently).
    pub fn escrow(&self) -> Amount {
        self.escrow
    }

    /// Highest tick at which a mutating call committed.
    pub fn last_tick(&self) -> Tick {
        self.last_tick
    }

    /// Number of non-empty settlements committed so far.
    pub fn settlement_count(&self) -> u64 {
        self.settlements
    }

    pub fn partners(&self) -> &PartnerDirectory {
        &self.partners
    }

    pub fn members(&self) -> &MemberDirectory {
        &self.members
    }

    /// Take the events buffered by committed operations.
    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Run one mutating operation under the clock guard.
    ///
    /// `op` must validate before it mutates; on error any events it buffered
    /// are discarded and the clock watermark is left alone.
    pub(crate) fn transact<T>(
        &mut self,
        ctx: &CallContext,
        name: &'static str,
        op: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if ctx.tick < self.last_tick {
            warn!(
                op = name,
                last = self.last_tick,
                now = ctx.tick,
                "clock regression rejected"
            );
            return Err(LedgerError::ClockRegressed {
                last: self.last_tick,
                now: ctx.tick,
            });
        }

        let buffered = self.events.len();
        match op(self) {
            Ok(value) => {
                self.last_tick = ctx.tick;
                Ok(value)
            }
            Err(e) => {
                self.events.truncate(buffered);
                debug!(op = name, caller = ?ctx.caller, tick = ctx.tick, error = %e, "operation aborted");
                Err(e)
            }
        }
    }

    // Partner directory

    /// Register the caller as a partner paying out to `payout_destination`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AlreadyPartner`] if the caller already is one
    pub fn become_partner(
        &mut self,
        ctx: &CallContext,
        payout_destination: Identity,
        display_name: &str,
    ) -> Result<()> {
        self.transact(ctx, "become_partner", |ledger| {
            ledger
                .partners
                .register(ctx.caller, payout_destination, display_name)?;
            info!(partner = ?ctx.caller, name = display_name, "partner registered");
            ledger.events.push(LedgerEvent::PartnerRegistered {
                partner: ctx.caller,
                payout_destination,
                display_name: display_name.to_string(),
                tick: ctx.tick,
            });
            Ok(())
        })
    }

    /// Overwrite payout destination and display name of `partner`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotAuthorizedOwner`] unless the caller owns `partner`
    pub fn update_partner(
        &mut self,
        ctx: &CallContext,
        partner: &Identity,
        payout_destination: Identity,
        display_name: &str,
    ) -> Result<()> {
        self.transact(ctx, "update_partner", |ledger| {
            ledger
                .partners
                .update(&ctx.caller, partner, payout_destination, display_name)?;
            info!(partner = ?partner, name = display_name, "partner updated");
            ledger.events.push(LedgerEvent::PartnerUpdated {
                partner: *partner,
                payout_destination,
                display_name: display_name.to_string(),
                tick: ctx.tick,
            });
            Ok(())
        })
    }

    /// Grant `owner` ownership of `partner`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotAuthorizedOwner`] unless the caller owns `partner`
    pub fn add_owner(&mut self, ctx: &CallContext, partner: &Identity, owner: Identity) -> Result<()> {
        self.transact(ctx, "add_owner", |ledger| {
            ledger.partners.add_owner(&ctx.caller, partner, owner)?;
            info!(partner = ?partner, owner = ?owner, "owner added");
            ledger.events.push(LedgerEvent::OwnerAdded {
                partner: *partner,
                owner,
                tick: ctx.tick,
            });
            Ok(())
        })
    }

    /// Revoke `owner`'s ownership of `partner`.
    ///
    /// Removing the last owner is allowed; it locks the partner record for
    /// good and is reported with a [`LedgerEvent::PartnerLocked`].
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotAuthorizedOwner`] unless the caller owns `partner`
    pub fn remove_owner(
        &mut self,
        ctx: &CallContext,
        partner: &Identity,
        owner: &Identity,
    ) -> Result<()> {
        self.transact(ctx, "remove_owner", |ledger| {
            let locked = ledger.partners.remove_owner(&ctx.caller, partner, owner)?;
            info!(partner = ?partner, owner = ?owner, "owner removed");
            ledger.events.push(LedgerEvent::OwnerRemoved {
                partner: *partner,
                owner: *owner,
                tick: ctx.tick,
            });
            if locked {
                warn!(partner = ?partner, "last owner removed, partner is now locked");
                ledger.events.push(LedgerEvent::PartnerLocked {
                    partner: *partner,
                    tick: ctx.tick,
                });
            }
            Ok(())
        })
    }

    pub fn is_partner(&self, identity: &Identity) -> bool {
        self.partners.contains(identity)
    }

    pub fn is_owner(&self, partner: &Identity, identity: &Identity) -> bool {
        self.partners.is_owner(partner, identity)
    }

    /// Display name of `partner`, if registered.
    pub fn partner_name(&self, partner: &Identity) -> Option<&str> {
        self.partners.get(partner).map(|p| p.display_name.as_str())
    }

    pub fn partner_summary(&self, partner: &Identity) -> Option<PartnerSummary> {
        self.partners.get(partner).map(|p| p.summary(*partner))
    }

    // Member directory

    /// Whether `identity` holds an active membership at `now`.
    pub fn is_member(&self, identity: &Identity, now: Tick) -> bool {
        self.members.is_active(identity, now)
    }

    pub fn member_summary(&self, identity: &Identity, now: Tick) -> Option<MemberSummary> {
        self.members.summary(identity, now)
    }

    // Consistency

    /// Verify every structural invariant of the ledger.
    ///
    /// Each partner index must be consistent, and every queued subscriber
    /// must have a member record whose split count for the queued period
    /// is at least the number of partners still holding it there.
    /// Counters never shrink on settlement.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::CorruptSnapshot`] describing the first violation
    pub fn check_invariants(&self) -> Result<()> {
        self.config.validate()?;
        let mut holders: BTreeMap<(Identity, Tick), u32> = BTreeMap::new();
        for (id, partner) in self.partners.iter() {
            partner
                .index
                .check_invariants()
                .map_err(|e| LedgerError::CorruptSnapshot(format!("partner {id}: {e}")))?;
            for &tick in partner.index.queue() {
                for subscriber in partner.index.subscribers_at(tick) {
                    *holders.entry((*subscriber, tick)).or_insert(0) += 1;
                }
            }
        }
        for ((subscriber, tick), held) in holders {
            let count = self.members.split_count(&subscriber, tick);
            if count < held {
                return Err(LedgerError::CorruptSnapshot(format!(
                    "subscriber {subscriber} at tick {tick} is queued with {held} partners but splits {count} ways"
                )));
            }
        }
        Ok(())
    }

    // Snapshots

    /// Serialize the ledger to JSON. Buffered events are not included.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| LedgerError::Serialization(e.to_string()))
    }

    /// Restore a ledger from [`to_json`](Self::to_json) output.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Serialization`] if the JSON does not parse
    /// - [`LedgerError::CorruptSnapshot`] / [`LedgerError::InvalidConfig`]
    ///   if the restored state violates an invariant
    pub fn from_json(s: &str) -> Result<Self> {
        let ledger: Self =
            serde_json::from_str(s).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        ledger.check_invariants()?;
        info!(
            partners = ledger.partners.len(),
            members = ledger.members.len(),
            last_tick = ledger.last_tick,
            "ledger restored from snapshot"
        );
        Ok(ledger)
    }
}
