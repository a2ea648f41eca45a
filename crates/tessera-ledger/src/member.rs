//! Member directory.
//!
//! A member is active while the current tick is at or before its expiry
//! tick. Split counters are kept per period (keyed by the period's expiry
//! tick) and only ever grow; counters of past periods stay in the record
//! but nothing active reads them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tessera_types::views::MemberSummary;
use tessera_types::{Identity, Tick};

use crate::{LedgerError, Result};

/// A time-boxed membership.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Last tick of the current (or most recent) period.
    pub expiry_tick: Tick,
    /// Partners the member split each period with, keyed by expiry tick.
    pub subscription_count_by_tick: BTreeMap<Tick, u32>,
}

impl Member {
    /// Active iff `now <= expiry_tick`.
    pub fn is_active(&self, now: Tick) -> bool {
        now <= self.expiry_tick
    }

    /// Split count for the period ending at `tick` (0 if never subscribed).
    pub fn split_count(&self, tick: Tick) -> u32 {
        self.subscription_count_by_tick
            .get(&tick)
            .copied()
            .unwrap_or(0)
    }

    /// Count one more partner for the current period. Returns the new count.
    pub fn record_subscription(&mut self) -> Result<u32> {
        let count = self
            .subscription_count_by_tick
            .entry(self.expiry_tick)
            .or_insert(0);
        *count = count.checked_add(1).ok_or(LedgerError::Overflow)?;
        Ok(*count)
    }
}

/// Identity-keyed member records.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDirectory {
    members: BTreeMap<Identity, Member>,
}

impl MemberDirectory {
    pub fn get(&self, member: &Identity) -> Option<&Member> {
        self.members.get(member)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identity, &Member)> {
        self.members.iter()
    }

    /// Whether `member` is active at `now`. Absent records never are.
    pub fn is_active(&self, member: &Identity, now: Tick) -> bool {
        self.members.get(member).is_some_and(|m| m.is_active(now))
    }

    /// The member record if active at `now`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotAMember`] if absent or expired
    pub fn active(&self, member: &Identity, now: Tick) -> Result<&Member> {
        self.members
            .get(member)
            .filter(|m| m.is_active(now))
            .ok_or(LedgerError::NotAMember)
    }

    /// Mutable variant of [`active`](Self::active).
    pub fn active_mut(&mut self, member: &Identity, now: Tick) -> Result<&mut Member> {
        self.members
            .get_mut(member)
            .filter(|m| m.is_active(now))
            .ok_or(LedgerError::NotAMember)
    }

    /// Split count of `member` for the period ending at `tick`.
    pub fn split_count(&self, member: &Identity, tick: Tick) -> u32 {
        self.members.get(member).map_or(0, |m| m.split_count(tick))
    }

    /// Start a new period for `member`, creating the record if needed.
    ///
    /// Overwrites any stale expiry; past split counters are kept.
    pub fn start_period(&mut self, member: Identity, expiry_tick: Tick) -> &mut Member {
        let record = self.members.entry(member).or_default();
        record.expiry_tick = expiry_tick;
        record
    }

    /// Read-only view of `member` at `now`, if a record exists.
    pub fn summary(&self, member: &Identity, now: Tick) -> Option<MemberSummary> {
        self.members.get(member).map(|m| {
            let active = m.is_active(now);
            MemberSummary {
                member: *member,
                expiry_tick: m.expiry_tick,
                active,
                current_split: if active { m.split_count(m.expiry_tick) } else { 0 },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(label: &str) -> Identity {
        Identity::derive(label)
    }

    #[test]
    fn test_absent_member_inactive() {
        let dir = MemberDirectory::default();
        assert!(!dir.is_active(&id("nobody"), 0));
        assert!(matches!(dir.active(&id("nobody"), 0), Err(LedgerError::NotAMember)));
        assert!(dir.summary(&id("nobody"), 0).is_none());
    }

    #[test]
    fn test_expiry_boundary_inclusive() {
        let mut dir = MemberDirectory::default();
        dir.start_period(id("m"), 10);
        assert!(dir.is_active(&id("m"), 0));
        assert!(dir.is_active(&id("m"), 10));
        assert!(!dir.is_active(&id("m"), 11));
    }

    #[test]
    fn test_counters_grow_per_period() {
        let mut dir = MemberDirectory::default();
        let member = dir.start_period(id("m"), 10);
        assert_eq!(member.record_subscription().expect("first"), 1);
        assert_eq!(member.record_subscription().expect("second"), 2);

        let member = dir.start_period(id("m"), 25);
        assert_eq!(member.record_subscription().expect("new period"), 1);

        assert_eq!(dir.split_count(&id("m"), 10), 2, "stale period retained");
        assert_eq!(dir.split_count(&id("m"), 25), 1);
        assert_eq!(dir.split_count(&id("other"), 25), 0);
    }

    #[test]
    fn test_counter_overflow_detected() {
        let mut member = Member {
            expiry_tick: 5,
            subscription_count_by_tick: BTreeMap::from([(5, u32::MAX)]),
        };
        assert!(matches!(member.record_subscription(), Err(LedgerError::Overflow)));
        assert_eq!(member.split_count(5), u32::MAX);
    }

    #[test]
    fn test_summary() {
        let mut dir = MemberDirectory::default();
        dir.start_period(id("m"), 10)
            .record_subscription()
            .expect("subscribe");

        let active = dir.summary(&id("m"), 3).expect("summary");
        assert!(active.active);
        assert_eq!(active.current_split, 1);

        let expired = dir.summary(&id("m"), 11).expect("summary");
        assert!(!expired.active);
        assert_eq!(expired.current_split, 0);
        assert_eq!(expired.expiry_tick, 10);
    }
}
