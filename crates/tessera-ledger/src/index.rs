//! Per-partner subscription index.
//!
//! Subscribers are grouped by the tick at which their membership period
//! ends. The expiry queue lists every tick that still has unsettled
//! subscribers, strictly ascending. Enrollment expiries are
//! `current_tick + membership_length` and land at the tail in O(1); a
//! member adding a partner later in its period brings an older expiry,
//! which is placed by binary search.
//!
//! Settlement reads a matured prefix of the queue and, once the payout has
//! gone through, drops that prefix and shifts the remaining suffix to the
//! front. The highest settled tick is remembered; nothing may be queued at
//! or below it again.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tessera_types::{Identity, Tick};

use crate::{LedgerError, Result};

/// Expiry queue plus tick-keyed subscriber sets for one partner.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionIndex {
    expiry_queue: Vec<Tick>,
    subscribers_by_tick: BTreeMap<Tick, BTreeSet<Identity>>,
    #[serde(default)]
    settled_through: Option<Tick>,
}

impl SubscriptionIndex {
    /// Whether `subscriber` is recorded at `tick`.
    pub fn contains(&self, tick: Tick, subscriber: &Identity) -> bool {
        self.subscribers_by_tick
            .get(&tick)
            .is_some_and(|set| set.contains(subscriber))
    }

    /// Check that [`insert`](Self::insert) would succeed, without mutating.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AlreadySubscribed`] if `subscriber` is already at `tick`
    /// - [`LedgerError::QueueOrder`] if `tick` was already settled past
    pub fn check_insert(&self, tick: Tick, subscriber: &Identity) -> Result<()> {
        if self.contains(tick, subscriber) {
            return Err(LedgerError::AlreadySubscribed);
        }
        if let Some(settled_through) = self.settled_through {
            if tick <= settled_through {
                return Err(LedgerError::QueueOrder {
                    tick,
                    settled_through,
                });
            }
        }
        Ok(())
    }

    /// Record `subscriber` at `tick`, queueing the tick if it is new.
    ///
    /// Returns `true` if the tick was appended to the expiry queue.
    ///
    /// # Errors
    ///
    /// See [`check_insert`](Self::check_insert). Nothing is mutated on error.
    pub fn insert(&mut self, tick: Tick, subscriber: Identity) -> Result<bool> {
        self.check_insert(tick, &subscriber)?;
        let set = self.subscribers_by_tick.entry(tick).or_default();
        let first = set.is_empty();
        set.insert(subscriber);
        if first {
            match self.expiry_queue.last() {
                Some(&tail) if tick < tail => {
                    let at = self.expiry_queue.partition_point(|&t| t < tick);
                    self.expiry_queue.insert(at, tick);
                }
                _ => self.expiry_queue.push(tick),
            }
        }
        Ok(first)
    }

    /// Ticks with unsettled subscribers, oldest first.
    pub fn queue(&self) -> &[Tick] {
        &self.expiry_queue
    }

    /// Subscribers recorded at `tick`, in ascending identity order.
    pub fn subscribers_at(&self, tick: Tick) -> impl Iterator<Item = &Identity> {
        self.subscribers_by_tick.get(&tick).into_iter().flatten()
    }

    /// The matured prefix of the queue: ticks `<= now`, at most `limit` of them.
    pub fn matured(&self, now: Tick, limit: Option<usize>) -> &[Tick] {
        let matured = self.expiry_queue.partition_point(|&t| t <= now);
        let take = limit.map_or(matured, |limit| matured.min(limit));
        &self.expiry_queue[..take]
    }

    /// Drop the first `count` queued ticks together with their subscriber
    /// sets and shift the remainder to the front.
    ///
    /// Returns the removed `(tick, subscribers)` pairs in queue order.
    pub fn compact(&mut self, count: usize) -> Vec<(Tick, BTreeSet<Identity>)> {
        let count = count.min(self.expiry_queue.len());
        let removed: Vec<_> = self
            .expiry_queue
            .drain(..count)
            .map(|tick| {
                let set = self.subscribers_by_tick.remove(&tick).unwrap_or_default();
                (tick, set)
            })
            .collect();
        if let Some((last, _)) = removed.last() {
            self.settled_through = Some(*last);
        }
        removed
    }

    /// Subscriber entries across all queued ticks.
    pub fn pending_subscribers(&self) -> usize {
        self.subscribers_by_tick.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.expiry_queue.is_empty()
    }

    /// Highest tick removed by settlement so far.
    pub fn settled_through(&self) -> Option<Tick> {
        self.settled_through
    }

    /// Verify the queue/set correspondence.
    ///
    /// The queue must be strictly ascending and start after the settled
    /// watermark, every queued tick must have a non-empty subscriber set,
    /// and every non-empty set must be queued.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        if let Some(pair) = self.expiry_queue.windows(2).find(|w| w[0] >= w[1]) {
            return Err(format!(
                "expiry queue not strictly ascending at {} -> {}",
                pair[0], pair[1]
            ));
        }
        if let (Some(settled), Some(&head)) = (self.settled_through, self.expiry_queue.first()) {
            if head <= settled {
                return Err(format!("queued tick {head} was already settled through {settled}"));
            }
        }
        for tick in &self.expiry_queue {
            match self.subscribers_by_tick.get(tick) {
                Some(set) if !set.is_empty() => {}
                _ => return Err(format!("queued tick {tick} has no subscribers")),
            }
        }
        for (tick, set) in &self.subscribers_by_tick {
            if set.is_empty() {
                return Err(format!("empty subscriber set retained at tick {tick}"));
            }
            if self.expiry_queue.binary_search(tick).is_err() {
                return Err(format!("subscribers at tick {tick} are not queued"));
            }
        }
        Ok(())
    }
}
