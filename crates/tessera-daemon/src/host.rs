//! The serialized ledger host.
//!
//! One `Host` owns the ledger, the value book backing payouts and the tick
//! clock. RPC handlers run every ledger operation through
//! [`Host::execute`], which supplies the current tick, persists the result
//! and hands back the events the operation produced.

use tessera_ledger::{CallContext, InMemoryBook, Ledger, LedgerConfig, LedgerError};
use tessera_types::events::LedgerEvent;
use tessera_types::{Identity, Tick};
use tracing::{error, info};

use crate::clock::{ClockError, TickClock};
use crate::config::ClockMode;
use crate::store::{SnapshotStore, StoreError};

/// Host-level errors.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
    #[error(transparent)]
    Clock(#[from] ClockError),
}

/// Ledger, value book and clock behind one lock.
pub struct Host {
    ledger: Ledger,
    book: InMemoryBook,
    clock: TickClock,
    store: Option<SnapshotStore>,
}

impl Host {
    /// Fresh host with no persistence.
    pub fn new(config: LedgerConfig, clock: TickClock) -> Result<Self, HostError> {
        Ok(Self {
            ledger: Ledger::new(config)?,
            book: InMemoryBook::new(),
            clock,
            store: None,
        })
    }

    /// Restore from `store` if it holds a snapshot, otherwise start fresh.
    ///
    /// A restored clock never starts below the ledger's committed tick.
    pub fn open(
        config: LedgerConfig,
        mode: ClockMode,
        start_tick: Tick,
        store: SnapshotStore,
    ) -> Result<Self, HostError> {
        let host = match store.load()? {
            Some(snapshot) => {
                let tick = snapshot.tick.max(snapshot.ledger.last_tick());
                if snapshot.ledger.config() != config {
                    info!("ledger parameters come from the snapshot; [ledger] section ignored");
                }
                Self {
                    ledger: snapshot.ledger,
                    book: snapshot.book,
                    clock: TickClock::new(mode, tick),
                    store: Some(store),
                }
            }
            None => {
                let host = Self {
                    store: Some(store),
                    ..Self::new(config, TickClock::new(mode, start_tick))?
                };
                host.persist()?;
                host
            }
        };
        info!(tick = host.clock.now(), "ledger host ready");
        Ok(host)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn book(&self) -> &InMemoryBook {
        &self.book
    }

    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    pub fn clock_mut(&mut self) -> &mut TickClock {
        &mut self.clock
    }

    /// Run one ledger operation as `caller` at the current tick.
    ///
    /// The ledger and book are committed together: if the snapshot write
    /// fails, both are rolled back and the events are discarded.
    pub fn execute<T>(
        &mut self,
        caller: Identity,
        op: impl FnOnce(&mut Ledger, &mut InMemoryBook, &CallContext) -> Result<T, LedgerError>,
    ) -> Result<(T, Vec<LedgerEvent>), HostError> {
        let ctx = CallContext::new(caller, self.clock.now());
        let backup = self
            .store
            .as_ref()
            .map(|_| (self.ledger.clone(), self.book.clone()));

        let value = op(&mut self.ledger, &mut self.book, &ctx)?;

        if let Err(e) = self.persist() {
            error!("snapshot write failed, rolling back: {}", e);
            if let Some((ledger, book)) = backup {
                self.ledger = ledger;
                self.book = book;
            }
            return Err(e.into());
        }
        Ok((value, self.ledger.drain_events()))
    }

    /// Advance the clock on behalf of a caller (manual mode only).
    pub fn advance_ticks(&mut self, n: u64) -> Result<Tick, HostError> {
        let now = self.clock.manual_advance(n)?;
        info!(tick = now, "clock advanced manually");
        Ok(now)
    }

    fn persist(&self) -> Result<(), StoreError> {
        match &self.store {
            Some(store) => store.save(self.clock.now(), &self.ledger, &self.book),
            None => Ok(()),
        }
    }
}
