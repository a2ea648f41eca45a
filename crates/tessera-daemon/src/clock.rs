//! Tick source.
//!
//! In manual mode the tick moves only on `advance_ticks`; in interval mode
//! a background task advances it once per `tick_interval_ms`.

use std::sync::Arc;
use std::time::Duration;

use tessera_types::Tick;
use tracing::{debug, warn};

use crate::config::ClockMode;
use crate::DaemonState;

/// Clock errors.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    #[error("tick counter overflow")]
    Overflow,
    #[error("clock is not in manual mode")]
    NotManual,
}

/// The host's current tick.
#[derive(Debug, Clone)]
pub struct TickClock {
    mode: ClockMode,
    now: Tick,
}

impl TickClock {
    pub fn new(mode: ClockMode, start: Tick) -> Self {
        Self { mode, now: start }
    }

    pub fn now(&self) -> Tick {
        self.now
    }

    /// Advance by `n` ticks regardless of mode.
    pub fn advance(&mut self, n: u64) -> Result<Tick, ClockError> {
        self.now = self.now.checked_add(n).ok_or(ClockError::Overflow)?;
        Ok(self.now)
    }

    /// Advance on behalf of a caller; only allowed in manual mode.
    pub fn manual_advance(&mut self, n: u64) -> Result<Tick, ClockError> {
        if self.mode != ClockMode::Manual {
            return Err(ClockError::NotManual);
        }
        self.advance(n)
    }
}

/// Advance the shared clock once per `interval_ms` until the task is dropped.
pub async fn run_interval(state: Arc<DaemonState>, interval_ms: u64) {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let mut host = state.host.lock().await;
        match host.clock_mut().advance(1) {
            Ok(now) => debug!(tick = now, "clock advanced"),
            Err(e) => {
                warn!("interval clock stopped: {}", e);
                return;
            }
        }
    }
}
