//! tessera-daemon: host process for the shared membership ledger.
//!
//! Single OS process running a Tokio async runtime. Clients talk to the
//! ledger via newline-delimited JSON-RPC over a Unix socket; every call is
//! serialized through one lock around the ledger, its value book and the
//! tick clock.

mod clock;
mod commands;
mod config;
mod events;
mod host;
mod rpc;
mod store;

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{error, info};

use crate::config::{ClockMode, DaemonConfig};
use crate::events::EventBus;
use crate::host::Host;
use crate::rpc::RpcServer;
use crate::store::SnapshotStore;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// Ledger, value book and clock.
    pub host: Mutex<Host>,
    /// Configuration.
    pub config: DaemonConfig,
    /// Event bus for pushing events to subscribers.
    pub event_bus: EventBus,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tessera=info".parse()?)
                .add_directive(format!("tessera_daemon={}", config.advanced.log_level).parse()?),
        )
        .init();

    info!("Tessera daemon starting");

    let data_dir = config.data_dir();

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;

    // 2. Open or restore the ledger
    let store = SnapshotStore::new(config.snapshot_path());
    info!("Ledger snapshot at {:?}", store.path());
    let host = Host::open(
        config.ledger_config()?,
        config.clock.mode,
        config.clock.start_tick,
        store,
    )?;

    // 3. Create event bus
    let event_bus = EventBus::new(1000);

    // 4. Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel(1);

    // 5. Build daemon state
    let state = Arc::new(DaemonState {
        host: Mutex::new(host),
        config,
        event_bus,
        shutdown_tx,
    });

    // 6. Start the interval clock
    let clock_task = match state.config.clock.mode {
        ClockMode::Interval => Some(tokio::spawn(clock::run_interval(
            state.clone(),
            state.config.clock.tick_interval_ms,
        ))),
        ClockMode::Manual => None,
    };

    // 7. Start IPC server
    let socket_path = data_dir.join("tessera.sock");
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());

    info!("Starting JSON-RPC server on {:?}", socket_path);

    // 8. Run the RPC server until shutdown
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    // Graceful shutdown
    info!("Daemon shutting down gracefully");

    if let Some(task) = clock_task {
        task.abort();
    }

    // Clean up socket file
    let _ = std::fs::remove_file(&socket_path);

    info!("Daemon stopped");
    Ok(())
}

/// Unpersisted in-memory state for handler tests.
#[cfg(test)]
pub(crate) fn test_state(mode: ClockMode) -> Arc<DaemonState> {
    let config = DaemonConfig::default();
    let host = Host::new(
        config.ledger_config().expect("default config"),
        clock::TickClock::new(mode, 0),
    )
    .expect("host");
    let (shutdown_tx, _) = broadcast::channel(1);
    Arc::new(DaemonState {
        host: Mutex::new(host),
        config,
        event_bus: EventBus::new(64),
        shutdown_tx,
    })
}
