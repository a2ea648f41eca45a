//! IPC command handlers.
//!
//! Each submodule implements the commands for one IPC category. Mutating
//! commands name their caller with a `caller` identity parameter; callers
//! on the local socket are trusted.

pub mod member;
pub mod partner;
pub mod settlement;
pub mod system;

use std::sync::Arc;

use serde_json::Value;
use tessera_ledger::{CallContext, InMemoryBook, Ledger, LedgerError};
use tessera_types::Identity;

use crate::rpc::RpcError;
use crate::DaemonState;

/// Handler result.
pub type Result = std::result::Result<Value, RpcError>;

/// Required hex identity parameter.
pub(crate) fn identity_param(params: &Value, key: &str) -> std::result::Result<Identity, RpcError> {
    let raw = params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))?;
    raw.parse()
        .map_err(|e| RpcError::invalid_params(&format!("{key}: {e}")))
}

/// Required unsigned integer parameter.
pub(crate) fn u64_param(params: &Value, key: &str) -> std::result::Result<u64, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))
}

/// Required string parameter.
pub(crate) fn str_param<'a>(params: &'a Value, key: &str) -> std::result::Result<&'a str, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))
}

/// Run a mutating ledger operation as `caller` at the host's current tick
/// and publish the events it produced.
pub(crate) async fn execute<T>(
    state: &Arc<DaemonState>,
    caller: Identity,
    op: impl FnOnce(&mut Ledger, &mut InMemoryBook, &CallContext) -> std::result::Result<T, LedgerError>,
) -> std::result::Result<T, RpcError> {
    let mut host = state.host.lock().await;
    let (value, events) = host.execute(caller, op)?;
    state.event_bus.emit_all(events);
    Ok(value)
}
