//! Clock and configuration command handlers.

use std::sync::Arc;

use serde_json::Value;

use super::{u64_param, Result};
use crate::DaemonState;

pub async fn get_fee(state: &Arc<DaemonState>) -> Result {
    let host = state.host.lock().await;
    Ok(serde_json::json!({
        "fee": host.ledger().fee(),
        "membership_length": host.ledger().membership_length(),
    }))
}

pub async fn current_tick(state: &Arc<DaemonState>) -> Result {
    let host = state.host.lock().await;
    Ok(serde_json::json!({"tick": host.now()}))
}

/// Move the manual clock forward by `ticks` (default 1).
pub async fn advance_ticks(state: &Arc<DaemonState>, params: &Value) -> Result {
    let n = if params.get("ticks").is_some() {
        u64_param(params, "ticks")?
    } else {
        1
    };
    let mut host = state.host.lock().await;
    let tick = host.advance_ticks(n)?;
    Ok(serde_json::json!({"tick": tick}))
}
