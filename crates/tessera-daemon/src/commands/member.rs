//! Membership command handlers.

use std::sync::Arc;

use serde_json::Value;

use super::{execute, identity_param, u64_param, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

/// Start a membership period for the caller and subscribe to one partner.
pub async fn apply_and_subscribe(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = identity_param(params, "caller")?;
    let partner = identity_param(params, "partner")?;
    let payment = u64_param(params, "payment")?;

    let expiry_tick = execute(state, caller, |ledger, _, ctx| {
        ledger.apply_and_subscribe(ctx, &partner, payment)
    })
    .await?;
    Ok(serde_json::json!({"expiry_tick": expiry_tick}))
}

/// Add a subscription to the caller's current period.
pub async fn subscribe(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = identity_param(params, "caller")?;
    let partner = identity_param(params, "partner")?;

    let split_count = execute(state, caller, |ledger, _, ctx| {
        ledger.subscribe(ctx, &partner)?;
        Ok(ledger
            .member_summary(&ctx.caller, ctx.tick)
            .map_or(0, |m| m.current_split))
    })
    .await?;
    Ok(serde_json::json!({"split_count": split_count}))
}

pub async fn is_member(state: &Arc<DaemonState>, params: &Value) -> Result {
    let identity = identity_param(params, "identity")?;
    let host = state.host.lock().await;
    Ok(serde_json::json!(host.ledger().is_member(&identity, host.now())))
}

pub async fn is_subscribed(state: &Arc<DaemonState>, params: &Value) -> Result {
    let identity = identity_param(params, "identity")?;
    let partner = identity_param(params, "partner")?;
    let host = state.host.lock().await;
    Ok(serde_json::json!(host
        .ledger()
        .is_subscribed(&identity, &partner, host.now())))
}

pub async fn get_member(state: &Arc<DaemonState>, params: &Value) -> Result {
    let identity = identity_param(params, "identity")?;
    let host = state.host.lock().await;
    let summary = host
        .ledger()
        .member_summary(&identity, host.now())
        .ok_or_else(|| RpcError::ledger(&tessera_ledger::LedgerError::NotAMember))?;
    serde_json::to_value(summary).map_err(|e| RpcError::internal_error(&e.to_string()))
}
