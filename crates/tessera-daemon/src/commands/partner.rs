//! Partner administration command handlers.

use std::sync::Arc;

use serde_json::Value;

use super::{execute, identity_param, str_param, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

/// Register the caller as a partner.
pub async fn become_partner(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = identity_param(params, "caller")?;
    let destination = identity_param(params, "payout_destination")?;
    let name = str_param(params, "display_name")?;

    execute(state, caller, |ledger, _, ctx| {
        ledger.become_partner(ctx, destination, name)
    })
    .await?;
    Ok(serde_json::json!({"partner": caller}))
}

/// Overwrite a partner's payout destination and display name.
pub async fn update_partner(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = identity_param(params, "caller")?;
    let partner = identity_param(params, "partner")?;
    let destination = identity_param(params, "payout_destination")?;
    let name = str_param(params, "display_name")?;

    execute(state, caller, |ledger, _, ctx| {
        ledger.update_partner(ctx, &partner, destination, name)
    })
    .await?;
    Ok(serde_json::json!({"updated": true}))
}

pub async fn add_owner(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = identity_param(params, "caller")?;
    let partner = identity_param(params, "partner")?;
    let owner = identity_param(params, "owner")?;

    execute(state, caller, |ledger, _, ctx| ledger.add_owner(ctx, &partner, owner)).await?;
    Ok(serde_json::json!({"added": true}))
}

pub async fn remove_owner(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = identity_param(params, "caller")?;
    let partner = identity_param(params, "partner")?;
    let owner = identity_param(params, "owner")?;

    let locked = execute(state, caller, |ledger, _, ctx| {
        ledger.remove_owner(ctx, &partner, &owner)?;
        Ok(ledger
            .partners()
            .get(&partner)
            .map_or(true, |p| p.owners.is_empty()))
    })
    .await?;
    Ok(serde_json::json!({"removed": true, "locked": locked}))
}

pub async fn is_partner(state: &Arc<DaemonState>, params: &Value) -> Result {
    let identity = identity_param(params, "identity")?;
    let host = state.host.lock().await;
    Ok(serde_json::json!(host.ledger().is_partner(&identity)))
}

pub async fn is_owner(state: &Arc<DaemonState>, params: &Value) -> Result {
    let partner = identity_param(params, "partner")?;
    let identity = identity_param(params, "identity")?;
    let host = state.host.lock().await;
    Ok(serde_json::json!(host.ledger().is_owner(&partner, &identity)))
}

/// Display name, or null for an unknown partner.
pub async fn get_partner_name(state: &Arc<DaemonState>, params: &Value) -> Result {
    let partner = identity_param(params, "partner")?;
    let host = state.host.lock().await;
    Ok(serde_json::json!(host.ledger().partner_name(&partner)))
}

pub async fn get_partner(state: &Arc<DaemonState>, params: &Value) -> Result {
    let partner = identity_param(params, "partner")?;
    let host = state.host.lock().await;
    let summary = host
        .ledger()
        .partner_summary(&partner)
        .ok_or_else(|| RpcError::ledger(&tessera_ledger::LedgerError::PartnerDoesNotExist))?;
    serde_json::to_value(summary).map_err(|e| RpcError::internal_error(&e.to_string()))
}
