//! Settlement command handlers.

use std::sync::Arc;

use serde_json::Value;
use tessera_ledger::SettlementReport;

use super::{execute, identity_param, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

/// Settle a partner's matured ticks into the host's value book.
///
/// `max_ticks` bounds the work of one call; the rest stays queued for the
/// next call.
pub async fn payout(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = identity_param(params, "caller")?;
    let partner = identity_param(params, "partner")?;
    let max_ticks = match params.get("max_ticks") {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| RpcError::invalid_params("max_ticks must be a non-negative integer"))?,
        ),
    };

    let report = execute(state, caller, |ledger, book, ctx| {
        ledger.payout_up_to(ctx, &partner, max_ticks, book)
    })
    .await?;
    Ok(report_json(&report))
}

/// Amount a payout would transfer now.
pub async fn pending_payout(state: &Arc<DaemonState>, params: &Value) -> Result {
    let partner = identity_param(params, "partner")?;
    let host = state.host.lock().await;
    let amount = host
        .ledger()
        .pending_payout(&partner, host.now())
        .map_err(|e| RpcError::ledger(&e))?;
    Ok(serde_json::json!({"amount": amount}))
}

/// Value credited to an account in the host's book.
pub async fn get_balance(state: &Arc<DaemonState>, params: &Value) -> Result {
    let account = identity_param(params, "account")?;
    let host = state.host.lock().await;
    Ok(serde_json::json!({
        "account": account,
        "balance": host.book().balance(&account),
        "escrow": host.ledger().escrow(),
    }))
}

fn report_json(report: &SettlementReport) -> Value {
    serde_json::json!({
        "partner": report.partner,
        "destination": report.destination,
        "ticks_settled": report.ticks_settled,
        "payments": report.payments,
        "total": report.total,
        "remaining_ticks": report.remaining_ticks,
        "receipt_id": report.receipt_id.map(hex::encode),
    })
}
