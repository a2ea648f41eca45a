//! JSON-RPC server over Unix socket.
//!
//! Listens on a Unix domain socket, accepts connections, and dispatches
//! newline-delimited JSON-RPC method calls to the command handlers.
//! `watch_events` turns its connection into a notification stream.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tessera_ledger::LedgerError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixListener;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::events::EventFilter;
use crate::host::HostError;
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Method name.
    pub method: String,
    /// Parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC success response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    /// JSON-RPC version.
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Result or error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    pub code: i32,
    /// Error name.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    fn new(code: i32, message: &str, data: Option<serde_json::Value>) -> Self {
        Self {
            code,
            message: message.to_string(),
            data,
        }
    }

    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self::new(-32700, "PARSE_ERROR", None)
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self::new(-32600, "INVALID_REQUEST", None)
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            -32601,
            "METHOD_NOT_FOUND",
            Some(serde_json::json!({"method": method})),
        )
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self::new(
            -32602,
            "INVALID_PARAMS",
            Some(serde_json::json!({"detail": detail})),
        )
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self::new(
            -32603,
            "INTERNAL_ERROR",
            Some(serde_json::json!({"detail": detail})),
        )
    }

    // Ledger errors (-32101..=-32115)

    /// Map a ledger failure to its stable code and name.
    pub fn ledger(err: &LedgerError) -> Self {
        use serde_json::json;

        let (code, name, data) = match err {
            LedgerError::AlreadyPartner => (-32101, "ALREADY_PARTNER", None),
            LedgerError::NotAuthorizedOwner => (-32102, "NOT_AUTHORIZED_OWNER", None),
            LedgerError::AlreadyMember => (-32103, "ALREADY_MEMBER", None),
            LedgerError::PaymentTooLow { payment, fee } => (
                -32104,
                "PAYMENT_TOO_LOW",
                Some(json!({"payment": payment, "fee": fee})),
            ),
            LedgerError::NotAMember => (-32105, "NOT_A_MEMBER", None),
            LedgerError::AlreadySubscribed => (-32106, "ALREADY_SUBSCRIBED", None),
            LedgerError::PartnerDoesNotExist => (-32107, "PARTNER_DOES_NOT_EXIST", None),
            LedgerError::PeriodClosed { expiry_tick } => (
                -32108,
                "PERIOD_CLOSED",
                Some(json!({"expiry_tick": expiry_tick})),
            ),
            LedgerError::TransferFailed(e) => (
                -32109,
                "TRANSFER_FAILED",
                Some(json!({"detail": e.to_string()})),
            ),
            LedgerError::ClockRegressed { last, now } => (
                -32110,
                "CLOCK_REGRESSED",
                Some(json!({"last": last, "now": now})),
            ),
            LedgerError::QueueOrder {
                tick,
                settled_through,
            } => (
                -32111,
                "QUEUE_ORDER",
                Some(json!({"tick": tick, "settled_through": settled_through})),
            ),
            LedgerError::Overflow => (-32112, "OVERFLOW", None),
            LedgerError::InvalidConfig(d) => (-32113, "INVALID_CONFIG", Some(json!({"detail": d}))),
            LedgerError::CorruptSnapshot(d) => {
                (-32114, "CORRUPT_SNAPSHOT", Some(json!({"detail": d})))
            }
            LedgerError::Serialization(d) => {
                (-32115, "SERIALIZATION", Some(json!({"detail": d})))
            }
        };
        Self::new(code, name, data)
    }

    /// Snapshot write failed; the operation was rolled back (-32120).
    pub fn storage_failed(detail: &str) -> Self {
        Self::new(
            -32120,
            "STORAGE_FAILED",
            Some(serde_json::json!({"detail": detail})),
        )
    }

    /// Clock cannot be advanced by callers (-32121).
    pub fn clock_not_manual() -> Self {
        Self::new(-32121, "CLOCK_NOT_MANUAL", None)
    }
}

impl From<HostError> for RpcError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Ledger(e) => Self::ledger(&e),
            HostError::Storage(e) => Self::storage_failed(&e.to_string()),
            HostError::Clock(crate::clock::ClockError::NotManual) => Self::clock_not_manual(),
            HostError::Clock(crate::clock::ClockError::Overflow) => {
                Self::ledger(&LedgerError::Overflow)
            }
        }
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    /// Create a new RPC server.
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single client connection.
async fn handle_connection(
    state: Arc<DaemonState>,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }

        let request = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => request,
            Err(_) => {
                let response = RpcResponse::error(serde_json::Value::Null, RpcError::parse_error());
                write_line(&mut writer, &response).await?;
                continue;
            }
        };

        if request.method == "watch_events" {
            let filter: EventFilter = if request.params.is_null() {
                EventFilter::default()
            } else {
                match serde_json::from_value(request.params.clone()) {
                    Ok(filter) => filter,
                    Err(e) => {
                        let err = RpcError::invalid_params(&e.to_string());
                        write_line(&mut writer, &RpcResponse::error(request.id, err)).await?;
                        continue;
                    }
                }
            };
            return stream_events(state, request.id, filter, reader, writer).await;
        }

        let response = dispatch_request(state.clone(), request).await;
        write_line(&mut writer, &response).await?;
    }

    Ok(())
}

async fn write_line<T: Serialize>(writer: &mut OwnedWriteHalf, message: &T) -> anyhow::Result<()> {
    let mut json = serde_json::to_string(message)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Acknowledge the subscription, then forward matching events as
/// `ledger_event` notifications until the client hangs up.
async fn stream_events<R>(
    state: Arc<DaemonState>,
    id: serde_json::Value,
    filter: EventFilter,
    mut reader: BufReader<R>,
    mut writer: OwnedWriteHalf,
) -> anyhow::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut rx = state.event_bus.subscribe();
    let ack = serde_json::json!({"subscribed": true, "sequence": state.event_bus.sequence()});
    write_line(&mut writer, &RpcResponse::success(id, ack)).await?;

    let mut discard = String::new();
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(envelope) => {
                    if !filter.matches(&envelope.event) {
                        continue;
                    }
                    let notification = serde_json::json!({
                        "jsonrpc": "2.0",
                        "method": "ledger_event",
                        "params": envelope,
                    });
                    write_line(&mut writer, &notification).await?;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event watcher lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            read = reader.read_line(&mut discard) => {
                if read? == 0 {
                    break;
                }
                discard.clear();
            }
        }
    }
    debug!("event watcher disconnected");
    Ok(())
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
pub async fn dispatch_request(state: Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    if request.jsonrpc != "2.0" {
        return RpcResponse::error(id, RpcError::invalid_request());
    }
    let method = request.method.as_str();
    let params = &request.params;

    debug!("Dispatching RPC method: {}", method);

    let result = match method {
        // Partner administration
        "become_partner" => commands::partner::become_partner(&state, params).await,
        "update_partner" => commands::partner::update_partner(&state, params).await,
        "add_owner" => commands::partner::add_owner(&state, params).await,
        "remove_owner" => commands::partner::remove_owner(&state, params).await,
        "is_partner" => commands::partner::is_partner(&state, params).await,
        "is_owner" => commands::partner::is_owner(&state, params).await,
        "get_partner_name" => commands::partner::get_partner_name(&state, params).await,
        "get_partner" => commands::partner::get_partner(&state, params).await,

        // Membership
        "apply_and_subscribe" => commands::member::apply_and_subscribe(&state, params).await,
        "subscribe" => commands::member::subscribe(&state, params).await,
        "is_member" => commands::member::is_member(&state, params).await,
        "is_subscribed" => commands::member::is_subscribed(&state, params).await,
        "get_member" => commands::member::get_member(&state, params).await,

        // Settlement
        "payout" => commands::settlement::payout(&state, params).await,
        "pending_payout" => commands::settlement::pending_payout(&state, params).await,
        "get_balance" => commands::settlement::get_balance(&state, params).await,

        // System
        "get_fee" => commands::system::get_fee(&state).await,
        "current_tick" => commands::system::current_tick(&state).await,
        "advance_ticks" => commands::system::advance_ticks(&state, params).await,

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}
