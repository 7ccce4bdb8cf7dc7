//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the escrow node's HTTP interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                      | Description                           |
//! |--------|---------------------------|---------------------------------------|
//! | GET    | `/health`                 | Liveness probe                        |
//! | GET    | `/status`                 | Node and vault summary                |
//! | GET    | `/vault`                  | Vault record                          |
//! | GET    | `/deposits/:owner`        | All deposits of an owner              |
//! | GET    | `/deposits/:owner/:salt`  | One deposit with its phase            |
//! | GET    | `/balances/:holder`       | Balance, `?token=<mint>` for tokens   |
//! | GET    | `/holdings/:holder`       | Every non-zero balance of a holder    |
//! | POST   | `/rpc`                    | JSON-RPC 2.0 gateway                  |
//! | GET    | `/ws`                     | WebSocket for accepted operations     |
//!
//! ## JSON-RPC Methods
//!
//! | Method               | Params                                  |
//! |----------------------|-----------------------------------------|
//! | `caliber_execute`    | `{signer, nonce, payload, signature}`   |
//! | `caliber_getVault`   | none                                    |
//! | `caliber_getDeposit` | `[owner, salt]`                         |
//! | `caliber_getBalance` | `[holder]` or `[holder, mint]`          |
//! | `caliber_airdrop`    | `[holder, amount]` or `[.., mint]`      |
//! | `caliber_version`    | none                                    |
//!
//! `payload` is the hex of the bincode encoding of an
//! [`Instruction`](caliber_contracts::Instruction); `signature` is the
//! signer's Ed25519 signature over the nonce and those bytes. Each signer's
//! nonce must be strictly greater than the last one the node accepted, so a
//! captured call cannot be replayed. Escrow rejections come back as code
//! `-32010` with the error name in `data`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use caliber_contracts::{Deposit, DepositKey, DepositPhase, Escrow, EscrowError, Instruction, Receipt};
use caliber_protocol::asset::{Asset, AssetLedger, AssetTransfer};
use caliber_protocol::clock::Clock;
use caliber_protocol::config::NETWORK_DEVNET;
use caliber_protocol::crypto::{CaliberKeypair, CaliberPublicKey, CaliberSignature};
use caliber_protocol::identity::{Address, CallerError, SignedCall};
use caliber_protocol::storage::CaliberDB;

use crate::metrics::SharedMetrics;

/// The escrow service as the node runs it. The clock is a trait object so
/// tests can drive time by hand.
pub type NodeEscrow = Escrow<CaliberDB, AssetLedger, Arc<dyn Clock>>;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone. Everything heavy sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Network identifier (e.g., "devnet", "testnet", "mainnet").
    pub network: String,
    /// Database handle, for the signer nonce tree.
    pub db: CaliberDB,
    /// The escrow service.
    pub escrow: Arc<NodeEscrow>,
    /// Broadcast channel for accepted-operation notifications.
    pub event_tx: broadcast::Sender<NodeEvent>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

/// Events pushed to WebSocket subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeEvent {
    /// An instruction was accepted and applied.
    #[serde(rename = "operation")]
    Operation(Receipt),
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
///
/// The returned router is ready to be served on the configured RPC port.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/vault", get(vault_handler))
        .route("/deposits/:owner", get(deposits_handler))
        .route("/deposits/:owner/:salt", get(deposit_handler))
        .route("/balances/:holder", get(balance_handler))
        .route("/holdings/:holder", get(holdings_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version. Must be "2.0".
    pub jsonrpc: String,
    /// The method to invoke.
    pub method: String,
    /// Method parameters (positional or named).
    pub params: Option<serde_json::Value>,
    /// Request identifier. Echoed back in the response.
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version. Always "2.0".
    pub jsonrpc: String,
    /// The result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// The error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Request identifier, echoed from the request.
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i32,
    /// Short human-readable error description.
    pub message: String,
    /// Optional structured error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Error codes beyond the JSON-RPC 2.0 reserved range.
pub mod codes {
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL: i32 = -32603;
    pub const NOT_FOUND: i32 = -32001;
    pub const FAUCET_DISABLED: i32 = -32003;
    pub const ESCROW_REJECTED: i32 = -32010;
    pub const BAD_SIGNATURE: i32 = -32011;
    pub const STALE_NONCE: i32 = -32012;
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, format!("Invalid params: {}", message.into()))
    }

    fn internal(message: impl std::fmt::Display) -> Self {
        Self::new(codes::INTERNAL, format!("Internal error: {}", message))
    }
}

impl From<EscrowError> for JsonRpcError {
    fn from(err: EscrowError) -> Self {
        match err {
            EscrowError::Storage(msg) => Self::internal(msg),
            other => Self {
                code: codes::ESCROW_REJECTED,
                message: other.to_string(),
                data: Some(serde_json::json!(other.name())),
            },
        }
    }
}

/// Params of `caliber_execute`. Also what `caliber-node sign` prints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteParams {
    /// Hex-encoded Ed25519 public key of the caller.
    pub signer: String,
    /// Per-signer nonce, strictly increasing.
    pub nonce: u64,
    /// Hex-encoded bincode of the instruction.
    pub payload: String,
    /// Hex-encoded signature over nonce and payload.
    pub signature: String,
}

impl ExecuteParams {
    pub fn sign(
        keypair: &CaliberKeypair,
        nonce: u64,
        instruction: &Instruction,
    ) -> Result<Self, bincode::Error> {
        let call = SignedCall::sign(keypair, nonce, instruction.to_bytes()?);
        Ok(Self {
            signer: call.signer.to_hex(),
            nonce: call.nonce,
            payload: hex::encode(&call.payload),
            signature: call.signature.to_hex(),
        })
    }

    fn into_signed_call(self) -> Result<SignedCall, JsonRpcError> {
        let signer = CaliberPublicKey::from_hex(&self.signer)
            .map_err(|_| JsonRpcError::invalid_params("signer must be a 32-byte hex public key"))?;
        let payload = hex::decode(&self.payload)
            .map_err(|_| JsonRpcError::invalid_params("payload must be hex"))?;
        let signature = CaliberSignature::from_hex(&self.signature)
            .map_err(|_| JsonRpcError::invalid_params("signature must be 64 hex-encoded bytes"))?;
        Ok(SignedCall {
            signer,
            nonce: self.nonce,
            payload,
            signature,
        })
    }
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Network identifier.
    pub network: String,
    /// Whether the vault has been initialized.
    pub vault_initialized: bool,
    /// Vault admin, once initialized.
    pub admin: Option<Address>,
    /// Number of registered operators.
    pub operators: usize,
    /// Length of the operator transfer window, in seconds.
    pub transfer_window_secs: u64,
    /// Holder address of pooled deposits.
    pub pool: Address,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// A deposit as the API presents it: the record plus derived fields.
#[derive(Debug, Serialize, Deserialize)]
pub struct DepositView {
    #[serde(flatten)]
    pub deposit: Deposit,
    /// Derived account address of the deposit.
    pub account: Address,
    /// Current phase, derived from the node's clock.
    pub phase: DepositPhase,
    /// Last unix second at which operators may disburse.
    pub window_ends_at: u64,
}

impl DepositView {
    fn new(escrow: &NodeEscrow, deposit: Deposit) -> Self {
        Self {
            account: deposit.key().address(),
            phase: escrow.phase(&deposit),
            window_ends_at: escrow.window_end(&deposit),
            deposit,
        }
    }
}

/// Response payload for `GET /balances/:holder`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub holder: Address,
    pub asset: Asset,
    pub balance: u64,
}

/// Query string of `GET /balances/:holder`.
#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    /// Mint of a fungible token. Native balance when absent.
    pub token: Option<String>,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: error.into() })).into_response()
}

fn parse_address(s: &str) -> Result<Address, Response> {
    s.parse::<Address>()
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("invalid address {}: {}", s, e)))
}

fn parse_asset(token: Option<&str>) -> Result<Asset, Response> {
    match token {
        None => Ok(Asset::Native),
        Some(mint) => parse_address(mint).map(Asset::Fungible),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
///
/// This is the liveness probe for orchestrators (k8s, systemd, etc.).
/// It intentionally does not check internal subsystem health — that
/// belongs in `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — returns node and vault summary.
async fn status_handler(State(state): State<AppState>) -> Response {
    let vault = match state.escrow.get_vault() {
        Ok(v) => v,
        Err(e) => {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
        }
    };

    let resp = StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        vault_initialized: vault.is_some(),
        admin: vault.as_ref().map(|v| v.admin),
        operators: vault.as_ref().map_or(0, |v| v.operators.len()),
        transfer_window_secs: state.escrow.config().transfer_window_secs,
        pool: state.escrow.pool_address(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    Json(resp).into_response()
}

/// `GET /vault` — the vault record, 404 before initialization.
async fn vault_handler(State(state): State<AppState>) -> Response {
    match state.escrow.get_vault() {
        Ok(Some(vault)) => Json(vault).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Vault not initialized"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e)),
    }
}

/// `GET /deposits/:owner` — every deposit of `owner`, ascending by salt.
async fn deposits_handler(Path(owner): Path<String>, State(state): State<AppState>) -> Response {
    let owner = match parse_address(&owner) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    match state.escrow.list_deposits(&owner) {
        Ok(deposits) => {
            let views: Vec<DepositView> = deposits
                .into_iter()
                .map(|d| DepositView::new(&state.escrow, d))
                .collect();
            Json(views).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e)),
    }
}

/// `GET /deposits/:owner/:salt` — one deposit, 404 if absent.
async fn deposit_handler(
    Path((owner, salt)): Path<(String, u64)>,
    State(state): State<AppState>,
) -> Response {
    let owner = match parse_address(&owner) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    match state.escrow.get_deposit(&DepositKey::new(owner, salt)) {
        Ok(Some(d)) => Json(DepositView::new(&state.escrow, d)).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("Deposit not found: {}/{}", owner, salt),
        ),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e)),
    }
}

/// `GET /balances/:holder` — a holder's balance of one asset. Unknown
/// holders read as zero.
async fn balance_handler(
    Path(holder): Path<String>,
    Query(query): Query<BalanceQuery>,
    State(state): State<AppState>,
) -> Response {
    let holder = match parse_address(&holder) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let asset = match parse_asset(query.token.as_deref()) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    match state.escrow.ledger().balance_of(&asset, &holder) {
        Ok(balance) => Json(BalanceResponse {
            holder,
            asset,
            balance,
        })
        .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Ledger error: {}", e)),
    }
}

/// `GET /holdings/:holder` — every non-zero balance of a holder.
async fn holdings_handler(Path(holder): Path<String>, State(state): State<AppState>) -> Response {
    let holder = match parse_address(&holder) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    match state.escrow.ledger().holdings(&holder) {
        Ok(holdings) => {
            let body: Vec<BalanceResponse> = holdings
                .into_iter()
                .map(|(asset, balance)| BalanceResponse {
                    holder,
                    asset,
                    balance,
                })
                .collect();
            Json(body).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Ledger error: {}", e)),
    }
}

/// `POST /rpc` — JSON-RPC 2.0 gateway.
///
/// Routes method calls to internal handlers. Unknown methods return
/// error code -32601 (Method not found).
async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    if req.jsonrpc != "2.0" {
        return Json(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(JsonRpcError::new(
                codes::INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"",
            )),
            id: req.id,
        });
    }

    let params = req.params.as_ref();
    let outcome = match req.method.as_str() {
        // Storage I/O and lock waits stay off the async workers.
        "caliber_execute" => {
            let state = state.clone();
            let params = req.params.clone();
            tokio::task::spawn_blocking(move || rpc_execute(&state, params.as_ref()))
                .await
                .unwrap_or_else(|e| Err(JsonRpcError::internal(e)))
        }
        "caliber_getVault" => state
            .escrow
            .get_vault()
            .map_err(JsonRpcError::from)
            .and_then(to_json),
        "caliber_getDeposit" => rpc_get_deposit(&state, params),
        "caliber_getBalance" => rpc_get_balance(&state, params),
        "caliber_airdrop" => rpc_airdrop(&state, params),
        "caliber_version" => Ok(serde_json::json!(state.version)),
        _ => Err(JsonRpcError::new(
            codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", req.method),
        )),
    };

    let (result, error) = match outcome {
        Ok(value) => (Some(value), None),
        Err(e) => (None, Some(e)),
    };
    Json(JsonRpcResponse {
        jsonrpc: "2.0".into(),
        result,
        error,
        id: req.id,
    })
}

fn to_json<T: Serialize>(value: T) -> Result<serde_json::Value, JsonRpcError> {
    serde_json::to_value(value)
        .map_err(|e| JsonRpcError::new(codes::INTERNAL, format!("Internal error: {}", e)))
}

/// Positional param `idx` as a string.
fn str_param(params: Option<&serde_json::Value>, idx: usize) -> Option<&str> {
    params
        .and_then(|p| p.as_array())
        .and_then(|arr| arr.get(idx))
        .and_then(|v| v.as_str())
}

fn u64_param(params: Option<&serde_json::Value>, idx: usize) -> Option<u64> {
    params
        .and_then(|p| p.as_array())
        .and_then(|arr| arr.get(idx))
        .and_then(|v| v.as_u64())
}

fn address_param(params: Option<&serde_json::Value>, idx: usize, what: &str) -> Result<Address, JsonRpcError> {
    str_param(params, idx)
        .ok_or_else(|| JsonRpcError::invalid_params(format!("expected {} at position {}", what, idx)))?
        .parse()
        .map_err(|e| JsonRpcError::invalid_params(format!("{}: {}", what, e)))
}

/// Optional mint at position `idx`; native when absent.
fn asset_param(params: Option<&serde_json::Value>, idx: usize) -> Result<Asset, JsonRpcError> {
    match str_param(params, idx) {
        None => Ok(Asset::Native),
        Some(_) => address_param(params, idx, "mint").map(Asset::Fungible),
    }
}

/// `caliber_execute` — verify, decode, apply, record, broadcast.
fn rpc_execute(
    state: &AppState,
    params: Option<&serde_json::Value>,
) -> Result<serde_json::Value, JsonRpcError> {
    let params: ExecuteParams = params
        .cloned()
        .ok_or_else(|| JsonRpcError::invalid_params("expected {signer, nonce, payload, signature}"))
        .and_then(|p| {
            serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
        })?;
    let call = params.into_signed_call()?;

    let caller = match call.verify() {
        Ok(addr) => addr,
        Err(e) => {
            let reason = match e {
                CallerError::InvalidPublicKey => "invalid_public_key",
                CallerError::MalformedSignature => "malformed_signature",
                CallerError::BadSignature => "bad_signature",
                CallerError::ZeroNonce => "zero_nonce",
            };
            state.metrics.bad_signatures_total.with_label_values(&[reason]).inc();
            tracing::warn!(signer = %call.signer, error = %e, "rejected signed call");
            return Err(JsonRpcError::new(codes::BAD_SIGNATURE, e.to_string()));
        }
    };

    let instruction = Instruction::from_bytes(&call.payload)
        .map_err(|e| JsonRpcError::invalid_params(format!("payload is not an instruction: {}", e)))?;
    let name = instruction.name();

    match state.db.advance_nonce(caller.as_bytes(), call.nonce) {
        Ok(true) => {}
        Ok(false) => {
            state.metrics.bad_signatures_total.with_label_values(&["stale_nonce"]).inc();
            tracing::warn!(%caller, nonce = call.nonce, "rejected replayed or stale call");
            return Err(JsonRpcError::new(
                codes::STALE_NONCE,
                format!("nonce {} is not above the last accepted nonce", call.nonce),
            ));
        }
        Err(e) => return Err(JsonRpcError::internal(e)),
    }

    let timer = state.metrics.operation_latency_seconds.start_timer();
    let result = state.escrow.execute(&caller, instruction);
    timer.observe_duration();

    match result {
        Ok(receipt) => {
            state.metrics.operations_total.with_label_values(&[name]).inc();
            if matches!(name, "initialize_vault" | "add_operator" | "remove_operator") {
                if let Ok(Some(vault)) = state.escrow.get_vault() {
                    state.metrics.operators.set(vault.operators.len() as i64);
                }
            }
            // No subscribers is fine.
            let _ = state.event_tx.send(NodeEvent::Operation(receipt.clone()));
            to_json(receipt)
        }
        Err(e) => {
            state
                .metrics
                .rejected_operations_total
                .with_label_values(&[name, e.name()])
                .inc();
            Err(e.into())
        }
    }
}

/// `caliber_getDeposit` — params `[owner, salt]`.
fn rpc_get_deposit(
    state: &AppState,
    params: Option<&serde_json::Value>,
) -> Result<serde_json::Value, JsonRpcError> {
    let owner = address_param(params, 0, "owner")?;
    let salt = u64_param(params, 1)
        .ok_or_else(|| JsonRpcError::invalid_params("expected [owner, salt]"))?;
    match state.escrow.get_deposit(&DepositKey::new(owner, salt))? {
        Some(d) => to_json(DepositView::new(&state.escrow, d)),
        None => Err(JsonRpcError::new(
            codes::NOT_FOUND,
            format!("Deposit not found: {}/{}", owner, salt),
        )),
    }
}

/// `caliber_getBalance` — params `[holder]` or `[holder, mint]`.
fn rpc_get_balance(
    state: &AppState,
    params: Option<&serde_json::Value>,
) -> Result<serde_json::Value, JsonRpcError> {
    let holder = address_param(params, 0, "holder")?;
    let asset = asset_param(params, 1)?;
    let balance = state
        .escrow
        .ledger()
        .balance_of(&asset, &holder)
        .map_err(|e| JsonRpcError::from(EscrowError::from(e)))?;
    to_json(BalanceResponse {
        holder,
        asset,
        balance,
    })
}

/// `caliber_airdrop` — devnet faucet. Params `[holder, amount]` or
/// `[holder, amount, mint]`.
fn rpc_airdrop(
    state: &AppState,
    params: Option<&serde_json::Value>,
) -> Result<serde_json::Value, JsonRpcError> {
    if state.network != NETWORK_DEVNET {
        return Err(JsonRpcError::new(
            codes::FAUCET_DISABLED,
            format!("Airdrop is only available on {}", NETWORK_DEVNET),
        ));
    }
    let holder = address_param(params, 0, "holder")?;
    let amount = u64_param(params, 1)
        .ok_or_else(|| JsonRpcError::invalid_params("expected [holder, amount]"))?;
    let asset = asset_param(params, 2)?;

    let balance = state
        .escrow
        .ledger()
        .mint(&asset, &holder, amount)
        .map_err(|e| JsonRpcError::from(EscrowError::from(e)))?;
    tracing::info!(%holder, %asset, amount, "airdrop");
    to_json(BalanceResponse {
        holder,
        asset,
        balance,
    })
}

/// `GET /ws` — WebSocket upgrade for live event streaming.
///
/// Clients receive a JSON-encoded [`NodeEvent`] for every accepted
/// instruction. The connection is read-only from the server's perspective;
/// client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {
                        // Push-only channel.
                    }
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
