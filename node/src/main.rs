// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Caliber Escrow Node
//!
//! Entry point for the `caliber-node` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the escrow database, and serves
//! the HTTP/WS API.
//!
//! Subcommands:
//!
//! - `run`     — start the node
//! - `init`    — initialize data directory and generate an admin key
//! - `keygen`  — print a fresh keypair as JSON
//! - `sign`    — sign an instruction into `caliber_execute` params
//! - `status`  — query a running node's status endpoint
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use caliber_contracts::{Escrow, Instruction};
use caliber_protocol::asset::AssetLedger;
use caliber_protocol::clock::{Clock, SystemClock};
use caliber_protocol::config::{is_known_network, EscrowConfig, PROTOCOL_VERSION};
use caliber_protocol::crypto::CaliberKeypair;
use caliber_protocol::storage::CaliberDB;

use cli::{CaliberNodeCli, Commands};
use logging::LogFormat;
use metrics::NodeMetrics;

/// Broadcast channel capacity for live event streaming.
/// 256 is large enough to absorb short bursts without dropping events
/// for connected WebSocket clients.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Metadata key under which the database remembers its network.
const NETWORK_META_KEY: &str = "network";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CaliberNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Keygen => keygen(),
        Commands::Sign(args) => sign_instruction(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Expands a leading `~` to `$HOME`.
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Opens the escrow database, binding it to `network` on first use.
///
/// A database created for one network refuses to serve another.
fn open_database(data_dir: &Path, network: &str) -> Result<CaliberDB> {
    let db_path = data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;

    let db = CaliberDB::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;

    match db.get_meta(NETWORK_META_KEY)? {
        Some(stored) if stored != network.as_bytes() => anyhow::bail!(
            "database at {} belongs to network {}, not {}",
            db_path.display(),
            String::from_utf8_lossy(&stored),
            network
        ),
        Some(_) => {}
        None => db.set_meta(NETWORK_META_KEY, network.as_bytes())?,
    }
    tracing::info!(path = %db_path.display(), "database opened");
    Ok(db)
}

/// Starts the node: API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "caliber_node=info,caliber_contracts=info,caliber_protocol=info,tower_http=debug",
        LogFormat::from_str_lossy(&args.log_format),
    );

    if !is_known_network(&args.network) {
        anyhow::bail!("unknown network: {}", args.network);
    }

    let data_dir = expand_home(&args.data_dir);
    let config = match args.transfer_window {
        Some(secs) => EscrowConfig::with_transfer_window(secs),
        None => EscrowConfig::default(),
    };

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        network = %args.network,
        transfer_window_secs = config.transfer_window_secs,
        data_dir = %data_dir.display(),
        "starting caliber-node"
    );

    // --- Persistent storage ---
    let db = open_database(&data_dir, &args.network)?;

    // --- Escrow ---
    let ledger = AssetLedger::new(&db);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let escrow = Arc::new(Escrow::new(db.clone(), ledger, clock, config));
    tracing::info!(pool = %escrow.pool_address(), "escrow ready");

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());
    if let Some(vault) = escrow.get_vault()? {
        node_metrics.operators.set(vault.operators.len() as i64);
        tracing::info!(admin = %vault.admin, operators = vault.operators.len(), "vault loaded");
    }

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), PROTOCOL_VERSION),
        network: args.network.clone(),
        db: db.clone(),
        escrow,
        event_tx,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    db.flush().context("failed to flush database")?;
    tracing::info!("caliber-node stopped");
    Ok(())
}

/// Initializes a new node data directory and generates an admin keypair.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("caliber_node=info", LogFormat::Pretty);

    if !is_known_network(&args.network) {
        anyhow::bail!("unknown network: {}", args.network);
    }

    let data_dir = expand_home(&args.data_dir);
    tracing::info!(data_dir = %data_dir.display(), network = %args.network, "initializing node");

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
    let db = open_database(&data_dir, &args.network)?;
    db.flush()?;

    let keypair = CaliberKeypair::generate();
    let key_path = data_dir.join("admin.key");
    if key_path.exists() {
        anyhow::bail!("refusing to overwrite existing key at {}", key_path.display());
    }
    std::fs::write(&key_path, keypair.to_hex())
        .with_context(|| format!("failed to write admin key to {}", key_path.display()))?;

    // Restrict permissions on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!(
        address = %keypair.address(),
        key_path = %key_path.display(),
        "admin keypair generated"
    );

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Network        : {}", args.network);
    println!("  Admin key      : {}", key_path.display());
    println!("  Admin address  : {}", keypair.address());

    Ok(())
}

/// Prints a freshly generated keypair as JSON on stdout.
fn keygen() -> Result<()> {
    let keypair = CaliberKeypair::generate();
    let out = serde_json::json!({
        "address": keypair.address(),
        "public_key": keypair.public_key().to_hex(),
        "secret_key": keypair.to_hex(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Signs a JSON instruction and prints the `caliber_execute` params.
fn sign_instruction(args: cli::SignArgs) -> Result<()> {
    let keypair = CaliberKeypair::from_hex(&args.secret_key)
        .map_err(|e| anyhow::anyhow!("invalid secret key: {}", e))?;
    let instruction: Instruction =
        serde_json::from_str(&args.instruction).context("invalid instruction JSON")?;
    // Millisecond timestamps keep successive signings increasing.
    let nonce = match args.nonce {
        Some(n) => n,
        None => chrono::Utc::now().timestamp_millis().max(1) as u64,
    };
    let params = api::ExecuteParams::sign(&keypair, nonce, &instruction)
        .context("failed to encode instruction")?;
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.rpc_url.trim_end_matches('/'));
    let body = http_get(&url).await?;
    println!("{}", body);
    Ok(())
}

/// Plain HTTP/1.1 GET over a tokio TCP stream. Enough for `/status`.
async fn http_get(url: &str) -> Result<String> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let target = Target::parse(url).map_err(|e| anyhow::anyhow!("invalid URL: {}", e))?;
    let addr = format!("{}:{}", target.host, target.port);
    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        target.path, target.host,
    );
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    // Everything after the first blank line is the body.
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_else(|| response.to_string());

    Ok(body)
}

/// Host, port and path of an `http://` URL.
#[derive(Debug, PartialEq, Eq)]
struct Target {
    host: String,
    port: u16,
    path: String,
}

impl Target {
    fn parse(s: &str) -> Result<Self, String> {
        let rest = s.strip_prefix("http://").unwrap_or(s);
        if rest.starts_with("https://") {
            return Err("https is not supported".into());
        }

        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        let (host, port) = match authority.rfind(':') {
            Some(i) => {
                let p = authority[i + 1..]
                    .parse::<u16>()
                    .map_err(|e| format!("bad port: {}", e))?;
                (&authority[..i], p)
            }
            None => (authority, 80),
        };
        if host.is_empty() {
            return Err("missing host".into());
        }

        Ok(Target {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("caliber-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol     {}", PROTOCOL_VERSION);
    println!("rustc        {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
