//! # CLI Interface
//!
//! Defines the command-line argument structure for `caliber-node` using
//! `clap` derive. Subcommands: `run`, `init`, `keygen`, `sign`, `status`
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use caliber_protocol::config::{DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT};

/// Caliber escrow vault node.
///
/// Hosts the escrow vault: verifies signed instructions, applies them,
/// serves the JSON-RPC API and pushes accepted operations over WebSocket.
#[derive(Parser, Debug)]
#[command(
    name = "caliber-node",
    about = "Caliber escrow vault node",
    version,
    propagate_version = true
)]
pub struct CaliberNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the Caliber node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Initialize a data directory and generate an admin keypair.
    Init(InitArgs),
    /// Generate a fresh keypair and print it.
    Keygen,
    /// Sign an instruction and print the `caliber_execute` params.
    Sign(SignArgs),
    /// Query the status of a running node via its RPC endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node data directory where the escrow database lives.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "CALIBER_DATA_DIR", default_value = "~/.caliber")]
    pub data_dir: PathBuf,

    /// Network name: mainnet, testnet, or devnet. Only devnet has a faucet.
    #[arg(long, env = "CALIBER_NETWORK", default_value = "devnet")]
    pub network: String,

    /// Port for the JSON-RPC and REST API.
    #[arg(long, env = "CALIBER_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "CALIBER_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Override the operator transfer window, in seconds.
    #[arg(long, env = "CALIBER_TRANSFER_WINDOW")]
    pub transfer_window: Option<u64>,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "CALIBER_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "CALIBER_DATA_DIR", default_value = "~/.caliber")]
    pub data_dir: PathBuf,

    /// Network to configure for: mainnet, testnet, or devnet.
    #[arg(long, env = "CALIBER_NETWORK", default_value = "devnet")]
    pub network: String,
}

/// Arguments for the `sign` subcommand.
#[derive(Parser, Debug)]
pub struct SignArgs {
    /// Hex-encoded Ed25519 secret key of the caller.
    #[arg(long, env = "CALIBER_SECRET_KEY")]
    pub secret_key: String,

    /// The instruction as JSON, e.g. `{"add_operator":{"operator":"<base58>"}}`.
    #[arg(long)]
    pub instruction: String,

    /// Call nonce. Must exceed the last nonce the node accepted from this
    /// key. Defaults to the current unix time in milliseconds.
    #[arg(long)]
    pub nonce: Option<u64>,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// RPC endpoint of the running node.
    #[arg(long, env = "CALIBER_RPC_URL", default_value = "http://127.0.0.1:9841")]
    pub rpc_url: String,
}
