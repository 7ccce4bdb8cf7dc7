//! # Protocol Configuration & Constants
//!
//! Every magic number in Caliber lives here. Policy bounds, seeds for derived
//! addresses, default ports. If you're hardcoding one of these somewhere
//! else, move it here.
//!
//! The transfer window is the one constant that tests want to bend: the
//! `short-window` feature compresses it to 20 seconds so fixtures can watch
//! a deposit cross the boundary without sleeping for a day. Runtime code
//! should read the window from [`EscrowConfig`] rather than the constant, so
//! that the node can override it from the command line.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Policy Bounds
// ---------------------------------------------------------------------------

/// Maximum number of operators the vault admin may appoint.
pub const MAX_OPERATORS: usize = 5;

/// Maximum number of receivers a depositor may allow-list per deposit.
pub const MAX_ALLOWED_LIST: usize = 5;

/// Seconds after `deposited_at` during which operators may disburse.
/// One day on real networks.
#[cfg(not(feature = "short-window"))]
pub const TRANSFER_WINDOW_SECS: u64 = 24 * 60 * 60;

/// Compressed window for deterministic fixtures.
#[cfg(feature = "short-window")]
pub const TRANSFER_WINDOW_SECS: u64 = 20;

// ---------------------------------------------------------------------------
// Address Derivation Seeds
// ---------------------------------------------------------------------------

/// Seed for the vault's pooled-balance holder address.
pub const VAULT_SEED: &[u8] = b"VAULT";

/// Seed prefix for per-deposit addresses.
pub const USER_DEPOSIT_SEED: &[u8] = b"USER_DEPOSIT";

/// Domain separator mixed into every derived address so that no derivation
/// can land on the same 32 bytes as a user's Ed25519 public key by accident.
pub const DERIVATION_DOMAIN: &str = "caliber-escrow/derived-address/v1";

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full protocol version string.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Native asset display symbol.
pub const NATIVE_SYMBOL: &str = "CAL";

/// Native asset decimals. Display only; the protocol never divides.
pub const NATIVE_DECIMALS: u8 = 9;

// ---------------------------------------------------------------------------
// Network Parameters
// ---------------------------------------------------------------------------

/// Default JSON-RPC / REST port.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

/// Known network names. Only `devnet` enables the faucet.
pub const NETWORK_MAINNET: &str = "mainnet";
pub const NETWORK_TESTNET: &str = "testnet";
pub const NETWORK_DEVNET: &str = "devnet";

/// Returns `true` for the network names we recognize. We don't guess.
pub fn is_known_network(name: &str) -> bool {
    matches!(name, NETWORK_MAINNET | NETWORK_TESTNET | NETWORK_DEVNET)
}

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Runtime knobs of the escrow engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Length of the operator disbursement window, in seconds.
    pub transfer_window_secs: u64,
}

impl EscrowConfig {
    pub fn with_transfer_window(transfer_window_secs: u64) -> Self {
        Self {
            transfer_window_secs,
        }
    }
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            transfer_window_secs: TRANSFER_WINDOW_SECS,
        }
    }
}
