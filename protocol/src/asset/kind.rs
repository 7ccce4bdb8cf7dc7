//! # Asset Kinds
//!
//! The vault holds two kinds of value: the ledger's native coin, and
//! fungible tokens identified by their mint address. A deposit records which
//! one it holds, and every movement of its funds uses the same kind.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::Address;

/// What a deposit holds.
///
/// JSON form is `"native"` or `{"fungible": "<mint base58>"}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    /// The native coin.
    Native,
    /// A fungible token, by mint.
    Fungible(Address),
}

impl Asset {
    /// One-byte discriminant used in storage keys.
    pub fn tag(&self) -> u8 {
        match self {
            Asset::Native => 0,
            Asset::Fungible(_) => 1,
        }
    }

    pub fn mint(&self) -> Option<&Address> {
        match self {
            Asset::Native => None,
            Asset::Fungible(mint) => Some(mint),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }

    /// Key prefix shared by every balance of this asset.
    pub fn key_prefix(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(33);
        key.push(self.tag());
        if let Some(mint) = self.mint() {
            key.extend_from_slice(mint.as_bytes());
        }
        key
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Native => write!(f, "native"),
            Asset::Fungible(mint) => write!(f, "fungible:{}", mint),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_form() {
        assert_eq!(serde_json::to_string(&Asset::Native).unwrap(), r#""native""#);

        let mint = Address::from_bytes([7u8; 32]);
        let json = serde_json::to_string(&Asset::Fungible(mint)).unwrap();
        assert_eq!(json, format!(r#"{{"fungible":"{}"}}"#, mint.to_base58()));
        assert_eq!(serde_json::from_str::<Asset>(&json).unwrap(), Asset::Fungible(mint));
    }

    #[test]
    fn prefixes_do_not_collide() {
        let a = Asset::Fungible(Address::from_bytes([1u8; 32]));
        let b = Asset::Fungible(Address::from_bytes([2u8; 32]));
        assert_eq!(Asset::Native.key_prefix(), vec![0]);
        assert_eq!(a.key_prefix().len(), 33);
        assert_ne!(a.key_prefix(), b.key_prefix());
    }
}
