use serde::{Deserialize, Serialize};
use std::fmt;

/// A ledger account identity.
///
/// Holds either a 0x-prefixed hex EVM address or a base58 Solana public key,
/// kept in its wire form. Hex identities compare case-insensitively (EIP-55
/// checksumming changes letter case, not identity); base58 compares exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

/// Sentinel used by result reporting when the payer cannot be recovered.
pub const UNKNOWN_IDENTITY: &str = "unknown";

impl Identity {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The sentinel identity reported when a proof is too damaged to name
    /// its payer.
    pub fn unknown() -> Self {
        Self(UNKNOWN_IDENTITY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_hex(&self) -> bool {
        self.0.starts_with("0x") || self.0.starts_with("0X")
    }

    /// Canonical form used in replay keys and signing messages: lowercased
    /// for hex identities, verbatim for base58.
    pub fn canonical(&self) -> String {
        if self.is_hex() {
            self.0.to_ascii_lowercase()
        } else {
            self.0.clone()
        }
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        if self.is_hex() && other.is_hex() {
            self.0.eq_ignore_ascii_case(&other.0)
        } else {
            self.0 == other.0
        }
    }
}

impl Eq for Identity {}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<alloy::primitives::Address> for Identity {
    fn from(addr: alloy::primitives::Address) -> Self {
        Self(format!("{addr:#x}"))
    }
}
