//! Immutable facilitator configuration.
//!
//! Built once by the operator (typically from the environment) and handed to
//! [`crate::Facilitator::new`]; nothing here is ambient or mutable after
//! construction. A ledger is supported exactly when a complete entry for it
//! appears in `ledgers` — each variant's fields are required, so a
//! half-configured ledger cannot exist.

/// Selects real on-ledger settlement or an offline simulation.
///
/// Simulated settlement performs no network calls and synthesizes a
/// reference in a reserved format (`sim-…`) that no real ledger produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementMode {
    Real,
    Simulated,
}

/// Per-ledger configuration, one variant per ledger family.
#[derive(Debug, Clone)]
pub enum LedgerConfig {
    /// Account-abstracted EVM family: typed-data ECDSA authorizations settled
    /// through a standing ERC-20 allowance to the facilitator's key.
    DelegatedEvm {
        /// CAIP-2 style identifier, e.g. `eip155:8453`.
        ledger: String,
        chain_id: u64,
        rpc_url: String,
        /// Hex-encoded secp256k1 private key. The derived address is the
        /// facilitator identity for this ledger.
        signer_key: String,
        /// EIP-712 domain name/version the payer clients sign under.
        domain_name: String,
        domain_version: String,
    },
    /// Native-balance EVM family: the payload carries a fully pre-signed
    /// transaction which the facilitator only rebroadcasts. No facilitator
    /// signing key is involved in settlement.
    NativeEvm {
        ledger: String,
        chain_id: u64,
        rpc_url: String,
        /// The facilitator identity payer clients and requirements refer to.
        facilitator_address: String,
    },
    /// SPL-token family: raw-message EdDSA authorizations settled through a
    /// standing token delegate approval to the facilitator's ed25519 key.
    SplToken {
        ledger: String,
        rpc_url: String,
        /// Base58-encoded 32-byte ed25519 secret seed.
        signer_key: String,
        /// Token program the transfer instruction targets.
        token_program: String,
    },
}

impl LedgerConfig {
    pub fn ledger(&self) -> &str {
        match self {
            LedgerConfig::DelegatedEvm { ledger, .. } => ledger,
            LedgerConfig::NativeEvm { ledger, .. } => ledger,
            LedgerConfig::SplToken { ledger, .. } => ledger,
        }
    }
}

/// Everything the facilitator needs, fixed at construction.
#[derive(Debug, Clone)]
pub struct FacilitatorConfig {
    pub mode: SettlementMode,
    pub ledgers: Vec<LedgerConfig>,
}

impl FacilitatorConfig {
    pub fn new(mode: SettlementMode, ledgers: Vec<LedgerConfig>) -> Self {
        Self { mode, ledgers }
    }

    /// Convenience constructor for offline environments and tests.
    pub fn simulated(ledgers: Vec<LedgerConfig>) -> Self {
        Self::new(SettlementMode::Simulated, ledgers)
    }
}
