//! The seam between the ledger-independent engine and each ledger family.

use alloy::primitives::U256;
use async_trait::async_trait;

use crate::error::Error;
use crate::identity::Identity;
use crate::payment::{PaymentProof, PaymentRequirement};
use crate::response::{SettlementResult, VerificationResult};

/// Outcome of a family-specific signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureCheck {
    /// The purported payer authored exactly this payload.
    Authenticated(Identity),
    /// Well-formed signature that does not authenticate the payer.
    Invalid,
    /// The authorization material itself is unusable (wrong length, bad
    /// encoding, unparseable transaction).
    Malformed(String),
}

/// One ledger family's view of accounts, signatures, balances and transfers.
///
/// Adapters are selected once by the router via the capability registry —
/// never re-derived per call site — and own their family's RPC transport and
/// signing material. Settlement submissions that spend the facilitator's own
/// key sequence must be serialized inside the adapter (single writer per
/// `(ledger, signing key)`).
#[async_trait]
pub trait LedgerAdapter: Send + Sync {
    /// The ledger identifier this adapter serves, e.g. `eip155:8453`.
    fn ledger(&self) -> &str;

    /// The facilitator's own identity on this ledger.
    fn facilitator_identity(&self) -> &Identity;

    /// Full off-ledger verification: invariants, signature, solvency.
    async fn verify(
        &self,
        proof: &PaymentProof,
        requirement: &PaymentRequirement,
    ) -> Result<VerificationResult, Error>;

    /// Execute (or simulate) the authorized transfer exactly once.
    async fn settle(
        &self,
        proof: &PaymentProof,
        requirement: &PaymentRequirement,
    ) -> Result<SettlementResult, Error>;

    /// Best-effort solvency read. Advisory only — the ledger itself is the
    /// final arbiter at settlement time.
    async fn balance(&self, owner: &Identity, asset: &str) -> Result<U256, Error>;

    /// Cheap reachability probe for health reporting.
    async fn health(&self) -> Result<(), Error>;
}

/// Synthesize the reserved simulated settlement reference for a payload.
///
/// The `sim-` prefix is a format no real ledger emits, so simulated and real
/// settlements can never be conflated.
pub fn simulated_reference(ledger: &str, payer: &Identity, payee: &Identity, amount: &str, nonce: &str) -> String {
    use alloy::primitives::keccak256;
    let preimage = format!(
        "{ledger}|{}|{}|{amount}|{nonce}",
        payer.canonical(),
        payee.canonical()
    );
    format!("sim-{}", alloy::hex::encode(keccak256(preimage.as_bytes())))
}
