//! Top-level entry point: decode, gate, dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use crate::checks::InvalidReason;
use crate::codec;
use crate::config::{FacilitatorConfig, LedgerConfig};
use crate::error::Error;
use crate::evm::{DelegatedEvmAdapter, NativeEvmAdapter};
use crate::ledger::LedgerAdapter;
use crate::payment::{PaymentProof, PaymentRequirement};
use crate::registry::CapabilityRegistry;
use crate::replay::ReplayStore;
use crate::response::{SettlementResult, VerificationResult};
use crate::spl::SplTokenAdapter;
use crate::{EXACT_SCHEME, PROTOCOL_VERSION};

/// The verification-and-settlement engine.
///
/// Holds no per-request state: each call decodes its proof, runs the gates
/// below in order, short-circuiting on the first failure, and dispatches to
/// the adapter selected once through the capability registry. Routing is a
/// pure lookup — no retries, no fallback ledger.
pub struct Facilitator {
    registry: CapabilityRegistry,
    adapters: HashMap<String, Box<dyn LedgerAdapter>>,
}

impl Facilitator {
    /// Build the engine from an immutable configuration. Fails fast on
    /// unusable config (bad keys, bad URLs) rather than at first request.
    pub fn new(config: FacilitatorConfig, replay: Arc<dyn ReplayStore>) -> Result<Self, Error> {
        let registry = CapabilityRegistry::from_config(&config);

        let mut adapters: HashMap<String, Box<dyn LedgerAdapter>> = HashMap::new();
        for entry in &config.ledgers {
            let adapter: Box<dyn LedgerAdapter> = match entry {
                LedgerConfig::DelegatedEvm {
                    ledger,
                    chain_id,
                    rpc_url,
                    signer_key,
                    domain_name,
                    domain_version,
                } => Box::new(DelegatedEvmAdapter::connect(
                    ledger.clone(),
                    *chain_id,
                    rpc_url,
                    signer_key,
                    domain_name.clone(),
                    domain_version.clone(),
                    config.mode,
                    Arc::clone(&replay),
                )?),
                LedgerConfig::NativeEvm {
                    ledger,
                    chain_id,
                    rpc_url,
                    facilitator_address,
                } => Box::new(NativeEvmAdapter::connect(
                    ledger.clone(),
                    *chain_id,
                    rpc_url,
                    facilitator_address,
                    config.mode,
                    Arc::clone(&replay),
                )?),
                LedgerConfig::SplToken {
                    ledger,
                    rpc_url,
                    signer_key,
                    token_program,
                } => Box::new(SplTokenAdapter::connect(
                    ledger.clone(),
                    rpc_url,
                    signer_key,
                    token_program,
                    config.mode,
                    Arc::clone(&replay),
                )?),
            };

            if adapters.insert(entry.ledger().to_string(), adapter).is_some() {
                return Err(Error::Config(format!(
                    "duplicate ledger configured: {}",
                    entry.ledger()
                )));
            }
        }

        Ok(Self { registry, adapters })
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Gates shared by verify and settle. Returns the adapter on success,
    /// the rejection reason otherwise. No adapter — and so no signing key —
    /// is touched for an unsupported proof.
    fn route(
        &self,
        proof: &PaymentProof,
        requirement: &PaymentRequirement,
    ) -> Result<&dyn LedgerAdapter, InvalidReason> {
        if proof.protocol_version != PROTOCOL_VERSION {
            return Err(InvalidReason::UnsupportedVersion(proof.protocol_version));
        }
        if proof.scheme != EXACT_SCHEME {
            return Err(InvalidReason::UnsupportedScheme(proof.scheme.clone()));
        }
        if !self.registry.is_supported(&proof.scheme, &proof.ledger) {
            return Err(InvalidReason::UnsupportedLedger(proof.ledger.clone()));
        }
        if requirement.scheme != proof.scheme {
            return Err(InvalidReason::RequirementMismatch(format!(
                "scheme {} vs {}",
                requirement.scheme, proof.scheme
            )));
        }
        if requirement.ledger != proof.ledger {
            return Err(InvalidReason::RequirementMismatch(format!(
                "ledger {} vs {}",
                requirement.ledger, proof.ledger
            )));
        }

        self.adapters
            .get(&proof.ledger)
            .map(|a| a.as_ref())
            .ok_or_else(|| InvalidReason::UnsupportedLedger(proof.ledger.clone()))
    }

    /// Verify a proof header against a requirement.
    ///
    /// Business rejections come back as `is_valid = false` results; only
    /// decode and internal faults are `Err`.
    pub async fn verify(
        &self,
        header: &str,
        requirement: &PaymentRequirement,
    ) -> Result<VerificationResult, Error> {
        let proof = codec::decode_proof(header)?;

        match self.route(&proof, requirement) {
            Ok(adapter) => adapter.verify(&proof, requirement).await,
            Err(reason) => {
                tracing::info!(
                    ledger = %proof.ledger,
                    reason = %reason,
                    "verification rejected before dispatch"
                );
                Ok(VerificationResult::rejected(
                    proof.payload.payer.clone(),
                    reason,
                ))
            }
        }
    }

    /// Settle a proof header against a requirement, exactly once.
    pub async fn settle(
        &self,
        header: &str,
        requirement: &PaymentRequirement,
    ) -> Result<SettlementResult, Error> {
        let proof = codec::decode_proof(header)?;

        match self.route(&proof, requirement) {
            Ok(adapter) => adapter.settle(&proof, requirement).await,
            Err(reason) => {
                tracing::info!(
                    ledger = %proof.ledger,
                    reason = %reason,
                    "settlement rejected before dispatch"
                );
                Ok(SettlementResult::rejected(
                    proof.payload.payer.clone(),
                    &proof.ledger,
                    reason,
                ))
            }
        }
    }

    /// Per-ledger reachability, for health reporting.
    pub async fn health(&self) -> Vec<(String, bool)> {
        let mut report = Vec::with_capacity(self.adapters.len());
        for (ledger, adapter) in &self.adapters {
            report.push((ledger.clone(), adapter.health().await.is_ok()));
        }
        report.sort();
        report
    }
}
