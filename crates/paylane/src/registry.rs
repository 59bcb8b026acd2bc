//! Capability registry: which `(scheme, ledger)` pairs this facilitator is
//! actually configured to serve.

use serde::{Deserialize, Serialize};

use crate::config::{FacilitatorConfig, LedgerConfig};
use crate::{EXACT_SCHEME, PROTOCOL_VERSION};

/// One discoverable capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    pub protocol_version: u32,
    pub scheme: String,
    pub ledger: String,
}

/// Static table of configured capabilities, derived from the facilitator
/// config and never mutated afterwards. A ledger appears here iff a complete
/// [`LedgerConfig`] entry exists for it — adapter code alone is not enough.
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    kinds: Vec<SupportedKind>,
}

impl CapabilityRegistry {
    pub fn from_config(config: &FacilitatorConfig) -> Self {
        let kinds = config
            .ledgers
            .iter()
            .map(|entry: &LedgerConfig| SupportedKind {
                protocol_version: PROTOCOL_VERSION,
                scheme: EXACT_SCHEME.to_string(),
                ledger: entry.ledger().to_string(),
            })
            .collect();
        Self { kinds }
    }

    pub fn is_supported(&self, scheme: &str, ledger: &str) -> bool {
        self.kinds
            .iter()
            .any(|k| k.scheme == scheme && k.ledger == ledger)
    }

    /// All configured capabilities, for the discovery endpoint.
    pub fn list(&self) -> &[SupportedKind] {
        &self.kinds
    }
}
