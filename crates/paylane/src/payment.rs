use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::Identity;

/// A payment nonce as it appears on the wire: either a string or an integer.
///
/// The JSON variant is preserved through a round-trip; [`Nonce::to_string`]
/// is the canonical form shared by signing messages and replay keys, so
/// `5` and `"5"` cannot be used as two distinct nonces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Nonce {
    Number(u64),
    Text(String),
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Nonce::Number(n) => write!(f, "{n}"),
            Nonce::Text(s) => f.write_str(s),
        }
    }
}

/// Core payment data signed by the payer.
///
/// `amount` is an unsigned decimal string in the asset's minor units — the
/// codec rejects anything that does not parse as a `U256`. Exactly one of
/// `signature` / `ledger_specific_auth` governs authorization: when the
/// latter is present the payload carries a fully pre-signed transaction and
/// the plain signature field is not consulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub payer: Identity,
    pub payee: Identity,
    pub amount: String,
    pub nonce: Nonce,
    /// Unix seconds in the ledger's own clock domain.
    pub deadline: u64,
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_specific_auth: Option<String>,
}

/// Wire-format proof envelope (base64-encoded JSON in the payment header).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProof {
    pub protocol_version: u32,
    pub scheme: String,
    pub ledger: String,
    pub payload: PaymentPayload,
}

/// Merchant-declared requirement a proof is checked against.
///
/// Produced by the resource server and treated as trusted input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirement {
    pub scheme: String,
    pub ledger: String,
    pub min_amount: String,
    pub payee: Identity,
    /// Token contract / mint address, or the ledger's native-asset marker.
    pub asset: String,
    pub facilitator_identity: Identity,
    pub timeout_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_preserves_wire_variant() {
        let n: Nonce = serde_json::from_str("42").unwrap();
        assert_eq!(n, Nonce::Number(42));
        assert_eq!(serde_json::to_string(&n).unwrap(), "42");

        let t: Nonce = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(t, Nonce::Text("42".to_string()));
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"42\"");
    }

    #[test]
    fn nonce_variants_share_canonical_form() {
        assert_eq!(Nonce::Number(5).to_string(), Nonce::Text("5".into()).to_string());
    }

    #[test]
    fn payload_omits_absent_ledger_auth() {
        let payload = PaymentPayload {
            payer: Identity::new("0x0000000000000000000000000000000000000001"),
            payee: Identity::new("0x0000000000000000000000000000000000000002"),
            amount: "1000".to_string(),
            nonce: Nonce::Number(1),
            deadline: 0,
            signature: "0x00".to_string(),
            ledger_specific_auth: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("ledgerSpecificAuth").is_none());
        assert!(json.get("payer").is_some());
    }
}
