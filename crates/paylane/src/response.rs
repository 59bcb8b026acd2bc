//! Result shapes and reporting helpers.
//!
//! Every path through the engine — success, business rejection, internal
//! error — normalizes into one of the two shapes here. Callers always
//! receive a well-formed object; when even the payer cannot be recovered the
//! `"unknown"` sentinel stands in rather than an omitted field.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::checks::InvalidReason;
use crate::identity::Identity;

/// Outcome of a verification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub is_valid: bool,
    pub payer: Identity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
}

impl VerificationResult {
    pub fn valid(payer: Identity) -> Self {
        Self {
            is_valid: true,
            payer,
            invalid_reason: None,
        }
    }

    pub fn rejected(payer: Identity, reason: InvalidReason) -> Self {
        Self {
            is_valid: false,
            payer,
            invalid_reason: Some(reason.to_string()),
        }
    }
}

/// Outcome of a settlement request.
///
/// `transaction_ref` is empty on failure, except when a submission produced
/// a hash but confirmation is unknown — then the hash is reported alongside
/// an `"outcome unknown"` reason so the caller can re-check the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResult {
    pub success: bool,
    pub payer: Identity,
    pub transaction_ref: String,
    pub ledger: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl SettlementResult {
    pub fn settled(payer: Identity, transaction_ref: String, ledger: &str) -> Self {
        Self {
            success: true,
            payer,
            transaction_ref,
            ledger: ledger.to_string(),
            error_reason: None,
        }
    }

    pub fn rejected(payer: Identity, ledger: &str, reason: InvalidReason) -> Self {
        Self {
            success: false,
            payer,
            transaction_ref: String::new(),
            ledger: ledger.to_string(),
            error_reason: Some(reason.to_string()),
        }
    }

    pub fn failed(payer: Identity, ledger: &str, reason: String) -> Self {
        Self {
            success: false,
            payer,
            transaction_ref: String::new(),
            ledger: ledger.to_string(),
            error_reason: Some(reason),
        }
    }

    /// A submission went out but confirmation never came back. The transfer
    /// may still land; the caller must re-check, not assume failure.
    pub fn unknown_outcome(
        payer: Identity,
        transaction_ref: String,
        ledger: &str,
        detail: &str,
    ) -> Self {
        Self {
            success: false,
            payer,
            transaction_ref,
            ledger: ledger.to_string(),
            error_reason: Some(format!("outcome unknown: {detail}")),
        }
    }
}

/// Best-effort recovery of `(payer, ledger)` from a header that failed to
/// decode, for populating internal-error responses. Falls back to the
/// `"unknown"` sentinel at each step.
pub fn recover_payer_hint(header: &str) -> (Identity, String) {
    let unknown = || (Identity::unknown(), "unknown".to_string());

    let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(header.trim()) else {
        return unknown();
    };
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
        return unknown();
    };

    let payer = value
        .pointer("/payload/payer")
        .and_then(|v| v.as_str())
        .map(Identity::new)
        .unwrap_or_else(Identity::unknown);
    let ledger = value
        .get("ledger")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    (payer, ledger)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_result_carries_reason_string() {
        let r = VerificationResult::rejected(Identity::unknown(), InvalidReason::Expired);
        assert!(!r.is_valid);
        assert!(r.invalid_reason.unwrap().contains("expired"));
    }

    #[test]
    fn settlement_serializes_camel_case() {
        let r = SettlementResult::settled(
            Identity::new("0x00000000000000000000000000000000000000a1"),
            "0xabc".to_string(),
            "eip155:8453",
        );
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["transactionRef"], "0xabc");
        assert_eq!(json["success"], true);
        assert!(json.get("errorReason").is_none());
    }

    #[test]
    fn unknown_outcome_is_marked_and_keeps_ref() {
        let r = SettlementResult::unknown_outcome(
            Identity::unknown(),
            "0xabc".to_string(),
            "eip155:8453",
            "confirmation timed out after 60s",
        );
        assert!(!r.success);
        assert_eq!(r.transaction_ref, "0xabc");
        assert!(r.error_reason.unwrap().starts_with("outcome unknown"));
    }

    #[test]
    fn payer_hint_recovers_from_valid_json() {
        let doc = br#"{"protocolVersion":1,"scheme":"exact","ledger":"eip155:8453","payload":{"payer":"0xa1"}}"#;
        let header = base64::engine::general_purpose::STANDARD.encode(doc);
        let (payer, ledger) = recover_payer_hint(&header);
        assert_eq!(payer.as_str(), "0xa1");
        assert_eq!(ledger, "eip155:8453");
    }

    #[test]
    fn payer_hint_defaults_to_unknown() {
        let (payer, ledger) = recover_payer_hint("%%%");
        assert_eq!(payer.as_str(), "unknown");
        assert_eq!(ledger, "unknown");
    }
}
