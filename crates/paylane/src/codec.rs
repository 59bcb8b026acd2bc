//! Proof envelope codec: opaque base64 header <-> [`PaymentProof`].
//!
//! Decode failures are transport faults ([`DecodeError`]), split into
//! `MalformedEnvelope` (bad base64 / UTF-8 / JSON) and `SchemaViolation`
//! (fields absent or ill-typed, including non-decimal amounts). Business
//! rejections never originate here.

use alloy::primitives::U256;
use base64::Engine;

use crate::error::DecodeError;
use crate::payment::PaymentProof;

/// Decode a base64 payment header into a structured proof.
pub fn decode_proof(header: &str) -> Result<PaymentProof, DecodeError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(header.trim())
        .map_err(|e| DecodeError::MalformedEnvelope(format!("invalid base64: {e}")))?;

    // Parse as a generic document first so "not JSON" and "wrong shape"
    // report as distinct faults.
    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| DecodeError::MalformedEnvelope(format!("invalid JSON: {e}")))?;

    let proof: PaymentProof = serde_json::from_value(value)
        .map_err(|e| DecodeError::SchemaViolation(e.to_string()))?;

    // Amounts travel as decimal strings; anything that does not parse as an
    // unsigned 256-bit integer is a schema fault, not a business rejection.
    parse_amount(&proof.payload.amount)?;

    Ok(proof)
}

/// Encode a proof back into its base64 header form. Exact inverse of
/// [`decode_proof`] — the round-trip is lossless for all fields, including
/// big-integer amounts and the nonce's string-vs-integer variant.
pub fn encode_proof(proof: &PaymentProof) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(proof)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(&json))
}

/// Parse an unsigned decimal amount string.
pub fn parse_amount(amount: &str) -> Result<U256, DecodeError> {
    if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::SchemaViolation(format!(
            "amount is not an unsigned decimal: {amount:?}"
        )));
    }
    amount
        .parse::<U256>()
        .map_err(|e| DecodeError::SchemaViolation(format!("amount out of range: {e}")))
}
