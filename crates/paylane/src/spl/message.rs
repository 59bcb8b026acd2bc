//! Raw-message EdDSA authorization.
//!
//! The payer signs the canonical pipe-delimited rendering of the payload.
//! Verification is strict ed25519 — edge-case signatures that lenient
//! implementations accept are rejected.

use ed25519_dalek::{Signature, VerifyingKey};

use crate::ledger::SignatureCheck;
use crate::payment::PaymentPayload;

/// Canonical message the payer signs:
/// `from:{payer}|to:{payee}|amount:{amount}|nonce:{nonce}|deadline:{deadline}`.
pub fn canonical_message(payload: &PaymentPayload) -> String {
    format!(
        "from:{}|to:{}|amount:{}|nonce:{}|deadline:{}",
        payload.payer, payload.payee, payload.amount, payload.nonce, payload.deadline
    )
}

/// Decode wire signature material: base58, or 0x-prefixed hex.
fn decode_signature(raw: &str) -> Result<[u8; 64], String> {
    let bytes = if let Some(hex) = raw.strip_prefix("0x") {
        alloy::hex::decode(hex).map_err(|e| format!("invalid hex signature: {e}"))?
    } else {
        bs58::decode(raw)
            .into_vec()
            .map_err(|e| format!("invalid base58 signature: {e}"))?
    };
    bytes
        .try_into()
        .map_err(|_| "signature must be 64 bytes".to_string())
}

/// Verify a payload's signature against its purported payer's public key.
pub fn check_signature(payload: &PaymentPayload, payer_pubkey: &[u8; 32]) -> SignatureCheck {
    let sig_bytes = match decode_signature(&payload.signature) {
        Ok(b) => b,
        Err(detail) => return SignatureCheck::Malformed(detail),
    };

    let verifying_key = match VerifyingKey::from_bytes(payer_pubkey) {
        Ok(k) => k,
        Err(e) => return SignatureCheck::Malformed(format!("invalid public key: {e}")),
    };

    let signature = Signature::from_bytes(&sig_bytes);
    let message = canonical_message(payload);

    match verifying_key.verify_strict(message.as_bytes(), &signature) {
        Ok(()) => SignatureCheck::Authenticated(payload.payer.clone()),
        Err(_) => SignatureCheck::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::payment::Nonce;
    use ed25519_dalek::{Signer, SigningKey};

    fn keypair(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    fn signed_payload(key: &SigningKey) -> PaymentPayload {
        let payer = Identity::new(bs58::encode(key.verifying_key().to_bytes()).into_string());
        let mut payload = PaymentPayload {
            payer,
            payee: Identity::new("9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin"),
            amount: "250000".to_string(),
            nonce: Nonce::Text("order-19".to_string()),
            deadline: 1_900_000_000,
            signature: String::new(),
            ledger_specific_auth: None,
        };
        let sig = key.sign(canonical_message(&payload).as_bytes());
        payload.signature = bs58::encode(sig.to_bytes()).into_string();
        payload
    }

    #[test]
    fn canonical_message_layout() {
        let payload = PaymentPayload {
            payer: Identity::new("AAA"),
            payee: Identity::new("BBB"),
            amount: "42".to_string(),
            nonce: Nonce::Number(7),
            deadline: 100,
            signature: String::new(),
            ledger_specific_auth: None,
        };
        assert_eq!(
            canonical_message(&payload),
            "from:AAA|to:BBB|amount:42|nonce:7|deadline:100"
        );
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let key = keypair(0x11);
        let payload = signed_payload(&key);
        let pubkey = key.verifying_key().to_bytes();

        assert_eq!(
            check_signature(&payload, &pubkey),
            SignatureCheck::Authenticated(payload.payer.clone())
        );
    }

    #[test]
    fn wrong_key_does_not_authenticate() {
        let key = keypair(0x11);
        let other = keypair(0x22);
        let payload = signed_payload(&key);

        assert_eq!(
            check_signature(&payload, &other.verifying_key().to_bytes()),
            SignatureCheck::Invalid
        );
    }

    #[test]
    fn tampered_amount_does_not_authenticate() {
        let key = keypair(0x11);
        let mut payload = signed_payload(&key);
        payload.amount = "999999".to_string();

        assert_eq!(
            check_signature(&payload, &key.verifying_key().to_bytes()),
            SignatureCheck::Invalid
        );
    }

    #[test]
    fn short_signature_is_malformed() {
        let key = keypair(0x11);
        let mut payload = signed_payload(&key);
        payload.signature = bs58::encode([0u8; 16]).into_string();

        assert!(matches!(
            check_signature(&payload, &key.verifying_key().to_bytes()),
            SignatureCheck::Malformed(_)
        ));
    }

    #[test]
    fn hex_signatures_are_accepted() {
        let key = keypair(0x11);
        let mut payload = signed_payload(&key);
        let sig = key.sign(canonical_message(&payload).as_bytes());
        payload.signature = format!("0x{}", alloy::hex::encode(sig.to_bytes()));

        assert_eq!(
            check_signature(&payload, &key.verifying_key().to_bytes()),
            SignatureCheck::Authenticated(payload.payer.clone())
        );
    }
}
