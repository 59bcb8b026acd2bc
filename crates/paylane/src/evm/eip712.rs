//! EIP-712 typed-data authorization for the delegated EVM family.
//!
//! The canonical structure covers `{payer, payee, amount, nonce, deadline}`;
//! the domain binds to the facilitator's own identity as verifying contract.
//! Binding the domain to any other party (an earlier iteration used the
//! payee) lets a merchant replay authorizations across facilitators — the
//! binding here is the verifier, never a destination.

use alloy::primitives::{Address, Signature, B256, U256};
use alloy::sol;
use alloy::sol_types::SolStruct;

use crate::error::Error;
use crate::ledger::SignatureCheck;
use crate::payment::PaymentPayload;

sol! {
    /// Typed structure the payer signs.
    #[derive(Debug)]
    struct TransferAuthorization {
        address payer;
        address payee;
        uint256 amount;
        string nonce;
        uint256 deadline;
    }
}

/// EIP-712 domain parameters for one delegated-EVM ledger.
#[derive(Debug, Clone)]
pub struct DomainParams {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    /// The facilitator's own address — the verifier, never the payee.
    pub facilitator: Address,
}

impl DomainParams {
    fn domain(&self) -> alloy::sol_types::Eip712Domain {
        alloy::sol_types::Eip712Domain {
            name: Some(std::borrow::Cow::Owned(self.name.clone())),
            version: Some(std::borrow::Cow::Owned(self.version.clone())),
            chain_id: Some(U256::from(self.chain_id)),
            verifying_contract: Some(self.facilitator),
            salt: None,
        }
    }
}

/// Build the typed structure from a wire payload.
pub fn authorization(
    payload: &PaymentPayload,
    payer: Address,
    payee: Address,
    amount: U256,
) -> TransferAuthorization {
    TransferAuthorization {
        payer,
        payee,
        amount,
        nonce: payload.nonce.to_string(),
        deadline: U256::from(payload.deadline),
    }
}

/// Compute the EIP-712 signing hash for an authorization under a domain.
pub fn signing_hash(auth: &TransferAuthorization, params: &DomainParams) -> B256 {
    auth.eip712_signing_hash(&params.domain())
}

/// secp256k1 curve order N / 2 — signatures with s above this are malleable.
const SECP256K1_N_DIV_2: U256 = U256::from_limbs([
    0xBFD25E8CD0364140,
    0xBAAEDCE6AF48A03B,
    0xFFFFFFFFFFFFFFFE,
    0x7FFFFFFFFFFFFFFF,
]);

/// Recover the signer of an authorization. Rejects non-65-byte material and
/// high-s signatures (EIP-2).
pub fn recover_signer(
    auth: &TransferAuthorization,
    signature_bytes: &[u8],
    params: &DomainParams,
) -> Result<Address, Error> {
    if signature_bytes.len() != 65 {
        return Err(Error::Signature(format!(
            "signature must be 65 bytes, got {}",
            signature_bytes.len()
        )));
    }

    let sig = Signature::from_raw(signature_bytes)
        .map_err(|e| Error::Signature(format!("invalid signature: {e}")))?;

    if sig.s() > SECP256K1_N_DIV_2 {
        return Err(Error::Signature(
            "high-s signature rejected (EIP-2 malleability)".to_string(),
        ));
    }

    let hash = signing_hash(auth, params);
    sig.recover_address_from_prehash(&hash)
        .map_err(|e| Error::Signature(format!("recovery failed: {e}")))
}

/// Check a payload signature against its purported payer.
pub fn check_signature(
    payload: &PaymentPayload,
    payer: Address,
    payee: Address,
    amount: U256,
    params: &DomainParams,
) -> SignatureCheck {
    let sig_hex = payload.signature.strip_prefix("0x").unwrap_or(&payload.signature);
    let sig_bytes = match alloy::hex::decode(sig_hex) {
        Ok(b) => b,
        Err(e) => return SignatureCheck::Malformed(format!("invalid hex signature: {e}")),
    };

    let auth = authorization(payload, payer, payee, amount);
    match recover_signer(&auth, &sig_bytes, params) {
        Ok(recovered) if recovered == payer => {
            SignatureCheck::Authenticated(crate::identity::Identity::from(payer))
        }
        Ok(_) => SignatureCheck::Invalid,
        Err(Error::Signature(detail)) => SignatureCheck::Malformed(detail),
        Err(e) => SignatureCheck::Malformed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::signers::local::PrivateKeySigner;
    use alloy::signers::SignerSync;

    fn params(facilitator: Address) -> DomainParams {
        DomainParams {
            name: "paylane".to_string(),
            version: "1".to_string(),
            chain_id: 8453,
            facilitator,
        }
    }

    fn sample_auth(payer: Address) -> TransferAuthorization {
        TransferAuthorization {
            payer,
            payee: Address::with_last_byte(0xb2),
            amount: U256::from(1000u64),
            nonce: "7".to_string(),
            deadline: U256::from(1_900_000_000u64),
        }
    }

    #[test]
    fn sign_and_recover_roundtrip() {
        let signer = PrivateKeySigner::random();
        let facilitator = Address::with_last_byte(0xfa);
        let auth = sample_auth(signer.address());

        let hash = signing_hash(&auth, &params(facilitator));
        let sig = signer.sign_hash_sync(&hash).unwrap();

        let recovered = recover_signer(&auth, &sig.as_bytes(), &params(facilitator)).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn domain_is_bound_to_the_facilitator() {
        let signer = PrivateKeySigner::random();
        let auth = sample_auth(signer.address());

        let hash = signing_hash(&auth, &params(Address::with_last_byte(0xfa)));
        let sig = signer.sign_hash_sync(&hash).unwrap();

        // Same structure verified under a different facilitator's domain
        // must not recover the signer.
        let other = params(Address::with_last_byte(0xfb));
        let recovered = recover_signer(&auth, &sig.as_bytes(), &other).unwrap();
        assert_ne!(recovered, signer.address());
    }

    #[test]
    fn tampered_amount_breaks_recovery() {
        let signer = PrivateKeySigner::random();
        let facilitator = Address::with_last_byte(0xfa);
        let mut auth = sample_auth(signer.address());

        let hash = signing_hash(&auth, &params(facilitator));
        let sig = signer.sign_hash_sync(&hash).unwrap();

        auth.amount = U256::from(999_999u64);
        let recovered = recover_signer(&auth, &sig.as_bytes(), &params(facilitator)).unwrap();
        assert_ne!(recovered, signer.address());
    }

    #[test]
    fn string_and_numeric_nonces_hash_identically() {
        // "7" typed as a JSON string or number canonicalizes to one structure.
        let payer = Address::with_last_byte(0xa1);
        let a = TransferAuthorization {
            nonce: crate::payment::Nonce::Number(7).to_string(),
            ..sample_auth(payer)
        };
        let b = TransferAuthorization {
            nonce: crate::payment::Nonce::Text("7".to_string()).to_string(),
            ..sample_auth(payer)
        };
        let p = params(Address::with_last_byte(0xfa));
        assert_eq!(signing_hash(&a, &p), signing_hash(&b, &p));
    }

    #[test]
    fn short_signature_is_rejected() {
        let auth = sample_auth(Address::with_last_byte(0xa1));
        let result = recover_signer(&auth, &[0xde, 0xad], &params(Address::ZERO));
        assert!(result.is_err());
    }
}
