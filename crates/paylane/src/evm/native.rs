//! Native-balance EVM adapter.
//!
//! This family has no delegation primitive for its base asset, so the
//! payload carries a fully pre-signed transfer transaction in
//! `ledgerSpecificAuth`. The transaction *is* the authorization: its
//! destination, value and chain id must match the proof exactly, and its
//! recovered signer must be the payer. Settlement is a rebroadcast — the
//! facilitator cannot alter anything baked into the signature and spends no
//! signing key of its own.

use std::sync::Arc;

use alloy::consensus::transaction::SignerRecoverable;
use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, RootProvider};
use async_trait::async_trait;

use crate::checks::{self, InvalidReason};
use crate::config::SettlementMode;
use crate::error::Error;
use crate::evm::parse_address;
use crate::identity::Identity;
use crate::ledger::{simulated_reference, LedgerAdapter};
use crate::payment::{PaymentPayload, PaymentProof, PaymentRequirement};
use crate::replay::{replay_key, ReplayStore};
use crate::response::{SettlementResult, VerificationResult};

const READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
const SEND_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
const RECEIPT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

pub struct NativeEvmAdapter<P> {
    provider: P,
    ledger: String,
    chain_id: u64,
    facilitator: Identity,
    mode: SettlementMode,
    replay: Arc<dyn ReplayStore>,
}

impl NativeEvmAdapter<RootProvider> {
    pub fn connect(
        ledger: String,
        chain_id: u64,
        rpc_url: &str,
        facilitator_address: &str,
        mode: SettlementMode,
        replay: Arc<dyn ReplayStore>,
    ) -> Result<Self, Error> {
        let facilitator_address: Address = facilitator_address
            .parse()
            .map_err(|e| Error::Config(format!("invalid native-EVM facilitator address: {e}")))?;
        let url = rpc_url
            .parse()
            .map_err(|e| Error::Config(format!("invalid native-EVM RPC URL: {e}")))?;
        let provider = RootProvider::<alloy::network::Ethereum>::new_http(url);

        Ok(Self {
            provider,
            ledger,
            chain_id,
            facilitator: Identity::from(facilitator_address),
            mode,
            replay,
        })
    }
}

/// Decode and cross-check the pre-signed transaction against the payload.
/// Returns the raw bytes (for rebroadcast) and the recovered payer.
fn check_presigned(
    payload: &PaymentPayload,
    payer: Address,
    payee: Address,
    amount: U256,
    chain_id: u64,
) -> Result<Vec<u8>, InvalidReason> {
    let auth_hex = payload
        .ledger_specific_auth
        .as_deref()
        .ok_or_else(|| {
            InvalidReason::MalformedAuth(
                "missing pre-signed transaction for a native-balance ledger".to_string(),
            )
        })?;

    let raw = alloy::hex::decode(auth_hex.strip_prefix("0x").unwrap_or(auth_hex))
        .map_err(|e| InvalidReason::MalformedAuth(format!("invalid transaction hex: {e}")))?;

    let envelope = TxEnvelope::decode_2718(&mut raw.as_slice())
        .map_err(|e| InvalidReason::MalformedAuth(format!("unparseable transaction: {e}")))?;

    if envelope.chain_id() != Some(chain_id) {
        return Err(InvalidReason::Other(format!(
            "pre-signed transaction chain mismatch: expected {chain_id}"
        )));
    }
    if envelope.to() != Some(payee) {
        return Err(InvalidReason::Other(
            "pre-signed transaction destination mismatch".to_string(),
        ));
    }
    if envelope.value() != amount {
        return Err(InvalidReason::Other(
            "pre-signed transaction value mismatch".to_string(),
        ));
    }

    let signer = envelope
        .recover_signer()
        .map_err(|e| InvalidReason::MalformedAuth(format!("signer recovery failed: {e}")))?;
    if signer != payer {
        return Err(InvalidReason::InvalidSignature);
    }

    Ok(raw)
}

impl<P> NativeEvmAdapter<P>
where
    P: Provider + Send + Sync,
{
    fn verify_offline(
        &self,
        payload: &PaymentPayload,
        requirement: &PaymentRequirement,
        now: u64,
    ) -> Result<(Address, U256, Vec<u8>), InvalidReason> {
        let amount = checks::check_invariants(payload, requirement, now)?;
        checks::check_facilitator_guard(payload, requirement, &self.facilitator)?;

        let payer = parse_address(&payload.payer)?;
        let payee = parse_address(&payload.payee)?;

        let raw = check_presigned(payload, payer, payee, amount, self.chain_id)?;

        let (payer_key, nonce_key) = replay_key(&payload.payer, &payload.nonce);
        if self.replay.is_used(&payer_key, &nonce_key) {
            return Err(InvalidReason::AlreadySettled);
        }

        Ok((payer, amount, raw))
    }
}

#[async_trait]
impl<P> LedgerAdapter for NativeEvmAdapter<P>
where
    P: Provider + Send + Sync,
{
    fn ledger(&self) -> &str {
        &self.ledger
    }

    fn facilitator_identity(&self) -> &Identity {
        &self.facilitator
    }

    async fn verify(
        &self,
        proof: &PaymentProof,
        requirement: &PaymentRequirement,
    ) -> Result<VerificationResult, Error> {
        let payload = &proof.payload;
        let now = checks::unix_now()?;

        let (payer, amount, _raw) = match self.verify_offline(payload, requirement, now) {
            Ok(parts) => parts,
            Err(reason) => {
                return Ok(VerificationResult::rejected(payload.payer.clone(), reason))
            }
        };

        if self.mode == SettlementMode::Real {
            let balance = tokio::time::timeout(READ_TIMEOUT, self.provider.get_balance(payer))
                .await
                .map_err(|_| Error::Chain("getBalance timed out after 10s".to_string()))?
                .map_err(|e| Error::Chain(format!("getBalance failed: {e}")))?;
            if balance < amount {
                tracing::info!(
                    payer = %payload.payer,
                    balance = %balance,
                    required = %amount,
                    "payment rejected: insufficient balance"
                );
                return Ok(VerificationResult::rejected(
                    payload.payer.clone(),
                    InvalidReason::InsufficientBalance,
                ));
            }
        }

        tracing::info!(
            payer = %payload.payer,
            amount = %amount,
            ledger = %self.ledger,
            "payment verification succeeded"
        );
        Ok(VerificationResult::valid(payload.payer.clone()))
    }

    async fn settle(
        &self,
        proof: &PaymentProof,
        requirement: &PaymentRequirement,
    ) -> Result<SettlementResult, Error> {
        let payload = &proof.payload;

        // No facilitator key is spent here, so no submission lock: the
        // payer's own account nonce orders these transactions on-chain.
        let now = checks::unix_now()?;
        let (_payer, _amount, raw) = match self.verify_offline(payload, requirement, now) {
            Ok(parts) => parts,
            Err(reason) => {
                tracing::warn!(
                    payer = %payload.payer,
                    reason = %reason,
                    "settlement rejected after re-verification"
                );
                return Ok(SettlementResult::rejected(
                    payload.payer.clone(),
                    &self.ledger,
                    reason,
                ));
            }
        };

        let (payer_key, nonce_key) = replay_key(&payload.payer, &payload.nonce);
        if !self.replay.try_use(&payer_key, &nonce_key) {
            return Ok(SettlementResult::rejected(
                payload.payer.clone(),
                &self.ledger,
                InvalidReason::AlreadySettled,
            ));
        }

        if self.mode == SettlementMode::Simulated {
            let reference = simulated_reference(
                &self.ledger,
                &payload.payer,
                &payload.payee,
                &payload.amount,
                &payload.nonce.to_string(),
            );
            return Ok(SettlementResult::settled(
                payload.payer.clone(),
                reference,
                &self.ledger,
            ));
        }

        let pending =
            match tokio::time::timeout(SEND_TIMEOUT, self.provider.send_raw_transaction(&raw)).await
            {
                Ok(Ok(pending)) => pending,
                Ok(Err(e)) => {
                    tracing::error!(payer = %payload.payer, error = %e, "broadcast rejected");
                    return Ok(SettlementResult::failed(
                        payload.payer.clone(),
                        &self.ledger,
                        format!("broadcast rejected: {e}"),
                    ));
                }
                Err(_) => {
                    tracing::error!(
                        payer = %payload.payer,
                        "broadcast timed out — claim kept, outcome unknown"
                    );
                    return Ok(SettlementResult::unknown_outcome(
                        payload.payer.clone(),
                        String::new(),
                        &self.ledger,
                        "broadcast timed out after 30s; re-check the ledger before retrying",
                    ));
                }
            };

        let tx_hash = *pending.tx_hash();

        let receipt = match tokio::time::timeout(RECEIPT_TIMEOUT, pending.get_receipt()).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                return Ok(SettlementResult::unknown_outcome(
                    payload.payer.clone(),
                    format!("{tx_hash}"),
                    &self.ledger,
                    &format!("receipt fetch failed: {e}"),
                ));
            }
            Err(_) => {
                tracing::error!(
                    payer = %payload.payer,
                    tx = %tx_hash,
                    "confirmation timed out — claim kept, outcome unknown"
                );
                return Ok(SettlementResult::unknown_outcome(
                    payload.payer.clone(),
                    format!("{tx_hash}"),
                    &self.ledger,
                    "confirmation timed out after 60s; re-check the ledger before retrying",
                ));
            }
        };

        if !receipt.status() {
            return Ok(SettlementResult::failed(
                payload.payer.clone(),
                &self.ledger,
                format!("transaction reverted in {tx_hash}"),
            ));
        }

        tracing::info!(payer = %payload.payer, tx = %tx_hash, "payment settled");
        Ok(SettlementResult::settled(
            payload.payer.clone(),
            format!("{tx_hash}"),
            &self.ledger,
        ))
    }

    async fn balance(&self, owner: &Identity, _asset: &str) -> Result<U256, Error> {
        let owner = parse_address(owner).map_err(|r| Error::Chain(r.to_string()))?;
        tokio::time::timeout(READ_TIMEOUT, self.provider.get_balance(owner))
            .await
            .map_err(|_| Error::Chain("getBalance timed out after 10s".to_string()))?
            .map_err(|e| Error::Chain(format!("getBalance failed: {e}")))
    }

    async fn health(&self) -> Result<(), Error> {
        if self.mode == SettlementMode::Simulated {
            return Ok(());
        }
        self.provider
            .get_block_number()
            .await
            .map(|_| ())
            .map_err(|e| Error::Chain(format!("health check failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::consensus::{SignableTransaction, TxEip1559};
    use alloy::eips::eip2718::Encodable2718;
    use alloy::primitives::TxKind;
    use alloy::signers::local::PrivateKeySigner;
    use alloy::signers::SignerSync;

    const CHAIN_ID: u64 = 10;

    fn presign(
        signer: &PrivateKeySigner,
        to: Address,
        value: U256,
        chain_id: u64,
    ) -> (String, Address) {
        let tx = TxEip1559 {
            chain_id,
            nonce: 0,
            gas_limit: 21_000,
            max_fee_per_gas: 1_000_000_000,
            max_priority_fee_per_gas: 1_000_000_000,
            to: TxKind::Call(to),
            value,
            ..Default::default()
        };
        let sig = signer.sign_hash_sync(&tx.signature_hash()).unwrap();
        let envelope = TxEnvelope::from(tx.into_signed(sig));
        let mut raw = Vec::new();
        envelope.encode_2718(&mut raw);
        (format!("0x{}", alloy::hex::encode(raw)), signer.address())
    }

    fn payload_for(signer: &PrivateKeySigner, payee: Address, amount: U256) -> PaymentPayload {
        let (auth, payer) = presign(signer, payee, amount, CHAIN_ID);
        PaymentPayload {
            payer: Identity::from(payer),
            payee: Identity::from(payee),
            amount: amount.to_string(),
            nonce: crate::payment::Nonce::Number(1),
            deadline: u64::MAX,
            signature: String::new(),
            ledger_specific_auth: Some(auth),
        }
    }

    #[test]
    fn matching_presigned_transaction_passes() {
        let signer = PrivateKeySigner::random();
        let payee = Address::with_last_byte(0xb2);
        let amount = U256::from(5_000u64);
        let payload = payload_for(&signer, payee, amount);

        let raw = check_presigned(&payload, signer.address(), payee, amount, CHAIN_ID).unwrap();
        assert!(!raw.is_empty());
    }

    #[test]
    fn destination_mismatch_is_rejected() {
        let signer = PrivateKeySigner::random();
        let amount = U256::from(5_000u64);
        let payload = payload_for(&signer, Address::with_last_byte(0xb2), amount);

        // Claimed payee differs from the transaction's destination.
        let err = check_presigned(
            &payload,
            signer.address(),
            Address::with_last_byte(0xee),
            amount,
            CHAIN_ID,
        )
        .unwrap_err();
        assert!(err.to_string().contains("destination"));
    }

    #[test]
    fn value_mismatch_is_rejected() {
        let signer = PrivateKeySigner::random();
        let payee = Address::with_last_byte(0xb2);
        let payload = payload_for(&signer, payee, U256::from(5_000u64));

        let err = check_presigned(
            &payload,
            signer.address(),
            payee,
            U256::from(9_999u64),
            CHAIN_ID,
        )
        .unwrap_err();
        assert!(err.to_string().contains("value"));
    }

    #[test]
    fn chain_mismatch_is_rejected() {
        let signer = PrivateKeySigner::random();
        let payee = Address::with_last_byte(0xb2);
        let amount = U256::from(5_000u64);
        let payload = payload_for(&signer, payee, amount);

        let err =
            check_presigned(&payload, signer.address(), payee, amount, CHAIN_ID + 1).unwrap_err();
        assert!(err.to_string().contains("chain"));
    }

    #[test]
    fn wrong_claimed_payer_is_invalid_signature() {
        let signer = PrivateKeySigner::random();
        let payee = Address::with_last_byte(0xb2);
        let amount = U256::from(5_000u64);
        let payload = payload_for(&signer, payee, amount);

        let err = check_presigned(
            &payload,
            Address::with_last_byte(0x99),
            payee,
            amount,
            CHAIN_ID,
        )
        .unwrap_err();
        assert_eq!(err, InvalidReason::InvalidSignature);
    }

    #[test]
    fn missing_auth_is_malformed() {
        let signer = PrivateKeySigner::random();
        let payee = Address::with_last_byte(0xb2);
        let amount = U256::from(5_000u64);
        let mut payload = payload_for(&signer, payee, amount);
        payload.ledger_specific_auth = None;

        let err =
            check_presigned(&payload, signer.address(), payee, amount, CHAIN_ID).unwrap_err();
        assert!(matches!(err, InvalidReason::MalformedAuth(_)));
    }

    #[test]
    fn garbage_bytes_are_malformed() {
        let signer = PrivateKeySigner::random();
        let payee = Address::with_last_byte(0xb2);
        let amount = U256::from(5_000u64);
        let mut payload = payload_for(&signer, payee, amount);
        payload.ledger_specific_auth = Some("0xdeadbeef".to_string());

        let err =
            check_presigned(&payload, signer.address(), payee, amount, CHAIN_ID).unwrap_err();
        assert!(matches!(err, InvalidReason::MalformedAuth(_)));
    }
}
