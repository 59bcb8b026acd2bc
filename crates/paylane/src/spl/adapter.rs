//! SPL-token ledger adapter.
//!
//! Identities here are wallet public keys: the payer's key signs the
//! canonical message, and the token accounts actually holding the asset are
//! discovered per (owner, mint) at settlement time. The facilitator settles
//! as the delegate the payer approved on their token account.

use std::sync::Arc;

use alloy::primitives::U256;
use async_trait::async_trait;
use base64::Engine;
use ed25519_dalek::SigningKey;
use tokio::sync::Mutex;

use crate::checks::{self, InvalidReason};
use crate::config::SettlementMode;
use crate::error::Error;
use crate::identity::Identity;
use crate::ledger::{simulated_reference, LedgerAdapter, SignatureCheck};
use crate::payment::{PaymentPayload, PaymentProof, PaymentRequirement};
use crate::replay::{replay_key, ReplayStore};
use crate::response::{SettlementResult, VerificationResult};
use crate::spl::rpc::SolanaRpc;
use crate::spl::wire::{self, TransferParams};
use crate::spl::{message, parse_pubkey};

pub struct SplTokenAdapter {
    rpc: SolanaRpc,
    ledger: String,
    signing_key: SigningKey,
    facilitator: Identity,
    token_program: [u8; 32],
    mode: SettlementMode,
    replay: Arc<dyn ReplayStore>,
    /// Single writer per (ledger, signing key).
    settle_lock: Mutex<()>,
}

impl SplTokenAdapter {
    pub fn connect(
        ledger: String,
        rpc_url: &str,
        signer_key: &str,
        token_program: &str,
        mode: SettlementMode,
        replay: Arc<dyn ReplayStore>,
    ) -> Result<Self, Error> {
        let seed: [u8; 32] = bs58::decode(signer_key)
            .into_vec()
            .map_err(|e| Error::Config(format!("invalid SPL signer key encoding: {e}")))?
            .try_into()
            .map_err(|_| Error::Config("SPL signer key must be a 32-byte seed".to_string()))?;
        let signing_key = SigningKey::from_bytes(&seed);
        let facilitator =
            Identity::new(bs58::encode(signing_key.verifying_key().to_bytes()).into_string());

        let token_program = parse_pubkey(&Identity::new(token_program))
            .map_err(|r| Error::Config(format!("invalid token program: {r}")))?;

        Ok(Self {
            rpc: SolanaRpc::new(rpc_url.to_string()),
            ledger,
            signing_key,
            facilitator,
            token_program,
            mode,
            replay,
            settle_lock: Mutex::new(()),
        })
    }

    fn verify_offline(
        &self,
        payload: &PaymentPayload,
        requirement: &PaymentRequirement,
        now: u64,
    ) -> Result<u64, InvalidReason> {
        if payload.ledger_specific_auth.is_some() {
            return Err(InvalidReason::MalformedAuth(
                "unexpected pre-signed transaction on an SPL ledger".to_string(),
            ));
        }

        let amount = checks::check_invariants(payload, requirement, now)?;
        checks::check_facilitator_guard(payload, requirement, &self.facilitator)?;

        // SPL amounts are u64 minor units.
        let amount: u64 = u64::try_from(amount)
            .map_err(|_| InvalidReason::Other("amount exceeds ledger precision".to_string()))?;

        let payer_pubkey = parse_pubkey(&payload.payer)?;
        parse_pubkey(&payload.payee)?;

        match message::check_signature(payload, &payer_pubkey) {
            SignatureCheck::Authenticated(_) => {}
            SignatureCheck::Invalid => return Err(InvalidReason::InvalidSignature),
            SignatureCheck::Malformed(detail) => {
                return Err(InvalidReason::MalformedAuth(detail))
            }
        }

        let (payer_key, nonce_key) = replay_key(&payload.payer, &payload.nonce);
        if self.replay.is_used(&payer_key, &nonce_key) {
            return Err(InvalidReason::AlreadySettled);
        }

        Ok(amount)
    }

    /// Locate the owner's holding account for the asset. `Ok(None)` means no
    /// account, which reads as zero balance to callers.
    async fn holding_account(&self, owner: &Identity, mint: &str) -> Result<Option<String>, Error> {
        self.rpc.token_account_by_owner(owner.as_str(), mint).await
    }

    /// Advisory solvency read; skipped in simulated mode.
    async fn check_solvency(
        &self,
        payload: &PaymentPayload,
        mint: &str,
        amount: u64,
    ) -> Result<Option<InvalidReason>, Error> {
        if self.mode == SettlementMode::Simulated {
            return Ok(None);
        }

        let balance = match self.holding_account(&payload.payer, mint).await? {
            Some(account) => self.rpc.token_account_balance(&account).await?,
            None => 0,
        };
        if balance < amount {
            tracing::info!(
                payer = %payload.payer,
                balance,
                required = amount,
                "payment rejected: insufficient balance"
            );
            return Ok(Some(InvalidReason::InsufficientBalance));
        }
        Ok(None)
    }
}

#[async_trait]
impl LedgerAdapter for SplTokenAdapter {
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

        let amount = match self.verify_offline(payload, requirement, now) {
            Ok(amount) => amount,
            Err(reason) => {
                return Ok(VerificationResult::rejected(payload.payer.clone(), reason))
            }
        };

        if let Some(reason) = self
            .check_solvency(payload, &requirement.asset, amount)
            .await?
        {
            return Ok(VerificationResult::rejected(payload.payer.clone(), reason));
        }

        tracing::info!(
            payer = %payload.payer,
            amount,
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

        let _guard = self.settle_lock.lock().await;

        let now = checks::unix_now()?;
        let amount = match self.verify_offline(payload, requirement, now) {
            Ok(amount) => amount,
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
        if let Some(reason) = self
            .check_solvency(payload, &requirement.asset, amount)
            .await?
        {
            return Ok(SettlementResult::rejected(
                payload.payer.clone(),
                &self.ledger,
                reason,
            ));
        }

        // Claim before submission; the claim stays on failure because a
        // timed-out transaction may still land.
        let (payer_key, nonce_key) = replay_key(&payload.payer, &payload.nonce);
        if !self.replay.try_use(&payer_key, &nonce_key) {
            tracing::warn!(
                payer = %payload.payer,
                nonce = %payload.nonce,
                "replay claim race: another request settled this authorization first"
            );
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

        // Resolve both holding accounts for the mint. The payer's was just
        // confirmed by the solvency read; the payee may hold none.
        let source = match self.holding_account(&payload.payer, &requirement.asset).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                return Ok(SettlementResult::rejected(
                    payload.payer.clone(),
                    &self.ledger,
                    InvalidReason::InsufficientBalance,
                ))
            }
            Err(e) => {
                tracing::error!(payer = %payload.payer, error = %e, "source account lookup failed");
                return Ok(SettlementResult::failed(
                    payload.payer.clone(),
                    &self.ledger,
                    e.to_string(),
                ));
            }
        };
        let destination = match self.holding_account(&payload.payee, &requirement.asset).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                return Ok(SettlementResult::failed(
                    payload.payer.clone(),
                    &self.ledger,
                    format!("payee holds no token account for {}", requirement.asset),
                ));
            }
            Err(e) => {
                tracing::error!(payer = %payload.payer, error = %e, "destination account lookup failed");
                return Ok(SettlementResult::failed(
                    payload.payer.clone(),
                    &self.ledger,
                    e.to_string(),
                ));
            }
        };

        let params = match (
            parse_pubkey(&Identity::new(source)),
            parse_pubkey(&Identity::new(destination)),
        ) {
            (Ok(source), Ok(destination)) => TransferParams {
                authority: self.signing_key.verifying_key().to_bytes(),
                source,
                destination,
                token_program: self.token_program,
                amount,
            },
            _ => {
                return Ok(SettlementResult::failed(
                    payload.payer.clone(),
                    &self.ledger,
                    "ledger returned an unparseable token account".to_string(),
                ))
            }
        };

        let blockhash = match self.rpc.latest_blockhash().await {
            Ok(b) => b,
            Err(e) => {
                // Nothing was submitted, but the claim is kept: the payer
                // retries with a fresh nonce rather than re-racing this one.
                tracing::error!(payer = %payload.payer, error = %e, "blockhash fetch failed");
                return Ok(SettlementResult::failed(
                    payload.payer.clone(),
                    &self.ledger,
                    e.to_string(),
                ));
            }
        };

        let msg = wire::build_transfer_message(&params, &blockhash);
        let tx = wire::sign_transaction(&msg, &self.signing_key);
        let tx_base64 = base64::engine::general_purpose::STANDARD.encode(&tx);

        match self.rpc.send_transaction(&tx_base64).await {
            Ok(signature) => {
                tracing::info!(
                    payer = %payload.payer,
                    amount,
                    tx = %signature,
                    "payment settled"
                );
                Ok(SettlementResult::settled(
                    payload.payer.clone(),
                    signature,
                    &self.ledger,
                ))
            }
            Err(Error::Chain(detail)) if detail.contains("timed out") => {
                tracing::error!(
                    payer = %payload.payer,
                    "sendTransaction timed out — claim kept, outcome unknown"
                );
                Ok(SettlementResult::unknown_outcome(
                    payload.payer.clone(),
                    String::new(),
                    &self.ledger,
                    "submission timed out; re-check the ledger before retrying",
                ))
            }
            Err(Error::Chain(detail)) => {
                tracing::error!(payer = %payload.payer, error = %detail, "sendTransaction failed");
                Ok(SettlementResult::failed(
                    payload.payer.clone(),
                    &self.ledger,
                    detail,
                ))
            }
            Err(e) => Err(e),
        }
    }

    async fn balance(&self, owner: &Identity, asset: &str) -> Result<U256, Error> {
        let balance = match self.holding_account(owner, asset).await? {
            Some(account) => self.rpc.token_account_balance(&account).await?,
            None => 0,
        };
        Ok(U256::from(balance))
    }

    async fn health(&self) -> Result<(), Error> {
        if self.mode == SettlementMode::Simulated {
            return Ok(());
        }
        self.rpc.health().await
    }
}
