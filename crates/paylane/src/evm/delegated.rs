//! Delegated-token EVM adapter.
//!
//! Verification recovers the payer from an EIP-712 typed-data signature;
//! settlement issues `transferFrom(payer, payee, amount)` against a standing
//! allowance, with the facilitator's key acting only as submitter. The
//! facilitator is never the asset source or destination.

use std::sync::Arc;

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, U256};
use alloy::providers::{
    fillers::{
        BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
    },
    Identity as ProviderIdentity, Provider, ProviderBuilder, RootProvider,
};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::checks::{self, InvalidReason};
use crate::config::SettlementMode;
use crate::error::Error;
use crate::evm::eip712::{self, DomainParams};
use crate::evm::erc20::{self, TransferError};
use crate::evm::{parse_address, parse_asset};
use crate::identity::Identity;
use crate::ledger::{simulated_reference, LedgerAdapter, SignatureCheck};
use crate::payment::{PaymentPayload, PaymentProof, PaymentRequirement};
use crate::replay::{replay_key, ReplayStore};
use crate::response::{SettlementResult, VerificationResult};

/// Concrete provider type from `ProviderBuilder::new().wallet(...).connect_http(...)`.
pub type WalletProvider = FillProvider<
    JoinFill<
        JoinFill<
            ProviderIdentity,
            JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
        >,
        WalletFiller<EthereumWallet>,
    >,
    RootProvider,
>;

/// The validated, parsed pieces a settlement needs.
struct VerifiedTransfer {
    payer: Address,
    payee: Address,
    amount: U256,
    token: Address,
}

pub struct DelegatedEvmAdapter<P> {
    provider: P,
    ledger: String,
    facilitator_address: Address,
    facilitator: Identity,
    domain: DomainParams,
    mode: SettlementMode,
    replay: Arc<dyn ReplayStore>,
    /// Single writer per (ledger, signing key): settlements consume the
    /// facilitator key's nonce sequence and must not race.
    settle_lock: Mutex<()>,
}

impl DelegatedEvmAdapter<WalletProvider> {
    /// Build an adapter from config material, connecting an HTTP provider
    /// backed by the facilitator's wallet.
    pub fn connect(
        ledger: String,
        chain_id: u64,
        rpc_url: &str,
        signer_key: &str,
        domain_name: String,
        domain_version: String,
        mode: SettlementMode,
        replay: Arc<dyn ReplayStore>,
    ) -> Result<Self, Error> {
        let signer: PrivateKeySigner = signer_key
            .parse()
            .map_err(|e| Error::Config(format!("invalid delegated-EVM signer key: {e}")))?;
        let facilitator_address = signer.address();

        let url = rpc_url
            .parse()
            .map_err(|e| Error::Config(format!("invalid delegated-EVM RPC URL: {e}")))?;
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url);

        Ok(Self {
            provider,
            ledger,
            facilitator_address,
            facilitator: Identity::from(facilitator_address),
            domain: DomainParams {
                name: domain_name,
                version: domain_version,
                chain_id,
                facilitator: facilitator_address,
            },
            mode,
            replay,
            settle_lock: Mutex::new(()),
        })
    }
}

impl<P> DelegatedEvmAdapter<P>
where
    P: Provider + Send + Sync,
{
    /// The offline half of verification: invariants, facilitator guard,
    /// signature recovery, replay peek.
    fn verify_offline(
        &self,
        payload: &PaymentPayload,
        requirement: &PaymentRequirement,
        now: u64,
    ) -> Result<VerifiedTransfer, InvalidReason> {
        if payload.ledger_specific_auth.is_some() {
            return Err(InvalidReason::MalformedAuth(
                "unexpected pre-signed transaction on a delegated-token ledger".to_string(),
            ));
        }

        let amount = checks::check_invariants(payload, requirement, now)?;
        checks::check_facilitator_guard(payload, requirement, &self.facilitator)?;

        let payer = parse_address(&payload.payer)?;
        let payee = parse_address(&payload.payee)?;
        let token = parse_asset(&requirement.asset)?;

        match eip712::check_signature(payload, payer, payee, amount, &self.domain) {
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

        Ok(VerifiedTransfer {
            payer,
            payee,
            amount,
            token,
        })
    }

    /// Advisory solvency reads: balance, then remaining allowance to the
    /// facilitator. Skipped entirely in simulated mode.
    async fn check_solvency(
        &self,
        payload: &PaymentPayload,
        transfer: &VerifiedTransfer,
    ) -> Result<Option<InvalidReason>, Error> {
        if self.mode == SettlementMode::Simulated {
            return Ok(None);
        }

        let balance = erc20::balance_of(&self.provider, transfer.token, transfer.payer).await?;
        if balance < transfer.amount {
            tracing::info!(
                payer = %payload.payer,
                balance = %balance,
                required = %transfer.amount,
                "payment rejected: insufficient balance"
            );
            return Ok(Some(InvalidReason::InsufficientBalance));
        }

        let allowance = erc20::allowance(
            &self.provider,
            transfer.token,
            transfer.payer,
            self.facilitator_address,
        )
        .await?;
        if allowance < transfer.amount {
            tracing::info!(
                payer = %payload.payer,
                allowance = %allowance,
                required = %transfer.amount,
                "payment rejected: insufficient delegation allowance"
            );
            return Ok(Some(InvalidReason::InsufficientAllowance));
        }

        Ok(None)
    }
}

#[async_trait]
impl<P> LedgerAdapter for DelegatedEvmAdapter<P>
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

        let transfer = match self.verify_offline(payload, requirement, now) {
            Ok(t) => t,
            Err(reason) => {
                return Ok(VerificationResult::rejected(payload.payer.clone(), reason))
            }
        };

        if let Some(reason) = self.check_solvency(payload, &transfer).await? {
            return Ok(VerificationResult::rejected(payload.payer.clone(), reason));
        }

        tracing::info!(
            payer = %payload.payer,
            amount = %transfer.amount,
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

        // Re-verify under the lock: the proof may have expired or been
        // settled since the caller's verification pass.
        let now = checks::unix_now()?;
        let transfer = match self.verify_offline(payload, requirement, now) {
            Ok(t) => t,
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
        if let Some(reason) = self.check_solvency(payload, &transfer).await? {
            return Ok(SettlementResult::rejected(
                payload.payer.clone(),
                &self.ledger,
                reason,
            ));
        }

        // Claim the (payer, nonce) key before touching the ledger. The claim
        // is not released on failure: a submission that timed out may still
        // land, and releasing would allow a double-spend.
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

        match erc20::transfer_from(
            &self.provider,
            transfer.token,
            transfer.payer,
            transfer.payee,
            transfer.amount,
        )
        .await
        {
            Ok(tx_hash) => {
                tracing::info!(
                    payer = %payload.payer,
                    amount = %transfer.amount,
                    tx = %tx_hash,
                    "payment settled"
                );
                Ok(SettlementResult::settled(
                    payload.payer.clone(),
                    format!("{tx_hash}"),
                    &self.ledger,
                ))
            }
            Err(TransferError::SendTimeout) => {
                tracing::error!(
                    payer = %payload.payer,
                    "transferFrom submission timed out — claim kept, outcome unknown"
                );
                Ok(SettlementResult::unknown_outcome(
                    payload.payer.clone(),
                    String::new(),
                    &self.ledger,
                    "submission timed out after 30s; re-check the ledger before retrying",
                ))
            }
            Err(TransferError::ReceiptTimeout(tx_hash)) => {
                tracing::error!(
                    payer = %payload.payer,
                    tx = %tx_hash,
                    "transferFrom confirmation timed out — claim kept, outcome unknown"
                );
                Ok(SettlementResult::unknown_outcome(
                    payload.payer.clone(),
                    format!("{tx_hash}"),
                    &self.ledger,
                    "confirmation timed out after 60s; re-check the ledger before retrying",
                ))
            }
            Err(TransferError::Reverted(tx_hash)) => {
                tracing::error!(payer = %payload.payer, tx = %tx_hash, "transferFrom reverted");
                Ok(SettlementResult::failed(
                    payload.payer.clone(),
                    &self.ledger,
                    format!("transferFrom reverted in {tx_hash}"),
                ))
            }
            Err(TransferError::Rpc(detail)) => {
                tracing::error!(payer = %payload.payer, error = %detail, "transferFrom failed");
                Ok(SettlementResult::failed(
                    payload.payer.clone(),
                    &self.ledger,
                    detail,
                ))
            }
        }
    }

    async fn balance(&self, owner: &Identity, asset: &str) -> Result<U256, Error> {
        let owner = parse_address(owner).map_err(|r| Error::Chain(r.to_string()))?;
        let token = parse_asset(asset).map_err(|r| Error::Chain(r.to_string()))?;
        erc20::balance_of(&self.provider, token, owner).await
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
