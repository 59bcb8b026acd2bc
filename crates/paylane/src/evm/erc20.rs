//! ERC-20 reads and the delegated `transferFrom` settlement call.

use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::Provider;
use alloy::sol;

use crate::error::Error;

sol! {
    #[sol(rpc)]
    interface Erc20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function transferFrom(address from, address to, uint256 value) external returns (bool);
    }
}

/// Read timeout for balance/allowance queries.
const READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
/// Submission timeout; a hang here holds the adapter's settle lock.
const SEND_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
/// Confirmation timeout.
const RECEIPT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Query the token balance of `owner`.
pub async fn balance_of<P: Provider>(
    provider: &P,
    token: Address,
    owner: Address,
) -> Result<U256, Error> {
    let contract = Erc20::new(token, provider);
    let balance = tokio::time::timeout(READ_TIMEOUT, contract.balanceOf(owner).call())
        .await
        .map_err(|_| Error::Chain("balanceOf timed out after 10s".to_string()))?
        .map_err(|e| Error::Chain(format!("balanceOf failed: {e}")))?;
    Ok(balance)
}

/// Query the allowance `owner` has granted to `spender`.
pub async fn allowance<P: Provider>(
    provider: &P,
    token: Address,
    owner: Address,
    spender: Address,
) -> Result<U256, Error> {
    let contract = Erc20::new(token, provider);
    let remaining = tokio::time::timeout(READ_TIMEOUT, contract.allowance(owner, spender).call())
        .await
        .map_err(|_| Error::Chain("allowance timed out after 10s".to_string()))?
        .map_err(|e| Error::Chain(format!("allowance failed: {e}")))?;
    Ok(remaining)
}

/// Failure modes of a delegated transfer, kept distinct so the caller can
/// tell "definitely failed" from "outcome unknown".
#[derive(Debug)]
pub enum TransferError {
    /// Submission timed out — the transaction may or may not be in flight.
    SendTimeout,
    /// Submitted, hash known, but confirmation never came back.
    ReceiptTimeout(TxHash),
    /// The ledger executed and reverted the transfer.
    Reverted(TxHash),
    /// RPC rejected the submission outright; text is the ledger's own.
    Rpc(String),
}

/// Execute `transferFrom(from, to, value)` with the facilitator's wallet.
pub async fn transfer_from<P: Provider>(
    provider: &P,
    token: Address,
    from: Address,
    to: Address,
    value: U256,
) -> Result<TxHash, TransferError> {
    let contract = Erc20::new(token, provider);

    let pending = tokio::time::timeout(SEND_TIMEOUT, contract.transferFrom(from, to, value).send())
        .await
        .map_err(|_| TransferError::SendTimeout)?
        .map_err(|e| TransferError::Rpc(format!("transferFrom send failed: {e}")))?;

    let tx_hash = *pending.tx_hash();

    let receipt = tokio::time::timeout(RECEIPT_TIMEOUT, pending.get_receipt())
        .await
        .map_err(|_| TransferError::ReceiptTimeout(tx_hash))?
        .map_err(|e| TransferError::Rpc(format!("transferFrom receipt failed: {e}")))?;

    if !receipt.status() {
        return Err(TransferError::Reverted(receipt.transaction_hash));
    }

    Ok(receipt.transaction_hash)
}
