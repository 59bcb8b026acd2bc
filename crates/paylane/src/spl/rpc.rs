//! Minimal Solana JSON-RPC client for the calls this adapter needs.

use crate::error::Error;

const READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
const SEND_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

pub struct SolanaRpc {
    http: reqwest::Client,
    url: String,
}

impl SolanaRpc {
    pub fn new(url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
        }
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
        timeout: std::time::Duration,
    ) -> Result<serde_json::Value, Error> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = tokio::time::timeout(timeout, self.http.post(&self.url).json(&body).send())
            .await
            .map_err(|_| Error::Chain(format!("{method} timed out after {}s", timeout.as_secs())))?
            .map_err(|e| Error::Chain(format!("{method} request failed: {e}")))?;

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Chain(format!("{method} returned invalid JSON: {e}")))?;

        // Surface the ledger's own error text verbatim.
        if let Some(err) = value.get("error") {
            return Err(Error::Chain(format!("{method} failed: {err}")));
        }

        value
            .get("result")
            .cloned()
            .ok_or_else(|| Error::Chain(format!("{method} response missing result")))
    }

    /// Fetch a recent blockhash to anchor a new transaction.
    pub async fn latest_blockhash(&self) -> Result<[u8; 32], Error> {
        let result = self
            .call("getLatestBlockhash", serde_json::json!([]), READ_TIMEOUT)
            .await?;
        let blockhash = result
            .pointer("/value/blockhash")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Chain("getLatestBlockhash: missing blockhash".to_string()))?;
        let bytes = bs58::decode(blockhash)
            .into_vec()
            .map_err(|e| Error::Chain(format!("invalid blockhash encoding: {e}")))?;
        bytes
            .try_into()
            .map_err(|_| Error::Chain("blockhash is not 32 bytes".to_string()))
    }

    /// Find the owner's token account for a mint. Returns the first holding
    /// account, or `None` when the owner holds no account for that mint.
    pub async fn token_account_by_owner(
        &self,
        owner: &str,
        mint: &str,
    ) -> Result<Option<String>, Error> {
        let result = self
            .call(
                "getTokenAccountsByOwner",
                serde_json::json!([owner, { "mint": mint }, { "encoding": "jsonParsed" }]),
                READ_TIMEOUT,
            )
            .await?;
        let account = result
            .pointer("/value/0/pubkey")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Ok(account)
    }

    /// Read a token account's balance in minor units.
    pub async fn token_account_balance(&self, account: &str) -> Result<u64, Error> {
        let result = self
            .call(
                "getTokenAccountBalance",
                serde_json::json!([account]),
                READ_TIMEOUT,
            )
            .await?;
        let amount = result
            .pointer("/value/amount")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Chain("getTokenAccountBalance: missing amount".to_string()))?;
        amount
            .parse::<u64>()
            .map_err(|e| Error::Chain(format!("unparseable token balance {amount:?}: {e}")))
    }

    /// Submit a signed transaction (base64). Returns the transaction
    /// signature the ledger will index it under.
    pub async fn send_transaction(&self, tx_base64: &str) -> Result<String, Error> {
        let result = self
            .call(
                "sendTransaction",
                serde_json::json!([tx_base64, { "encoding": "base64" }]),
                SEND_TIMEOUT,
            )
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Chain("sendTransaction: non-string signature".to_string()))
    }

    /// Node reachability probe.
    pub async fn health(&self) -> Result<(), Error> {
        let result = self
            .call("getHealth", serde_json::json!([]), READ_TIMEOUT)
            .await?;
        if result.as_str() == Some("ok") {
            Ok(())
        } else {
            Err(Error::Chain(format!("node unhealthy: {result}")))
        }
    }
}
