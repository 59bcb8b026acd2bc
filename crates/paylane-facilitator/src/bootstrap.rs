//! Environment-driven assembly of the engine configuration.
//!
//! Each ledger family is enabled by its own set of variables; a family with
//! missing variables is skipped with a log line, never half-configured.
//!
//! | Family | Variables |
//! |--------|-----------|
//! | Delegated EVM | `EVM_DELEGATED_RPC_URL`, `EVM_DELEGATED_CHAIN_ID`, `EVM_DELEGATED_PRIVATE_KEY` (+ optional `EVM_DELEGATED_LEDGER`, `EVM_DELEGATED_DOMAIN_NAME`, `EVM_DELEGATED_DOMAIN_VERSION`) |
//! | Native EVM | `EVM_NATIVE_RPC_URL`, `EVM_NATIVE_CHAIN_ID`, `EVM_NATIVE_FACILITATOR_ADDRESS` (+ optional `EVM_NATIVE_LEDGER`) |
//! | SPL token | `SPL_RPC_URL`, `SPL_PRIVATE_KEY` (+ optional `SPL_LEDGER`, `SPL_TOKEN_PROGRAM`) |

use std::sync::Arc;

use paylane::replay::{InMemoryReplayStore, ReplayStore, SqliteReplayStore};
use paylane::{LedgerConfig, SettlementMode};

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Read the settlement mode. Defaults to real; simulation must be explicit.
pub fn load_settlement_mode() -> SettlementMode {
    match env("PAYLANE_SETTLEMENT_MODE").as_deref() {
        None | Some("real") => SettlementMode::Real,
        Some("simulated") => {
            tracing::warn!("settlement mode: SIMULATED — no transfers will reach any ledger");
            SettlementMode::Simulated
        }
        Some(other) => {
            tracing::error!("invalid PAYLANE_SETTLEMENT_MODE {other:?} (expected real|simulated)");
            std::process::exit(1);
        }
    }
}

fn parse_chain_id(var: &str, raw: &str) -> u64 {
    raw.parse().unwrap_or_else(|_| {
        tracing::error!("invalid {var}: {raw:?}");
        std::process::exit(1);
    })
}

/// Assemble the ledger entries from the environment.
pub fn load_ledgers() -> Vec<LedgerConfig> {
    let mut ledgers = Vec::new();

    match (
        env("EVM_DELEGATED_RPC_URL"),
        env("EVM_DELEGATED_CHAIN_ID"),
        env("EVM_DELEGATED_PRIVATE_KEY"),
    ) {
        (Some(rpc_url), Some(chain_id), Some(signer_key)) => {
            let chain_id = parse_chain_id("EVM_DELEGATED_CHAIN_ID", &chain_id);
            let ledger =
                env("EVM_DELEGATED_LEDGER").unwrap_or_else(|| format!("eip155:{chain_id}"));
            tracing::info!(ledger = %ledger, "delegated-EVM ledger enabled");
            ledgers.push(LedgerConfig::DelegatedEvm {
                ledger,
                chain_id,
                rpc_url,
                signer_key,
                domain_name: env("EVM_DELEGATED_DOMAIN_NAME")
                    .unwrap_or_else(|| "paylane".to_string()),
                domain_version: env("EVM_DELEGATED_DOMAIN_VERSION")
                    .unwrap_or_else(|| "1".to_string()),
            });
        }
        _ => tracing::info!("delegated-EVM ledger not configured, skipping"),
    }

    match (
        env("EVM_NATIVE_RPC_URL"),
        env("EVM_NATIVE_CHAIN_ID"),
        env("EVM_NATIVE_FACILITATOR_ADDRESS"),
    ) {
        (Some(rpc_url), Some(chain_id), Some(facilitator_address)) => {
            let chain_id = parse_chain_id("EVM_NATIVE_CHAIN_ID", &chain_id);
            let ledger = env("EVM_NATIVE_LEDGER").unwrap_or_else(|| format!("eip155:{chain_id}"));
            tracing::info!(ledger = %ledger, "native-EVM ledger enabled");
            ledgers.push(LedgerConfig::NativeEvm {
                ledger,
                chain_id,
                rpc_url,
                facilitator_address,
            });
        }
        _ => tracing::info!("native-EVM ledger not configured, skipping"),
    }

    match (env("SPL_RPC_URL"), env("SPL_PRIVATE_KEY")) {
        (Some(rpc_url), Some(signer_key)) => {
            let ledger = env("SPL_LEDGER").unwrap_or_else(|| "solana:mainnet".to_string());
            tracing::info!(ledger = %ledger, "SPL-token ledger enabled");
            ledgers.push(LedgerConfig::SplToken {
                ledger,
                rpc_url,
                signer_key,
                token_program: env("SPL_TOKEN_PROGRAM")
                    .unwrap_or_else(|| paylane::spl::wire::TOKEN_PROGRAM.to_string()),
            });
        }
        _ => tracing::info!("SPL-token ledger not configured, skipping"),
    }

    ledgers
}

/// Open the replay seen-set.
///
/// SQLite is mandatory: an in-memory seen-set loses its claims on restart,
/// re-opening the replay window for anything still inside its deadline.
/// `PAYLANE_ALLOW_VOLATILE_REPLAY=true` overrides for local development.
pub fn load_replay_store() -> Arc<dyn ReplayStore> {
    let path = env("REPLAY_DB_PATH").unwrap_or_else(|| "./paylane-replay.db".to_string());

    match SqliteReplayStore::open(&path) {
        Ok(store) => {
            tracing::info!("replay store: SQLite at {path}");
            Arc::new(store)
        }
        Err(e) => {
            let allow_volatile = env("PAYLANE_ALLOW_VOLATILE_REPLAY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false);
            if allow_volatile {
                tracing::warn!(
                    "failed to open SQLite replay store at {path}: {e} — \
                     falling back to in-memory (replay protection lost on restart)"
                );
                Arc::new(InMemoryReplayStore::new())
            } else {
                tracing::error!("failed to open SQLite replay store at {path}: {e}");
                tracing::error!(
                    "refusing to start — an in-memory fallback would enable replay after restart \
                     (set PAYLANE_ALLOW_VOLATILE_REPLAY=true to override for development)"
                );
                std::process::exit(1);
            }
        }
    }
}

/// Default claim retention. Claims for proofs with deadlines beyond this are
/// an operator tradeoff — raise PAYLANE_REPLAY_RETENTION_SECS to match.
const DEFAULT_RETENTION_SECS: u64 = 30 * 24 * 3600;

/// Background task purging replay claims past their retention window.
pub fn spawn_replay_purge(store: Arc<dyn ReplayStore>) {
    let retention = env("PAYLANE_REPLAY_RETENTION_SECS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_RETENTION_SECS);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            let purged = store.purge_expired(retention);
            if purged > 0 {
                tracing::info!(purged, "purged expired replay claims");
            }
        }
    });
}
