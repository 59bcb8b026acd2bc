//! SPL-token ledger family.
//!
//! Authorizations are raw-message EdDSA signatures over a canonical
//! pipe-delimited string; settlement moves tokens `payer -> payee` through a
//! standing delegate approval to the facilitator's ed25519 key, submitted as
//! a legacy transaction over JSON-RPC.
//!
//! Identities in this family are wallet public keys; the token accounts
//! actually holding the asset are resolved per (owner, mint) through the
//! ledger's own index at settlement time.

pub mod adapter;
pub mod message;
pub mod rpc;
pub mod wire;

pub use adapter::SplTokenAdapter;

use crate::checks::InvalidReason;
use crate::identity::Identity;

/// Parse an identity as a 32-byte base58 public key.
pub(crate) fn parse_pubkey(id: &Identity) -> Result<[u8; 32], InvalidReason> {
    let bytes = bs58::decode(id.as_str())
        .into_vec()
        .map_err(|e| InvalidReason::MalformedAuth(format!("invalid base58 identity {id}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| InvalidReason::MalformedAuth(format!("identity {id} is not 32 bytes")))
}
