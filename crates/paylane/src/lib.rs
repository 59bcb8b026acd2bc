//! Payment-authorization facilitator core.
//!
//! A facilitator verifies a signed claim that a payer authorized a bounded
//! transfer to a payee on a specific ledger, then executes that transfer on
//! the payer's behalf without ever holding the payer's funds.
//!
//! # Three-party model
//!
//! - **Payer client** — signs authorizations (typed-data ECDSA, raw-message
//!   EdDSA, or a fully pre-signed transaction) and presents them as a compact
//!   base64 proof header
//! - **Resource server** — publishes a [`PaymentRequirement`] and grants
//!   access once settlement succeeds
//! - **Facilitator** ([`Facilitator`]) — verifies proofs and settles them
//!   through the ledger-appropriate delegation mechanism
//!
//! # Quick example
//!
//! ```no_run
//! use std::sync::Arc;
//! use paylane::replay::InMemoryReplayStore;
//! use paylane::{Facilitator, FacilitatorConfig, Identity, LedgerConfig, PaymentRequirement};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), paylane::Error> {
//! let config = FacilitatorConfig::simulated(vec![LedgerConfig::NativeEvm {
//!     ledger: "eip155:10".to_string(),
//!     chain_id: 10,
//!     rpc_url: "http://localhost:8545".to_string(),
//!     facilitator_address: "0x00000000000000000000000000000000000000fa".to_string(),
//! }]);
//! let facilitator = Facilitator::new(config, Arc::new(InMemoryReplayStore::new()))?;
//!
//! let requirement = PaymentRequirement {
//!     scheme: "exact".to_string(),
//!     ledger: "eip155:10".to_string(),
//!     min_amount: "1000".to_string(),
//!     payee: Identity::new("0x00000000000000000000000000000000000000b2"),
//!     asset: "native".to_string(),
//!     facilitator_identity: Identity::new("0x00000000000000000000000000000000000000fa"),
//!     timeout_seconds: 300,
//! };
//! let result = facilitator.verify("<base64 proof header>", &requirement).await?;
//! println!("valid: {}", result.is_valid);
//! # Ok(())
//! # }
//! ```

// Core types
pub mod checks;
pub mod codec;
pub mod config;
pub mod error;
pub mod identity;
pub mod payment;
pub mod response;

// Engine
pub mod ledger;
pub mod registry;
pub mod replay;
pub mod router;

// Ledger families
pub mod evm;
pub mod spl;

// Shared server-side helpers
pub mod auth;
pub mod security;

/// The single protocol version this facilitator speaks.
pub const PROTOCOL_VERSION: u32 = 1;

/// The single supported authorization scheme: "transfer exactly this amount
/// to this recipient by this deadline".
pub const EXACT_SCHEME: &str = "exact";

// Re-exports
pub use checks::InvalidReason;
pub use codec::{decode_proof, encode_proof};
pub use config::{FacilitatorConfig, LedgerConfig, SettlementMode};
pub use error::{DecodeError, Error};
pub use identity::Identity;
pub use ledger::{LedgerAdapter, SignatureCheck};
pub use payment::{Nonce, PaymentPayload, PaymentProof, PaymentRequirement};
pub use registry::{CapabilityRegistry, SupportedKind};
pub use response::{SettlementResult, VerificationResult};
pub use router::Facilitator;
