//! EVM ledger families.
//!
//! Two families share the alloy transport: [`DelegatedEvmAdapter`] settles
//! typed-data-authorized token transfers through a standing ERC-20 allowance,
//! and [`NativeEvmAdapter`] rebroadcasts pre-signed native-value transactions
//! for chains whose base asset has no delegation primitive.

pub mod delegated;
pub mod eip712;
pub mod erc20;
pub mod native;

pub use delegated::DelegatedEvmAdapter;
pub use native::NativeEvmAdapter;

use alloy::primitives::Address;

use crate::checks::InvalidReason;
use crate::identity::Identity;

/// Parse an identity as an EVM address, reporting malformed material as a
/// business rejection rather than an internal error.
pub(crate) fn parse_address(id: &Identity) -> Result<Address, InvalidReason> {
    id.as_str()
        .parse::<Address>()
        .map_err(|e| InvalidReason::MalformedAuth(format!("invalid address {id}: {e}")))
}

/// Parse a requirement's asset field as a token contract address.
pub(crate) fn parse_asset(asset: &str) -> Result<Address, InvalidReason> {
    asset
        .parse::<Address>()
        .map_err(|e| InvalidReason::MalformedAuth(format!("invalid asset {asset}: {e}")))
}
