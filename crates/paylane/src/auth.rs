//! Request authentication MACs for the facilitator's HTTP surface.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 over a request body, hex-encoded.
pub fn request_mac(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    alloy::hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex MAC against a request body.
///
/// Comparison is constant-time; undecodable hex is compared against zeros so
/// malformed input takes the same path as a wrong MAC.
pub fn verify_request_mac(secret: &[u8], body: &[u8], mac_hex: &str) -> bool {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);

    let expected = alloy::hex::decode(mac_hex).unwrap_or_else(|_| vec![0u8; 32]);
    mac.verify_slice(&expected).is_ok()
}
