//! Constant-time comparison helpers.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Compare two byte strings without leaking content or length through
/// timing: both sides are hashed to fixed-length digests first, then
/// compared with `subtle`.
///
/// Used for bearer-token checks on operational endpoints.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let ha = Sha256::digest(a);
    let hb = Sha256::digest(b);
    ha.ct_eq(&hb).into()
}
