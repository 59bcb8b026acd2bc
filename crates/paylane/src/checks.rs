//! Ledger-independent proof validation.
//!
//! [`check_invariants`] is pure and evaluated in a fixed order so that a
//! proof violating several rules always reports the same reason; callers and
//! tests rely on that ordering.

use alloy::primitives::U256;
use std::fmt;

use crate::codec::parse_amount;
use crate::error::Error;
use crate::identity::Identity;
use crate::payment::{PaymentPayload, PaymentRequirement};

/// Stable, machine-matchable rejection reasons carried inside result objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    UnsupportedVersion(u32),
    UnsupportedScheme(String),
    UnsupportedLedger(String),
    RequirementMismatch(String),
    Expired,
    InsufficientAmount,
    InvalidRecipient,
    FacilitatorIsPayee,
    FacilitatorMismatch,
    InvalidSignature,
    MalformedAuth(String),
    InsufficientBalance,
    InsufficientAllowance,
    AlreadySettled,
    Other(String),
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::UnsupportedVersion(v) => {
                write!(f, "unsupported protocol version: {v}")
            }
            InvalidReason::UnsupportedScheme(s) => write!(f, "unsupported scheme: {s}"),
            InvalidReason::UnsupportedLedger(l) => write!(f, "unsupported ledger: {l}"),
            InvalidReason::RequirementMismatch(d) => write!(f, "requirement mismatch: {d}"),
            InvalidReason::Expired => f.write_str("authorization expired"),
            InvalidReason::InsufficientAmount => f.write_str("insufficient amount"),
            InvalidReason::InvalidRecipient => f.write_str("invalid recipient"),
            InvalidReason::FacilitatorIsPayee => {
                f.write_str("invalid recipient: facilitator cannot be the payee")
            }
            InvalidReason::FacilitatorMismatch => {
                f.write_str("facilitator identity mismatch")
            }
            InvalidReason::InvalidSignature => f.write_str("invalid signature"),
            InvalidReason::MalformedAuth(d) => write!(f, "malformed authorization: {d}"),
            InvalidReason::InsufficientBalance => f.write_str("insufficient balance"),
            InvalidReason::InsufficientAllowance => {
                f.write_str("insufficient delegation allowance")
            }
            InvalidReason::AlreadySettled => f.write_str("authorization already settled"),
            InvalidReason::Other(d) => f.write_str(d),
        }
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> Result<u64, Error> {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| Error::Config(format!("system time error: {e}")))
}

/// Validate the ledger-independent invariants, strictly in this order:
///
/// 1. `now <= deadline`, else [`InvalidReason::Expired`]
/// 2. `amount >= requirement.min_amount`, else [`InvalidReason::InsufficientAmount`]
/// 3. `payload.payee == requirement.payee` (hex-case-insensitive), else
///    [`InvalidReason::InvalidRecipient`]
///
/// Returns the parsed amount so callers don't re-parse.
pub fn check_invariants(
    payload: &PaymentPayload,
    requirement: &PaymentRequirement,
    now: u64,
) -> Result<U256, InvalidReason> {
    if now > payload.deadline {
        return Err(InvalidReason::Expired);
    }

    let amount = parse_amount(&payload.amount)
        .map_err(|e| InvalidReason::MalformedAuth(e.to_string()))?;
    let min_amount = parse_amount(&requirement.min_amount)
        .map_err(|e| InvalidReason::MalformedAuth(format!("required amount: {e}")))?;
    if amount < min_amount {
        return Err(InvalidReason::InsufficientAmount);
    }

    if payload.payee != requirement.payee {
        return Err(InvalidReason::InvalidRecipient);
    }

    Ok(amount)
}

/// Reject proofs that route funds to the facilitator itself.
///
/// An earlier design bound the payee to the facilitator's own address; the
/// corrected model requires the facilitator to appear only as verifier and
/// submitter, never as destination.
pub fn check_facilitator_guard(
    payload: &PaymentPayload,
    requirement: &PaymentRequirement,
    facilitator: &Identity,
) -> Result<(), InvalidReason> {
    if &payload.payee == facilitator {
        return Err(InvalidReason::FacilitatorIsPayee);
    }
    if &requirement.facilitator_identity != facilitator {
        return Err(InvalidReason::FacilitatorMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::Nonce;

    const NOW: u64 = 1_800_000_000;

    fn payee() -> Identity {
        Identity::new("0x00000000000000000000000000000000000000b2")
    }

    fn payload() -> PaymentPayload {
        PaymentPayload {
            payer: Identity::new("0x00000000000000000000000000000000000000a1"),
            payee: payee(),
            amount: "1000".to_string(),
            nonce: Nonce::Number(1),
            deadline: NOW + 300,
            signature: "0x00".to_string(),
            ledger_specific_auth: None,
        }
    }

    fn requirement() -> PaymentRequirement {
        PaymentRequirement {
            scheme: "exact".to_string(),
            ledger: "eip155:8453".to_string(),
            min_amount: "1000".to_string(),
            payee: payee(),
            asset: "0x00000000000000000000000000000000000000cc".to_string(),
            facilitator_identity: Identity::new("0x00000000000000000000000000000000000000fa"),
            timeout_seconds: 300,
        }
    }

    #[test]
    fn conforming_payload_passes() {
        let amount = check_invariants(&payload(), &requirement(), NOW).unwrap();
        assert_eq!(amount, U256::from(1000u64));
    }

    #[test]
    fn deadline_is_inclusive() {
        let mut p = payload();
        p.deadline = NOW;
        assert!(check_invariants(&p, &requirement(), NOW).is_ok());
    }

    #[test]
    fn expired_payload_is_rejected() {
        let mut p = payload();
        p.deadline = NOW - 300;
        assert_eq!(
            check_invariants(&p, &requirement(), NOW).unwrap_err(),
            InvalidReason::Expired
        );
    }

    #[test]
    fn short_amount_is_rejected() {
        let mut p = payload();
        p.amount = "1".to_string();
        let mut r = requirement();
        r.min_amount = "10000000000000000".to_string();
        assert_eq!(
            check_invariants(&p, &r, NOW).unwrap_err(),
            InvalidReason::InsufficientAmount
        );
    }

    #[test]
    fn wrong_recipient_is_rejected() {
        let mut p = payload();
        p.payee = Identity::new("0x00000000000000000000000000000000000000ee");
        assert_eq!(
            check_invariants(&p, &requirement(), NOW).unwrap_err(),
            InvalidReason::InvalidRecipient
        );
    }

    #[test]
    fn recipient_comparison_ignores_hex_case() {
        let mut p = payload();
        p.payee = Identity::new("0x00000000000000000000000000000000000000B2");
        assert!(check_invariants(&p, &requirement(), NOW).is_ok());
    }

    // The reason reported for a multiply-invalid proof is determined by the
    // evaluation order: expiry wins over amount, amount wins over recipient.

    #[test]
    fn expiry_is_reported_before_amount() {
        let mut p = payload();
        p.deadline = NOW - 1;
        p.amount = "1".to_string();
        let mut r = requirement();
        r.min_amount = "10000000000000000".to_string();
        assert_eq!(
            check_invariants(&p, &r, NOW).unwrap_err(),
            InvalidReason::Expired
        );
    }

    #[test]
    fn amount_is_reported_before_recipient() {
        let mut p = payload();
        p.amount = "1".to_string();
        p.payee = Identity::new("0x00000000000000000000000000000000000000ee");
        let mut r = requirement();
        r.min_amount = "10000000000000000".to_string();
        assert_eq!(
            check_invariants(&p, &r, NOW).unwrap_err(),
            InvalidReason::InsufficientAmount
        );
    }

    #[test]
    fn facilitator_as_payee_is_rejected() {
        let facilitator = payee(); // proof pays the facilitator itself
        let mut r = requirement();
        r.facilitator_identity = facilitator.clone();
        assert_eq!(
            check_facilitator_guard(&payload(), &r, &facilitator).unwrap_err(),
            InvalidReason::FacilitatorIsPayee
        );
    }

    #[test]
    fn requirement_naming_wrong_facilitator_is_rejected() {
        let facilitator = Identity::new("0x00000000000000000000000000000000000000fa");
        let mut r = requirement();
        r.facilitator_identity = Identity::new("0x00000000000000000000000000000000000000fb");
        assert_eq!(
            check_facilitator_guard(&payload(), &r, &facilitator).unwrap_err(),
            InvalidReason::FacilitatorMismatch
        );
    }

    #[test]
    fn reason_strings_are_stable() {
        assert!(InvalidReason::Expired.to_string().contains("expired"));
        assert!(InvalidReason::InsufficientAmount.to_string().contains("amount"));
        assert!(InvalidReason::InvalidRecipient.to_string().contains("recipient"));
        assert!(InvalidReason::FacilitatorIsPayee.to_string().contains("recipient"));
        assert!(InvalidReason::InsufficientBalance.to_string().contains("balance"));
        assert!(InvalidReason::UnsupportedScheme("x".into()).to_string().contains("scheme"));
        assert!(InvalidReason::UnsupportedLedger("x".into()).to_string().contains("ledger"));
    }
}
