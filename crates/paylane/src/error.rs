use thiserror::Error;

/// Failures while unwrapping the proof envelope.
///
/// These are transport-level faults, never business rejections: a proof that
/// decodes but fails verification produces an `invalidReason` instead.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The header is not valid base64, not UTF-8, or not JSON at all.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The JSON parsed but required fields are absent or of the wrong type.
    #[error("schema violation: {0}")]
    SchemaViolation(String),
}

/// Internal errors surfaced by facilitator operations.
///
/// Business-rule rejections never appear here — they are recovered locally
/// into [`crate::VerificationResult`] / [`crate::SettlementResult`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("signature error: {0}")]
    Signature(String),

    #[error("chain error: {0}")]
    Chain(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
