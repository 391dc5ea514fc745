//! Error types for key handling and envelope primitives.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised by key conversion, key wrapping and leaf sealing.
///
/// Messages carry enough context (recipient index, leaf path) to diagnose a
/// failure but never key bytes or plaintext.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A recipient public key or identity is malformed or not on the curve.
    #[error("invalid recipient key: {0}")]
    InvalidRecipientKey(String),

    /// SSH key input is not a usable Ed25519 key.
    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// None of the wrapped key entries opened with the supplied identities.
    #[error("no key group entry could be opened with the supplied private key")]
    NoMatchingRecipient,

    /// An authentication tag did not verify.
    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    /// Randomness source failure or primitive misuse. Never retried.
    #[error("internal crypto failure: {0}")]
    InternalCryptoFailure(String),
}
