//! Engine error types.

use sopsage_crypto::CryptoError;
use std::fmt;
use thiserror::Error;

/// Result type for engine operations.
pub type SopsResult<T> = Result<T, SopsError>;

/// Errors that can occur while encrypting or decrypting a document.
#[derive(Debug, Error)]
pub enum SopsError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("ambiguous classification: {0}")]
    AmbiguousClassification(String),

    #[error("rule {rule} is not supported for {format} documents")]
    UnsupportedRuleForFormat { rule: String, format: String },

    #[error("invalid classification rule: {0}")]
    InvalidRule(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Flat error classification shared by both crates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedFormat,
    MalformedDocument,
    AmbiguousClassification,
    UnsupportedRuleForFormat,
    InvalidRule,
    InvalidConfig,
    InvalidRecipientKey,
    InvalidKeyFormat,
    NoMatchingRecipient,
    AuthenticationFailure,
    InternalCryptoFailure,
}

impl SopsError {
    /// Returns the kind of this error, looking through wrapped crypto errors.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::MalformedDocument(_) => ErrorKind::MalformedDocument,
            Self::AmbiguousClassification(_) => ErrorKind::AmbiguousClassification,
            Self::UnsupportedRuleForFormat { .. } => ErrorKind::UnsupportedRuleForFormat,
            Self::InvalidRule(_) => ErrorKind::InvalidRule,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::Crypto(e) => match e {
                CryptoError::InvalidRecipientKey(_) => ErrorKind::InvalidRecipientKey,
                CryptoError::InvalidKeyFormat(_) => ErrorKind::InvalidKeyFormat,
                CryptoError::NoMatchingRecipient => ErrorKind::NoMatchingRecipient,
                CryptoError::AuthenticationFailure(_) => ErrorKind::AuthenticationFailure,
                CryptoError::InternalCryptoFailure(_) => ErrorKind::InternalCryptoFailure,
            },
        }
    }

    pub(crate) fn authentication(message: impl Into<String>) -> Self {
        Self::Crypto(CryptoError::AuthenticationFailure(message.into()))
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UnsupportedFormat => "UnsupportedFormat",
            Self::MalformedDocument => "MalformedDocument",
            Self::AmbiguousClassification => "AmbiguousClassification",
            Self::UnsupportedRuleForFormat => "UnsupportedRuleForFormat",
            Self::InvalidRule => "InvalidRule",
            Self::InvalidConfig => "InvalidConfig",
            Self::InvalidRecipientKey => "InvalidRecipientKey",
            Self::InvalidKeyFormat => "InvalidKeyFormat",
            Self::NoMatchingRecipient => "NoMatchingRecipient",
            Self::AuthenticationFailure => "AuthenticationFailure",
            Self::InternalCryptoFailure => "InternalCryptoFailure",
        };
        f.write_str(name)
    }
}
