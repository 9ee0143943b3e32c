//! Cryptographic error types.

use std::borrow::Cow;

use thiserror::Error;

use crate::proto::AlertType;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// UKEY2 validation failed; `alert` is what the peer should be told
    #[error("handshake failed: {reason}")]
    Handshake {
        /// Alert to send before closing
        alert: AlertType,
        /// Local description of the failure
        reason: Cow<'static, str>,
    },

    /// HMAC over a SecureMessage did not match
    #[error("invalid signature")]
    InvalidSignature,

    /// Sequence number was not exactly one past the previous message
    #[error("sequence number mismatch: expected {expected}, got {actual}")]
    SequenceMismatch {
        /// Expected sequence number
        expected: i32,
        /// Sequence number carried by the message
        actual: i32,
    },

    /// Sequence counter exhausted
    #[error("sequence counter exhausted")]
    SequenceOverflow,

    /// A mandatory field was absent from a decoded message
    #[error("required field missing: {0}")]
    MissingField(&'static str),

    /// Message could not be decoded or has unexpected contents
    #[error("invalid message format: {0}")]
    InvalidMessage(Cow<'static, str>),

    /// AEAD decryption failed (authentication failure)
    #[error("decryption failed: authentication failure")]
    DecryptionFailed,

    /// Invalid key length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid public key
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Key derivation failed
    #[error("key derivation failed")]
    KeyDerivationFailed,

    /// Input was not valid base64
    #[error("invalid base64 encoding")]
    InvalidEncoding,

    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,
}

impl CryptoError {
    /// Create a handshake error with static context (zero allocation)
    #[must_use]
    pub const fn handshake(alert: AlertType, reason: &'static str) -> Self {
        CryptoError::Handshake {
            alert,
            reason: Cow::Borrowed(reason),
        }
    }

    /// Create an invalid message error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_message(context: &'static str) -> Self {
        CryptoError::InvalidMessage(Cow::Borrowed(context))
    }

    /// Alert to send to the peer if this error happened mid-handshake
    #[must_use]
    pub fn alert(&self) -> AlertType {
        match self {
            CryptoError::Handshake { alert, .. } => *alert,
            CryptoError::InvalidPublicKey => AlertType::BadPublicKey,
            _ => AlertType::InternalError,
        }
    }
}
