//! Advertisement decoding errors.

use thiserror::Error;

/// Errors raised while decoding advertised records
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdvertisementError {
    /// Record shorter than its fixed header
    #[error("record too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Declared name length runs past the end of the record
    #[error("name length {declared} exceeds remaining {available} bytes")]
    NameOverrun {
        /// Declared name length
        declared: usize,
        /// Bytes left after the header
        available: usize,
    },

    /// Device name is not UTF-8
    #[error("device name is not valid UTF-8")]
    InvalidName,

    /// Service name does not carry the Quick Share PCP byte or service hash
    #[error("not a Quick Share service name")]
    ForeignService,

    /// Endpoint ID is not four alphanumeric characters
    #[error("invalid endpoint id")]
    InvalidEndpointId,

    /// TXT record missing the endpoint info key
    #[error("TXT record has no endpoint info")]
    MissingEndpointInfo,

    /// Base64 decoding failed
    #[error("invalid base64 in advertisement")]
    InvalidEncoding,

    /// Random filler could not be generated
    #[error("random number generation failed")]
    RandomFailed,
}

impl From<quickdrop_crypto::CryptoError> for AdvertisementError {
    fn from(err: quickdrop_crypto::CryptoError) -> Self {
        match err {
            quickdrop_crypto::CryptoError::InvalidEncoding => AdvertisementError::InvalidEncoding,
            _ => AdvertisementError::RandomFailed,
        }
    }
}
