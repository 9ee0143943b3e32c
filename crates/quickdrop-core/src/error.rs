//! Error types for the QuickDrop protocol engine.
//!
//! Every error terminates only the connection it occurred on and is reported to that
//! connection's delegate. [`Error::Canceled`] marks endings that are a decision rather
//! than a fault (rejection, cancellation, timeout).
//!
//! # Example
//!
//! ```
//! use quickdrop_core::{CancellationReason, Error};
//!
//! let err = Error::Canceled(CancellationReason::UserRejected);
//! assert!(err.is_canceled());
//! assert_eq!(err.user_message(), "The recipient declined the transfer");
//! ```

use std::borrow::Cow;

use quickdrop_crypto::CryptoError;
use quickdrop_discovery::AdvertisementError;
use quickdrop_files::FileError;
use thiserror::Error;

/// Why a transfer ended without completing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancellationReason {
    /// Receiver declined
    UserRejected,
    /// Either side canceled after acceptance
    UserCanceled,
    /// Receiver out of storage
    NotEnoughSpace,
    /// Receiver cannot handle the attachment type
    UnsupportedType,
    /// Receiver did not answer in time
    TimedOut,
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserRejected => write!(f, "rejected"),
            Self::UserCanceled => write!(f, "canceled"),
            Self::NotEnoughSpace => write!(f, "not enough space"),
            Self::UnsupportedType => write!(f, "unsupported attachment type"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Frame transport errors
#[derive(Debug, Error)]
pub enum FrameError {
    /// Declared length at or above the sanity limit
    #[error("frame length {length} exceeds limit of {limit} bytes")]
    TooLarge {
        /// Declared length
        length: usize,
        /// Exclusive upper bound
        limit: usize,
    },

    /// Stream failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Protocol engine errors
///
/// Peer misbehaviour surfaces in three variants: [`Error::Protocol`] and
/// [`Error::RequiredFieldMissing`] for bad frames, [`Error::Crypto`] for envelopes that fail
/// authentication or arrive out of sequence, and [`Error::Frame`] for oversized length
/// prefixes. [`Error::is_protocol`] groups them.
#[derive(Debug, Error)]
pub enum Error {
    // ============ Protocol Errors ============
    /// Peer violated the protocol
    #[error("Protocol error: {0}")]
    Protocol(Cow<'static, str>),

    /// Required protobuf field absent
    #[error("Required field missing: {0}")]
    RequiredFieldMissing(&'static str),

    // ============ Cryptographic Errors ============
    /// Key exchange failed
    #[error("Handshake failed: {0}")]
    Handshake(CryptoError),

    /// Envelope failure after the handshake
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    // ============ Transport Errors ============
    /// Framing failure
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// File or socket I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ============ Discovery Errors ============
    /// Endpoint info or service name could not be encoded or decoded
    #[error("Advertisement error: {0}")]
    Advertisement(#[from] AdvertisementError),

    /// Device is not in the discovery cache
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    // ============ Transfer Outcome ============
    /// Another outbound transfer to the same device is still running
    #[error("Transfer already in progress for {0}")]
    TransferInProgress(String),

    /// Transfer ended by a decision of either side
    #[error("Transfer {0}")]
    Canceled(CancellationReason),
}

impl Error {
    /// Protocol error from a static message
    #[must_use]
    pub const fn protocol(msg: &'static str) -> Self {
        Self::Protocol(Cow::Borrowed(msg))
    }

    /// Whether the transfer was canceled rather than failed
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled(_))
    }

    /// Whether the peer violated the protocol, including envelope and framing violations
    #[must_use]
    pub fn is_protocol(&self) -> bool {
        match self {
            Self::Protocol(_) | Self::RequiredFieldMissing(_) => true,
            Self::Frame(FrameError::TooLarge { .. }) => true,
            Self::Crypto(e) => matches!(
                e,
                CryptoError::InvalidSignature
                    | CryptoError::SequenceMismatch { .. }
                    | CryptoError::MissingField(_)
                    | CryptoError::InvalidMessage(_)
                    | CryptoError::DecryptionFailed
            ),
            _ => false,
        }
    }

    /// Short sentence suitable for a notification or status line
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Canceled(CancellationReason::UserRejected) => "The recipient declined the transfer",
            Self::Canceled(CancellationReason::UserCanceled) => "The transfer was canceled",
            Self::Canceled(CancellationReason::NotEnoughSpace) => {
                "The recipient does not have enough space"
            }
            Self::Canceled(CancellationReason::UnsupportedType) => {
                "The recipient does not support this type of attachment"
            }
            Self::Canceled(CancellationReason::TimedOut) => "The recipient did not respond in time",
            Self::Handshake(_) | Self::Crypto(_) => "Could not establish a secure connection",
            Self::Frame(_) | Self::Io(_) => "The connection was interrupted",
            Self::Protocol(_) | Self::RequiredFieldMissing(_) | Self::Advertisement(_) => {
                "The other device sent something unexpected"
            }
            Self::UnknownDevice(_) => "The device is no longer available",
            Self::TransferInProgress(_) => "A transfer to this device is already running",
        }
    }
}

impl From<prost::DecodeError> for Error {
    fn from(err: prost::DecodeError) -> Self {
        #[cfg(debug_assertions)]
        {
            Self::Protocol(Cow::Owned(format!("malformed frame: {err}")))
        }
        #[cfg(not(debug_assertions))]
        {
            let _ = err;
            Self::protocol("malformed frame")
        }
    }
}

impl From<FileError> for Error {
    fn from(err: FileError) -> Self {
        match err {
            FileError::Io(e) => Self::Io(e),
            other => Self::Protocol(Cow::Owned(other.to_string())),
        }
    }
}

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, Error>;
