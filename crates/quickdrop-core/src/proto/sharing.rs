//! Nearby Sharing transfer-setup frames (`sharing.nearby`).
//!
//! Sent only after encryption is enabled, each serialized frame travelling as a
//! BYTES payload.

use prost::Message;
use quickdrop_crypto::random::random_vec;

use crate::error::{Error, Result};

pub use connection_response_frame::Status as ResponseStatus;
pub use paired_key_result_frame::Status as PairedKeyStatus;
pub use v1_frame::FrameType;

/// Outer frame
#[derive(Clone, PartialEq, Message)]
pub struct Frame {
    /// Frame version
    #[prost(enumeration = "frame::Version", optional, tag = "1")]
    pub version: Option<i32>,
    /// Version 1 body
    #[prost(message, optional, tag = "2")]
    pub v1: Option<V1Frame>,
}

/// Nested types for [`Frame`]
pub mod frame {
    /// Frame version
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Version {
        /// Unset
        UnknownVersion = 0,
        /// Version 1
        V1 = 1,
    }
}

/// Version 1 body
#[derive(Clone, PartialEq, Message)]
pub struct V1Frame {
    /// Which sub-frame is present
    #[prost(enumeration = "v1_frame::FrameType", optional, tag = "1")]
    pub r#type: Option<i32>,
    /// Transfer contents
    #[prost(message, optional, tag = "2")]
    pub introduction: Option<IntroductionFrame>,
    /// Receiver's decision
    #[prost(message, optional, tag = "3")]
    pub connection_response: Option<ConnectionResponseFrame>,
    /// Paired key proof
    #[prost(message, optional, tag = "4")]
    pub paired_key_encryption: Option<PairedKeyEncryptionFrame>,
    /// Paired key verdict
    #[prost(message, optional, tag = "5")]
    pub paired_key_result: Option<PairedKeyResultFrame>,
}

/// Nested types for [`V1Frame`]
pub mod v1_frame {
    /// Sharing frame types
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum FrameType {
        /// Unset
        UnknownFrameType = 0,
        /// Introduction
        Introduction = 1,
        /// Accept / reject response
        Response = 2,
        /// Paired key encryption
        PairedKeyEncryption = 3,
        /// Paired key result
        PairedKeyResult = 4,
        /// Certificate info (ignored)
        CertificateInfo = 5,
        /// Cancel
        Cancel = 6,
    }
}

/// What the sender intends to transfer
#[derive(Clone, PartialEq, Message)]
pub struct IntroductionFrame {
    /// Files
    #[prost(message, repeated, tag = "1")]
    pub file_metadata: Vec<FileMetadata>,
    /// Text items
    #[prost(message, repeated, tag = "2")]
    pub text_metadata: Vec<TextMetadata>,
    /// Unused
    #[prost(string, optional, tag = "3")]
    pub required_package: Option<String>,
}

/// One file of an introduction
#[derive(Clone, PartialEq, Message)]
pub struct FileMetadata {
    /// File name
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    /// Attachment kind
    #[prost(enumeration = "file_metadata::Type", optional, tag = "2")]
    pub r#type: Option<i32>,
    /// Payload carrying the contents
    #[prost(int64, optional, tag = "3")]
    pub payload_id: Option<i64>,
    /// Size in bytes
    #[prost(int64, optional, tag = "4")]
    pub size: Option<i64>,
    /// MIME type
    #[prost(string, optional, tag = "5", default = "application/octet-stream")]
    pub mime_type: Option<String>,
    /// Attachment ID
    #[prost(int64, optional, tag = "6")]
    pub id: Option<i64>,
}

/// Nested types for [`FileMetadata`]
pub mod file_metadata {
    /// Attachment kind
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        /// Other
        Unknown = 0,
        /// Image
        Image = 1,
        /// Video
        Video = 2,
        /// Android app
        App = 3,
        /// Audio
        Audio = 4,
    }
}

/// One text item of an introduction
#[derive(Clone, PartialEq, Message)]
pub struct TextMetadata {
    /// Title shown before acceptance
    #[prost(string, optional, tag = "2")]
    pub text_title: Option<String>,
    /// Text kind
    #[prost(enumeration = "text_metadata::Type", optional, tag = "3")]
    pub r#type: Option<i32>,
    /// Payload carrying the text
    #[prost(int64, optional, tag = "4")]
    pub payload_id: Option<i64>,
    /// UTF-8 length
    #[prost(int64, optional, tag = "5")]
    pub size: Option<i64>,
    /// Attachment ID
    #[prost(int64, optional, tag = "6")]
    pub id: Option<i64>,
}

/// Nested types for [`TextMetadata`]
pub mod text_metadata {
    /// Text kind
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        /// Unset
        Unknown = 0,
        /// Plain text
        Text = 1,
        /// URL
        Url = 2,
        /// Street address
        Address = 3,
        /// Phone number
        PhoneNumber = 4,
    }
}

/// Receiver's answer to an introduction
#[derive(Clone, PartialEq, Message)]
pub struct ConnectionResponseFrame {
    /// Decision
    #[prost(enumeration = "connection_response_frame::Status", optional, tag = "1")]
    pub status: Option<i32>,
}

/// Nested types for [`ConnectionResponseFrame`]
pub mod connection_response_frame {
    /// Decision
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Status {
        /// Unset
        Unknown = 0,
        /// Accepted
        Accept = 1,
        /// Declined
        Reject = 2,
        /// Out of storage
        NotEnoughSpace = 3,
        /// Unsupported attachment
        UnsupportedAttachmentType = 4,
        /// No answer in time
        TimedOut = 5,
    }
}

/// Paired key proof (contacts-based visibility)
#[derive(Clone, PartialEq, Message)]
pub struct PairedKeyEncryptionFrame {
    /// Signature over the auth token
    #[prost(bytes = "vec", optional, tag = "1")]
    pub signed_data: Option<Vec<u8>>,
    /// Hash of the certificate's secret ID
    #[prost(bytes = "vec", optional, tag = "2")]
    pub secret_id_hash: Option<Vec<u8>>,
    /// Unused
    #[prost(bytes = "vec", optional, tag = "3")]
    pub optional_signed_data: Option<Vec<u8>>,
}

/// Paired key verdict
#[derive(Clone, PartialEq, Message)]
pub struct PairedKeyResultFrame {
    /// Verdict
    #[prost(enumeration = "paired_key_result_frame::Status", optional, tag = "1")]
    pub status: Option<i32>,
}

/// Nested types for [`PairedKeyResultFrame`]
pub mod paired_key_result_frame {
    /// Verdict
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Status {
        /// Unset
        Unknown = 0,
        /// Verified
        Success = 1,
        /// Verification failed
        Fail = 2,
        /// Could not verify
        Unable = 3,
    }
}

// ============ Builders ============

const SECRET_ID_HASH_SIZE: usize = 6;
const SIGNED_DATA_SIZE: usize = 72;

fn wrap(frame_type: FrameType, v1: V1Frame) -> Frame {
    Frame {
        version: Some(frame::Version::V1 as i32),
        v1: Some(V1Frame {
            r#type: Some(frame_type as i32),
            ..v1
        }),
    }
}

/// Paired key proof filled with random bytes; certificates are not supported.
///
/// # Errors
///
/// Returns an error if randomness is unavailable.
pub fn paired_key_encryption() -> Result<Frame> {
    Ok(wrap(
        FrameType::PairedKeyEncryption,
        V1Frame {
            paired_key_encryption: Some(PairedKeyEncryptionFrame {
                secret_id_hash: Some(random_vec(SECRET_ID_HASH_SIZE)?),
                signed_data: Some(random_vec(SIGNED_DATA_SIZE)?),
                optional_signed_data: None,
            }),
            ..Default::default()
        },
    ))
}

/// Paired key verdict
#[must_use]
pub fn paired_key_result(status: PairedKeyStatus) -> Frame {
    wrap(
        FrameType::PairedKeyResult,
        V1Frame {
            paired_key_result: Some(PairedKeyResultFrame {
                status: Some(status as i32),
            }),
            ..Default::default()
        },
    )
}

/// Accept / reject response
#[must_use]
pub fn response(status: ResponseStatus) -> Frame {
    wrap(
        FrameType::Response,
        V1Frame {
            connection_response: Some(ConnectionResponseFrame {
                status: Some(status as i32),
            }),
            ..Default::default()
        },
    )
}

/// Cancel
#[must_use]
pub fn cancel() -> Frame {
    wrap(FrameType::Cancel, V1Frame::default())
}

/// Introduction
#[must_use]
pub fn introduction(file_metadata: Vec<FileMetadata>, text_metadata: Vec<TextMetadata>) -> Frame {
    wrap(
        FrameType::Introduction,
        V1Frame {
            introduction: Some(IntroductionFrame {
                file_metadata,
                text_metadata,
                required_package: None,
            }),
            ..Default::default()
        },
    )
}

// ============ Accessors ============

/// Validate the version and return the frame type with its V1 body.
///
/// # Errors
///
/// Returns [`Error::RequiredFieldMissing`] if the V1 body or its type is absent.
pub fn v1(msg: &Frame) -> Result<(FrameType, &V1Frame)> {
    if msg.version.is_some() && msg.version() != frame::Version::V1 {
        return Err(Error::protocol("unsupported sharing frame version"));
    }
    let v1 = msg
        .v1
        .as_ref()
        .ok_or(Error::RequiredFieldMissing("sharingFrame.v1"))?;
    if v1.r#type.is_none() {
        return Err(Error::RequiredFieldMissing("sharingFrame.v1.type"));
    }
    Ok((v1.r#type(), v1))
}

/// Decode a sharing frame.
///
/// # Errors
///
/// Returns [`Error::Protocol`] on malformed input.
pub fn decode(bytes: &[u8]) -> Result<Frame> {
    Ok(Frame::decode(bytes)?)
}
