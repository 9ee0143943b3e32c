//! Nearby Connections offline frames (`location.nearby.connections`).
//!
//! These carry the connection request/response, payload chunks, keep-alives and
//! disconnection notices. Before the handshake they travel in plaintext; afterwards
//! each one is the body of a SecureMessage.

use prost::Message;

use crate::error::{Error, Result};

pub use payload_transfer_frame::payload_chunk::LAST_CHUNK;
pub use payload_transfer_frame::payload_header::PayloadType;
pub use payload_transfer_frame::{PacketType, PayloadChunk, PayloadHeader};
pub use v1_frame::FrameType;

/// Outer frame
#[derive(Clone, PartialEq, Message)]
pub struct OfflineFrame {
    /// Frame version
    #[prost(enumeration = "offline_frame::Version", optional, tag = "1")]
    pub version: Option<i32>,
    /// Version 1 body
    #[prost(message, optional, tag = "2")]
    pub v1: Option<V1Frame>,
}

/// Nested types for [`OfflineFrame`]
pub mod offline_frame {
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

/// Version 1 frame body; exactly one sub-frame matching `type` is set
#[derive(Clone, PartialEq, Message)]
pub struct V1Frame {
    /// Which sub-frame is present
    #[prost(enumeration = "v1_frame::FrameType", optional, tag = "1")]
    pub r#type: Option<i32>,
    /// Connection request
    #[prost(message, optional, tag = "2")]
    pub connection_request: Option<ConnectionRequestFrame>,
    /// Connection response
    #[prost(message, optional, tag = "3")]
    pub connection_response: Option<ConnectionResponseFrame>,
    /// Payload chunk or control message
    #[prost(message, optional, tag = "4")]
    pub payload_transfer: Option<PayloadTransferFrame>,
    /// Keep-alive
    #[prost(message, optional, tag = "6")]
    pub keep_alive: Option<KeepAliveFrame>,
    /// Disconnection notice
    #[prost(message, optional, tag = "7")]
    pub disconnection: Option<DisconnectionFrame>,
}

/// Nested types for [`V1Frame`]
pub mod v1_frame {
    /// Offline frame types
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum FrameType {
        /// Unset
        UnknownFrameType = 0,
        /// Connection request
        ConnectionRequest = 1,
        /// Connection response
        ConnectionResponse = 2,
        /// Payload transfer
        PayloadTransfer = 3,
        /// Bandwidth upgrade (unsupported, ignored)
        BandwidthUpgradeNegotiation = 4,
        /// Keep-alive
        KeepAlive = 5,
        /// Disconnection
        Disconnection = 6,
        /// Paired key encryption (unused at this layer)
        PairedKeyEncryption = 7,
    }
}

/// First frame sent by the initiator
#[derive(Clone, PartialEq, Message)]
pub struct ConnectionRequestFrame {
    /// Initiator's 4-character endpoint ID
    #[prost(string, optional, tag = "1")]
    pub endpoint_id: Option<String>,
    /// Initiator's display name
    #[prost(string, optional, tag = "2")]
    pub endpoint_name: Option<String>,
    /// Unused
    #[prost(bytes = "vec", optional, tag = "3")]
    pub handshake_data: Option<Vec<u8>>,
    /// Unused
    #[prost(int32, optional, tag = "4")]
    pub nonce: Option<i32>,
    /// Mediums the initiator supports
    #[prost(enumeration = "connection_request_frame::Medium", repeated, packed = "false", tag = "5")]
    pub mediums: Vec<i32>,
    /// Endpoint info record
    #[prost(bytes = "vec", optional, tag = "6")]
    pub endpoint_info: Option<Vec<u8>>,
}

/// Nested types for [`ConnectionRequestFrame`]
pub mod connection_request_frame {
    /// Transport mediums
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Medium {
        /// Unset
        UnknownMedium = 0,
        /// mDNS
        Mdns = 1,
        /// Classic Bluetooth
        Bluetooth = 2,
        /// Wi-Fi hotspot
        WifiHotspot = 3,
        /// Bluetooth LE
        Ble = 4,
        /// Local network TCP
        WifiLan = 5,
        /// Wi-Fi Aware
        WifiAware = 6,
        /// NFC
        Nfc = 7,
        /// Wi-Fi Direct
        WifiDirect = 8,
        /// WebRTC
        WebRtc = 9,
        /// BLE L2CAP
        BleL2cap = 10,
        /// USB
        Usb = 11,
    }
}

/// Plaintext accept/reject sent by both sides after the handshake
#[derive(Clone, PartialEq, Message)]
pub struct ConnectionResponseFrame {
    /// Legacy status, 0 for success
    #[prost(int32, optional, tag = "1")]
    pub status: Option<i32>,
    /// Unused
    #[prost(bytes = "vec", optional, tag = "2")]
    pub handshake_data: Option<Vec<u8>>,
    /// Accept or reject
    #[prost(enumeration = "connection_response_frame::ResponseStatus", optional, tag = "3")]
    pub response: Option<i32>,
    /// Sender's OS
    #[prost(message, optional, tag = "4")]
    pub os_info: Option<OsInfo>,
}

/// Nested types for [`ConnectionResponseFrame`]
pub mod connection_response_frame {
    /// Response status
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum ResponseStatus {
        /// Unset
        UnknownResponseStatus = 0,
        /// Connection accepted
        Accept = 1,
        /// Connection rejected
        Reject = 2,
    }
}

/// Operating system of the sender
#[derive(Clone, PartialEq, Message)]
pub struct OsInfo {
    /// OS family
    #[prost(enumeration = "os_info::OsType", optional, tag = "1")]
    pub r#type: Option<i32>,
}

/// Nested types for [`OsInfo`]
pub mod os_info {
    /// OS family
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum OsType {
        /// Unset
        UnknownOsType = 0,
        /// Android
        Android = 1,
        /// ChromeOS
        ChromeOs = 2,
        /// Windows
        Windows = 3,
        /// macOS / iOS
        Apple = 4,
        /// Linux
        Linux = 100,
    }
}

/// A chunk of a payload, or a control message about one
#[derive(Clone, PartialEq, Message)]
pub struct PayloadTransferFrame {
    /// Data or control
    #[prost(enumeration = "payload_transfer_frame::PacketType", optional, tag = "1")]
    pub packet_type: Option<i32>,
    /// Payload being transferred
    #[prost(message, optional, tag = "2")]
    pub payload_header: Option<PayloadHeader>,
    /// Chunk, for data packets
    #[prost(message, optional, tag = "3")]
    pub payload_chunk: Option<PayloadChunk>,
    /// Control message, for control packets
    #[prost(message, optional, tag = "4")]
    pub control_message: Option<payload_transfer_frame::ControlMessage>,
}

/// Nested types for [`PayloadTransferFrame`]
pub mod payload_transfer_frame {
    /// Packet kind
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum PacketType {
        /// Unset
        UnknownPacketType = 0,
        /// Payload data
        Data = 1,
        /// Control message
        Control = 2,
    }

    /// Identifies a payload across its chunks
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PayloadHeader {
        /// Payload ID
        #[prost(int64, optional, tag = "1")]
        pub id: Option<i64>,
        /// Payload kind
        #[prost(enumeration = "payload_header::PayloadType", optional, tag = "2")]
        pub r#type: Option<i32>,
        /// Total payload size
        #[prost(int64, optional, tag = "3")]
        pub total_size: Option<i64>,
        /// Always false here
        #[prost(bool, optional, tag = "4")]
        pub is_sensitive: Option<bool>,
        /// Unused
        #[prost(string, optional, tag = "5")]
        pub file_name: Option<String>,
        /// Unused
        #[prost(string, optional, tag = "6")]
        pub parent_folder: Option<String>,
    }

    /// Nested types for [`PayloadHeader`]
    pub mod payload_header {
        /// Payload kind
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum PayloadType {
            /// Unset
            UnknownPayloadType = 0,
            /// In-memory bytes (transfer-setup frames, text)
            Bytes = 1,
            /// File contents
            File = 2,
            /// Stream (unsupported)
            Stream = 3,
        }
    }

    /// One contiguous slice of a payload
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PayloadChunk {
        /// Bit 0 marks the last chunk
        #[prost(int32, optional, tag = "1")]
        pub flags: Option<i32>,
        /// Offset of `body` within the payload
        #[prost(int64, optional, tag = "2")]
        pub offset: Option<i64>,
        /// Chunk bytes
        #[prost(bytes = "vec", optional, tag = "3")]
        pub body: Option<Vec<u8>>,
    }

    /// Nested constants for [`PayloadChunk`]
    pub mod payload_chunk {
        /// Flag bit marking the final chunk
        pub const LAST_CHUNK: i32 = 0x1;
    }

    /// Payload-level control message
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ControlMessage {
        /// Event kind
        #[prost(enumeration = "control_message::EventType", optional, tag = "1")]
        pub event: Option<i32>,
        /// Offset the event refers to
        #[prost(int64, optional, tag = "2")]
        pub offset: Option<i64>,
    }

    /// Nested types for [`ControlMessage`]
    pub mod control_message {
        /// Control events
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum EventType {
            /// Unset
            UnknownEventType = 0,
            /// Payload failed
            PayloadError = 1,
            /// Payload canceled
            PayloadCanceled = 2,
            /// Payload received
            PayloadReceivedAck = 3,
        }
    }
}

/// Keep-alive probe or answer
#[derive(Clone, PartialEq, Message)]
pub struct KeepAliveFrame {
    /// Set on answers
    #[prost(bool, optional, tag = "1")]
    pub ack: Option<bool>,
}

/// Connection is about to close
#[derive(Clone, PartialEq, Message)]
pub struct DisconnectionFrame {
    /// Unused
    #[prost(bool, optional, tag = "1")]
    pub request_safe_to_disconnect: Option<bool>,
    /// Unused
    #[prost(bool, optional, tag = "2")]
    pub ack_safe_to_disconnect: Option<bool>,
}

// ============ Builders ============

fn wrap(frame_type: FrameType, v1: V1Frame) -> OfflineFrame {
    OfflineFrame {
        version: Some(offline_frame::Version::V1 as i32),
        v1: Some(V1Frame {
            r#type: Some(frame_type as i32),
            ..v1
        }),
    }
}

/// Initiator's connection request advertising WIFI_LAN only
#[must_use]
pub fn connection_request(
    endpoint_id: &str,
    endpoint_name: &str,
    endpoint_info: Vec<u8>,
) -> OfflineFrame {
    wrap(
        FrameType::ConnectionRequest,
        V1Frame {
            connection_request: Some(ConnectionRequestFrame {
                endpoint_id: Some(endpoint_id.to_string()),
                endpoint_name: Some(endpoint_name.to_string()),
                endpoint_info: Some(endpoint_info),
                mediums: vec![connection_request_frame::Medium::WifiLan as i32],
                ..Default::default()
            }),
            ..Default::default()
        },
    )
}

/// Plaintext ACCEPT with status 0 and OS type Linux
#[must_use]
pub fn connection_response_accept() -> OfflineFrame {
    wrap(
        FrameType::ConnectionResponse,
        V1Frame {
            connection_response: Some(ConnectionResponseFrame {
                status: Some(0),
                response: Some(connection_response_frame::ResponseStatus::Accept as i32),
                os_info: Some(OsInfo {
                    r#type: Some(os_info::OsType::Linux as i32),
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
    )
}

/// Keep-alive frame
#[must_use]
pub fn keep_alive(ack: bool) -> OfflineFrame {
    wrap(
        FrameType::KeepAlive,
        V1Frame {
            keep_alive: Some(KeepAliveFrame { ack: Some(ack) }),
            ..Default::default()
        },
    )
}

/// Disconnection notice
#[must_use]
pub fn disconnection() -> OfflineFrame {
    wrap(
        FrameType::Disconnection,
        V1Frame {
            disconnection: Some(DisconnectionFrame::default()),
            ..Default::default()
        },
    )
}

/// One data chunk of a payload
#[must_use]
pub fn payload_chunk(
    id: i64,
    payload_type: PayloadType,
    total_size: i64,
    offset: i64,
    body: Option<Vec<u8>>,
    last: bool,
) -> OfflineFrame {
    wrap(
        FrameType::PayloadTransfer,
        V1Frame {
            payload_transfer: Some(PayloadTransferFrame {
                packet_type: Some(PacketType::Data as i32),
                payload_header: Some(PayloadHeader {
                    id: Some(id),
                    r#type: Some(payload_type as i32),
                    total_size: Some(total_size),
                    is_sensitive: Some(false),
                    ..Default::default()
                }),
                payload_chunk: Some(PayloadChunk {
                    flags: Some(if last { LAST_CHUNK } else { 0 }),
                    offset: Some(offset),
                    body,
                }),
                control_message: None,
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
/// Returns [`Error::RequiredFieldMissing`] if the V1 body or its type is absent, and
/// [`Error::Protocol`] for other versions.
pub fn v1(frame: &OfflineFrame) -> Result<(FrameType, &V1Frame)> {
    if frame.version.is_some() && frame.version() != offline_frame::Version::V1 {
        return Err(Error::protocol("unsupported offline frame version"));
    }
    let v1 = frame
        .v1
        .as_ref()
        .ok_or(Error::RequiredFieldMissing("offlineFrame.v1"))?;
    if v1.r#type.is_none() {
        return Err(Error::RequiredFieldMissing("offlineFrame.v1.type"));
    }
    Ok((v1.r#type(), v1))
}

/// Decode an offline frame.
///
/// # Errors
///
/// Returns [`Error::Protocol`] on malformed input.
pub fn decode(bytes: &[u8]) -> Result<OfflineFrame> {
    Ok(OfflineFrame::decode(bytes)?)
}
