//! Connection plumbing shared by the inbound and outbound roles.
//!
//! A [`Session`] owns the framed stream and, once the handshake is done, the
//! [`SecureChannel`]. It turns raw frames into [`Incoming`] events:
//!
//! ```text
//! raw frame ──open──> OfflineFrame ──┬─ PAYLOAD_TRANSFER/BYTES ─(buffer to LAST_CHUNK)─> Incoming::Bytes
//!                                    ├─ PAYLOAD_TRANSFER/FILE  ─────────────────────────> Incoming::FileChunk
//!                                    ├─ KEEP_ALIVE  (answered here)
//!                                    ├─ DISCONNECTION ──────────────────────────────────> Incoming::Disconnection
//!                                    └─ anything else ──────────────────────────────────> Incoming::Other
//! ```
//!
//! The role structs in [`inbound`] and [`outbound`] decide what the events mean for their
//! state machine.

pub mod inbound;
pub mod outbound;

pub use inbound::InboundState;
pub use outbound::{OutboundHandle, OutboundState};

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use prost::Message;
use quickdrop_crypto::random::random_i64;
use quickdrop_crypto::{SecureChannel, SessionKeys};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::debug;

use crate::error::{Error, Result};
use crate::frame::{NearbyFrameCodec, SANE_FRAME_LENGTH};
use crate::proto::offline::{
    self, FrameType, LAST_CHUNK, OfflineFrame, PacketType, PayloadTransferFrame, PayloadType,
    V1Frame,
};
use crate::proto::sharing;

/// Partially received BYTES payloads a peer may have open at once. Sharing frames and
/// text arrive one payload at a time, so anything beyond this is a misbehaving peer.
pub(crate) const MAX_OPEN_BYTES_PAYLOADS: usize = 4;

/// Byte stream a connection can run over (TCP, or an in-memory duplex in tests)
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> Transport for T {}

/// Whether the role's event loop keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Close,
}

/// Event decoded from an encrypted frame
#[derive(Debug)]
pub(crate) enum Incoming {
    /// A BYTES payload completed
    Bytes { id: i64, data: Vec<u8> },
    /// One chunk of a FILE payload
    FileChunk {
        id: i64,
        offset: u64,
        body: Vec<u8>,
        last: bool,
    },
    /// Peer announced it is closing
    Disconnection,
    /// Consumed by the session (keep-alive, control packet)
    Handled,
    /// Offline frame the session does not interpret
    Other(FrameType),
}

/// Framed stream plus encryption and payload reassembly state
pub(crate) struct Session<S> {
    id: String,
    framed: Framed<S, NearbyFrameCodec>,
    channel: Option<SecureChannel>,
    payload_buffers: HashMap<i64, Vec<u8>>,
}

impl<S: Transport> Session<S> {
    pub(crate) fn new(id: impl Into<String>, stream: S) -> Self {
        Self {
            id: id.into(),
            framed: Framed::new(stream, NearbyFrameCodec::new()),
            channel: None,
            payload_buffers: HashMap::new(),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn is_encrypted(&self) -> bool {
        self.channel.is_some()
    }

    /// Every frame after this one is sealed and every received frame must open.
    pub(crate) fn enable_encryption(&mut self, keys: SessionKeys) {
        debug!(connection = %self.id, "Encryption enabled");
        self.channel = Some(SecureChannel::new(keys));
    }

    /// Next raw frame; `None` once the peer closed the stream cleanly.
    pub(crate) async fn next_frame(&mut self) -> Result<Option<BytesMut>> {
        Ok(self.framed.next().await.transpose()?)
    }

    pub(crate) async fn send_raw(&mut self, data: Vec<u8>) -> Result<()> {
        self.framed.send(Bytes::from(data)).await?;
        Ok(())
    }

    /// Send an offline frame, sealed if encryption is enabled.
    pub(crate) async fn send_offline(&mut self, frame: &OfflineFrame) -> Result<()> {
        let plaintext = frame.encode_to_vec();
        let data = match self.channel.as_mut() {
            Some(channel) => channel.seal(&plaintext)?,
            None => plaintext,
        };
        self.send_raw(data).await
    }

    /// Send a sharing frame as a BYTES payload with a fresh payload ID.
    pub(crate) async fn send_sharing(&mut self, frame: &sharing::Frame) -> Result<()> {
        let id = random_i64()?;
        self.send_bytes_payload(id, frame.encode_to_vec()).await
    }

    /// Send `data` as one data chunk followed by an empty last chunk.
    pub(crate) async fn send_bytes_payload(&mut self, id: i64, data: Vec<u8>) -> Result<()> {
        let total = data.len() as i64;
        self.send_offline(&offline::payload_chunk(
            id,
            PayloadType::Bytes,
            total,
            0,
            Some(data),
            false,
        ))
        .await?;
        self.send_offline(&offline::payload_chunk(
            id,
            PayloadType::Bytes,
            total,
            total,
            Some(Vec::new()),
            true,
        ))
        .await
    }

    pub(crate) async fn send_disconnection(&mut self) -> Result<()> {
        self.send_offline(&offline::disconnection()).await
    }

    /// Send DISCONNECTION, logging instead of failing; used on paths that already end
    /// the connection.
    pub(crate) async fn disconnect_quietly(&mut self) {
        if let Err(e) = self.send_disconnection().await {
            debug!(connection = %self.id, error = %e, "Could not send disconnection");
        }
    }

    /// Answer a keep-alive probe. Answers themselves are not answered.
    pub(crate) async fn answer_keep_alive(&mut self, v1: &V1Frame) -> Result<()> {
        let is_ack = v1.keep_alive.as_ref().is_some_and(|k| k.ack());
        if is_ack {
            return Ok(());
        }
        debug!(connection = %self.id, "Answering keep-alive");
        self.send_offline(&offline::keep_alive(true)).await
    }

    /// Flush and shut down the write half.
    pub(crate) async fn close(&mut self) {
        if let Err(e) = SinkExt::close(&mut self.framed).await {
            debug!(connection = %self.id, error = %e, "Error while closing stream");
        }
    }

    /// Open, decode and interpret one frame received after encryption was enabled.
    pub(crate) async fn receive_encrypted(&mut self, raw: &[u8]) -> Result<Incoming> {
        let channel = self
            .channel
            .as_mut()
            .ok_or(Error::protocol("encrypted frame before key exchange"))?;
        let plaintext = channel.open(raw)?;
        let frame = offline::decode(&plaintext)?;
        let frame_type = offline::v1(&frame)?.0;
        let v1 = frame.v1.unwrap_or_default();

        match frame_type {
            FrameType::PayloadTransfer => {
                let transfer = v1
                    .payload_transfer
                    .ok_or(Error::RequiredFieldMissing("offlineFrame.v1.payloadTransfer"))?;
                self.on_payload_transfer(transfer)
            }
            FrameType::KeepAlive => {
                self.answer_keep_alive(&v1).await?;
                Ok(Incoming::Handled)
            }
            FrameType::Disconnection => Ok(Incoming::Disconnection),
            other => Ok(Incoming::Other(other)),
        }
    }

    fn on_payload_transfer(&mut self, transfer: PayloadTransferFrame) -> Result<Incoming> {
        if transfer.packet_type() == PacketType::Control {
            debug!(connection = %self.id, "Ignoring payload control message");
            return Ok(Incoming::Handled);
        }

        let header = transfer
            .payload_header
            .ok_or(Error::RequiredFieldMissing("payloadTransfer.payloadHeader"))?;
        let chunk = transfer
            .payload_chunk
            .ok_or(Error::RequiredFieldMissing("payloadTransfer.payloadChunk"))?;
        let id = header
            .id
            .ok_or(Error::RequiredFieldMissing("payloadHeader.id"))?;
        if header.r#type.is_none() {
            return Err(Error::RequiredFieldMissing("payloadHeader.type"));
        }
        let offset = chunk
            .offset
            .ok_or(Error::RequiredFieldMissing("payloadChunk.offset"))?;
        let flags = chunk
            .flags
            .ok_or(Error::RequiredFieldMissing("payloadChunk.flags"))?;
        let offset =
            u64::try_from(offset).map_err(|_| Error::protocol("negative payload offset"))?;
        let last = flags & LAST_CHUNK != 0;
        let body = chunk.body.unwrap_or_default();

        match header.r#type() {
            PayloadType::Bytes => {
                if header.total_size() > SANE_FRAME_LENGTH as i64 {
                    return Err(Error::protocol("bytes payload exceeds frame limit"));
                }
                if !self.payload_buffers.contains_key(&id)
                    && self.payload_buffers.len() >= MAX_OPEN_BYTES_PAYLOADS
                {
                    return Err(Error::protocol("too many concurrent bytes payloads"));
                }
                let buffer = self.payload_buffers.entry(id).or_default();
                if offset != buffer.len() as u64 {
                    return Err(Error::Protocol(
                        format!(
                            "bytes payload {id}: expected offset {}, got {offset}",
                            buffer.len()
                        )
                        .into(),
                    ));
                }
                if buffer.len() + body.len() > SANE_FRAME_LENGTH {
                    return Err(Error::protocol("bytes payload exceeds frame limit"));
                }
                buffer.extend_from_slice(&body);
                if !last {
                    return Ok(Incoming::Handled);
                }
                let data = self.payload_buffers.remove(&id).unwrap_or_default();
                debug!(connection = %self.id, payload_id = id, len = data.len(), "Bytes payload complete");
                Ok(Incoming::Bytes { id, data })
            }
            PayloadType::File => Ok(Incoming::FileChunk {
                id,
                offset,
                body,
                last,
            }),
            other => Err(Error::Protocol(
                format!("unsupported payload type {other:?}").into(),
            )),
        }
    }
}
