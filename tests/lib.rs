//! Shared helpers for QuickDrop integration tests
//!
//! A [`Peer`] speaks the wire protocol directly over one end of an in-memory duplex
//! stream, so a scenario can play the remote device frame by frame while the engine
//! under test runs on the other end.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use prost::Message;
use quickdrop_core::proto::offline::{
    self, FrameType, LAST_CHUNK, OfflineFrame, PayloadType, connection_response_frame,
};
use quickdrop_core::proto::sharing::{self, PairedKeyStatus};
use quickdrop_core::{
    EngineConfig, Error, FileProgress, InboundDelegate, NearbyFrameCodec, OutboundDelegate,
    TextKind, TransferManager, TransferMetadata,
};
use quickdrop_crypto::{SecureChannel, SessionKeys, Ukey2Initiator, Ukey2Responder};
use quickdrop_discovery::{DeviceType, EndpointInfo, RemoteDeviceInfo};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

/// Upper bound for any single wait in a scenario
pub const STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Endpoint ID the scripted peer announces
pub const PEER_ENDPOINT_ID: &str = "PEER";

// ============================================================================
// Scripted peer
// ============================================================================

/// What the peer observed on the wire
#[derive(Debug)]
pub enum PeerEvent {
    /// Completed BYTES payload
    Bytes { id: i64, data: Vec<u8> },
    /// One FILE payload chunk
    FileChunk {
        id: i64,
        total: i64,
        offset: i64,
        body: Vec<u8>,
        last: bool,
    },
    /// Keep-alive with its ack flag
    KeepAlive(bool),
    /// DISCONNECTION frame
    Disconnection,
    /// Stream closed
    Closed,
}

/// Remote device driven by the test
pub struct Peer {
    framed: Framed<DuplexStream, NearbyFrameCodec>,
    channel: Option<SecureChannel>,
    buffers: HashMap<i64, Vec<u8>>,
    next_payload_id: i64,
}

impl Peer {
    /// Wrap one end of a duplex stream
    pub fn new(stream: DuplexStream) -> Self {
        Self {
            framed: Framed::new(stream, NearbyFrameCodec::new()),
            channel: None,
            buffers: HashMap::new(),
            next_payload_id: 1000,
        }
    }

    /// Send one length-prefixed frame as is
    pub async fn send_raw(&mut self, data: Vec<u8>) {
        self.framed.send(Bytes::from(data)).await.unwrap();
    }

    /// Next raw frame, `None` once the engine closed the stream
    pub async fn recv_raw(&mut self) -> Option<BytesMut> {
        tokio::time::timeout(STEP_TIMEOUT, self.framed.next())
            .await
            .expect("timed out waiting for a frame")
            .map(|frame| frame.unwrap())
    }

    /// Seal and send every frame from now on
    pub fn enable_encryption(&mut self, keys: SessionKeys) {
        self.channel = Some(SecureChannel::new(keys));
    }

    /// Send an offline frame, sealed if encryption is on
    pub async fn send_offline(&mut self, frame: &OfflineFrame) {
        let plaintext = frame.encode_to_vec();
        let data = match self.channel.as_mut() {
            Some(channel) => channel.seal(&plaintext).unwrap(),
            None => plaintext,
        };
        self.send_raw(data).await;
    }

    /// Receive and decode one offline frame, opening it if encryption is on
    pub async fn recv_offline(&mut self) -> OfflineFrame {
        let raw = self.recv_raw().await.expect("stream closed");
        let plaintext = match self.channel.as_mut() {
            Some(channel) => channel.open(&raw).unwrap(),
            None => raw.to_vec(),
        };
        offline::decode(&plaintext).unwrap()
    }

    /// Send `data` as one BYTES payload: a data chunk then an empty last chunk
    pub async fn send_bytes_payload(&mut self, id: i64, data: Vec<u8>) {
        let total = data.len() as i64;
        self.send_offline(&offline::payload_chunk(id, PayloadType::Bytes, total, 0, Some(data), false))
            .await;
        self.send_offline(&offline::payload_chunk(
            id,
            PayloadType::Bytes,
            total,
            total,
            Some(Vec::new()),
            true,
        ))
        .await;
    }

    /// Send a sharing frame as a BYTES payload
    pub async fn send_sharing(&mut self, frame: &sharing::Frame) {
        self.next_payload_id += 1;
        let id = self.next_payload_id;
        self.send_bytes_payload(id, frame.encode_to_vec()).await;
    }

    /// Send one FILE payload chunk
    pub async fn send_file_chunk(&mut self, id: i64, total: i64, offset: i64, body: Vec<u8>, last: bool) {
        self.send_offline(&offline::payload_chunk(id, PayloadType::File, total, offset, Some(body), last))
            .await;
    }

    /// Stream `data` as `chunk`-sized FILE chunks followed by the last-chunk marker
    pub async fn send_file(&mut self, id: i64, data: &[u8], chunk: usize) {
        let total = data.len() as i64;
        let mut offset = 0;
        for piece in data.chunks(chunk) {
            self.send_file_chunk(id, total, offset, piece.to_vec(), false).await;
            offset += piece.len() as i64;
        }
        self.send_file_chunk(id, total, total, Vec::new(), true).await;
    }

    /// Next meaningful event; BYTES payloads are reassembled
    pub async fn recv_event(&mut self) -> PeerEvent {
        loop {
            let Some(raw) = self.recv_raw().await else {
                return PeerEvent::Closed;
            };
            let plaintext = match self.channel.as_mut() {
                Some(channel) => channel.open(&raw).unwrap(),
                None => raw.to_vec(),
            };
            let frame = offline::decode(&plaintext).unwrap();
            let (frame_type, v1) = offline::v1(&frame).unwrap();
            match frame_type {
                FrameType::PayloadTransfer => {
                    let transfer = v1.payload_transfer.clone().unwrap();
                    let header = transfer.payload_header.unwrap();
                    let chunk = transfer.payload_chunk.unwrap();
                    let last = chunk.flags() & LAST_CHUNK != 0;
                    let offset = chunk.offset();
                    let body = chunk.body.unwrap_or_default();
                    match header.r#type() {
                        PayloadType::Bytes => {
                            let buffer = self.buffers.entry(header.id()).or_default();
                            assert_eq!(offset, buffer.len() as i64, "bytes payload offset");
                            buffer.extend_from_slice(&body);
                            if last {
                                let data = self.buffers.remove(&header.id()).unwrap();
                                return PeerEvent::Bytes {
                                    id: header.id(),
                                    data,
                                };
                            }
                        }
                        PayloadType::File => {
                            return PeerEvent::FileChunk {
                                id: header.id(),
                                total: header.total_size(),
                                offset,
                                body,
                                last,
                            };
                        }
                        other => panic!("unexpected payload type {other:?}"),
                    }
                }
                FrameType::KeepAlive => {
                    return PeerEvent::KeepAlive(v1.keep_alive.as_ref().is_some_and(|k| k.ack()));
                }
                FrameType::Disconnection => return PeerEvent::Disconnection,
                other => panic!("unexpected offline frame {other:?}"),
            }
        }
    }

    /// Next sharing frame; keep-alives are skipped
    pub async fn recv_sharing(&mut self) -> sharing::Frame {
        loop {
            match self.recv_event().await {
                PeerEvent::Bytes { data, .. } => return sharing::decode(&data).unwrap(),
                PeerEvent::KeepAlive(_) => {}
                other => panic!("expected a sharing frame, got {other:?}"),
            }
        }
    }

    /// Play the sender through the handshake and the paired key exchange.
    /// Returns the PIN.
    pub async fn handshake_as_sender(&mut self, name: &str) -> String {
        let info = EndpointInfo::new(name, DeviceType::Phone).encode().unwrap();
        self.send_offline(&offline::connection_request(PEER_ENDPOINT_ID, name, info))
            .await;

        let initiator = Ukey2Initiator::new().unwrap();
        self.send_raw(initiator.client_init().to_vec()).await;
        let server_init = self.recv_raw().await.expect("no ServerInit");
        let (outcome, client_finish) = initiator.handle_server_init(&server_init).unwrap();
        self.send_raw(client_finish).await;
        self.send_offline(&offline::connection_response_accept()).await;

        let response = self.recv_offline().await;
        assert_connection_accepted(&response);
        self.enable_encryption(outcome.keys);

        let frame = self.recv_sharing().await;
        assert_eq!(sharing_type(&frame), sharing::FrameType::PairedKeyEncryption);
        self.send_sharing(&sharing::paired_key_encryption().unwrap()).await;
        let frame = self.recv_sharing().await;
        assert_eq!(sharing_type(&frame), sharing::FrameType::PairedKeyResult);
        self.send_sharing(&sharing::paired_key_result(PairedKeyStatus::Unable))
            .await;
        outcome.pin
    }

    /// Play the receiver through the handshake and the paired key exchange.
    /// Returns the PIN and the sender's announced name.
    pub async fn handshake_as_receiver(&mut self) -> (String, String) {
        let request = self.recv_offline().await;
        let (frame_type, v1) = offline::v1(&request).unwrap();
        assert_eq!(frame_type, FrameType::ConnectionRequest);
        let info = EndpointInfo::decode(v1.connection_request.as_ref().unwrap().endpoint_info()).unwrap();

        let mut responder = Ukey2Responder::new();
        let client_init = self.recv_raw().await.expect("no ClientInit");
        let server_init = responder.handle_client_init(&client_init).unwrap();
        self.send_raw(server_init).await;
        let client_finish = self.recv_raw().await.expect("no ClientFinish");
        let outcome = responder.handle_client_finish(&client_finish).unwrap();

        let response = self.recv_offline().await;
        assert_connection_accepted(&response);
        self.send_offline(&offline::connection_response_accept()).await;
        self.enable_encryption(outcome.keys);

        let frame = self.recv_sharing().await;
        assert_eq!(sharing_type(&frame), sharing::FrameType::PairedKeyEncryption);
        self.send_sharing(&sharing::paired_key_encryption().unwrap()).await;
        let frame = self.recv_sharing().await;
        assert_eq!(sharing_type(&frame), sharing::FrameType::PairedKeyResult);
        self.send_sharing(&sharing::paired_key_result(PairedKeyStatus::Unable))
            .await;
        (outcome.pin, info.name)
    }
}

fn assert_connection_accepted(frame: &OfflineFrame) {
    let (frame_type, v1) = offline::v1(frame).unwrap();
    assert_eq!(frame_type, FrameType::ConnectionResponse);
    assert_eq!(
        v1.connection_response.as_ref().unwrap().response(),
        connection_response_frame::ResponseStatus::Accept
    );
}

/// Type of a sharing frame
pub fn sharing_type(frame: &sharing::Frame) -> sharing::FrameType {
    sharing::v1(frame).unwrap().0
}

/// Status carried by a sharing RESPONSE frame
pub fn response_status(frame: &sharing::Frame) -> sharing::ResponseStatus {
    let (frame_type, v1) = sharing::v1(frame).unwrap();
    assert_eq!(frame_type, sharing::FrameType::Response);
    v1.connection_response.as_ref().unwrap().status()
}

/// Deterministic file contents
pub fn pattern(seed: u8, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

// ============================================================================
// Recording delegates
// ============================================================================

/// Callback observed on an [`InboundDelegate`]
#[derive(Debug)]
pub enum InboundEvent {
    Consent(TransferMetadata, RemoteDeviceInfo),
    Text(TextKind, String),
    Progress(FileProgress),
    Finished(String, Option<Error>),
}

/// Forwards inbound callbacks to a channel
pub struct InboundRecorder {
    events: mpsc::UnboundedSender<InboundEvent>,
}

impl InboundRecorder {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<InboundEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { events }), rx)
    }
}

impl InboundDelegate for InboundRecorder {
    fn obtain_user_consent(&self, transfer: &TransferMetadata, device: &RemoteDeviceInfo) {
        let _ = self
            .events
            .send(InboundEvent::Consent(transfer.clone(), device.clone()));
    }

    fn incoming_transfer_finished(&self, id: &str, error: Option<Error>) {
        let _ = self.events.send(InboundEvent::Finished(id.to_string(), error));
    }

    fn received_text(&self, _id: &str, kind: TextKind, text: &str) {
        let _ = self.events.send(InboundEvent::Text(kind, text.to_string()));
    }

    fn transfer_progress(&self, _id: &str, progress: FileProgress) {
        let _ = self.events.send(InboundEvent::Progress(progress));
    }
}

/// Callback observed on an [`OutboundDelegate`]
#[derive(Debug)]
pub enum OutboundEvent {
    Established(String),
    Accepted,
    Progress(f64),
    Finished,
    Failed(Error),
}

/// Forwards outbound callbacks to a channel
pub struct OutboundRecorder {
    events: mpsc::UnboundedSender<OutboundEvent>,
}

impl OutboundRecorder {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { events }), rx)
    }
}

impl OutboundDelegate for OutboundRecorder {
    fn connection_established(&self, pin: &str) {
        let _ = self.events.send(OutboundEvent::Established(pin.to_string()));
    }

    fn transfer_accepted(&self) {
        let _ = self.events.send(OutboundEvent::Accepted);
    }

    fn transfer_progress(&self, fraction: f64) {
        let _ = self.events.send(OutboundEvent::Progress(fraction));
    }

    fn transfer_finished(&self) {
        let _ = self.events.send(OutboundEvent::Finished);
    }

    fn connection_failed(&self, error: Error) {
        let _ = self.events.send(OutboundEvent::Failed(error));
    }
}

/// Next event, failing the test after [`STEP_TIMEOUT`]
pub async fn next_event<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(STEP_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for a delegate event")
        .expect("delegate channel closed")
}

/// Skip progress events until the transfer finishes
pub async fn wait_inbound_finished(
    rx: &mut mpsc::UnboundedReceiver<InboundEvent>,
) -> (String, Option<Error>) {
    loop {
        match next_event(rx).await {
            InboundEvent::Finished(id, error) => return (id, error),
            InboundEvent::Progress(_) => {}
            other => panic!("unexpected inbound event {other:?}"),
        }
    }
}

/// Manager receiving into `dir`, with its inbound events
pub fn receiving_manager(
    dir: &std::path::Path,
) -> (TransferManager, mpsc::UnboundedReceiver<InboundEvent>) {
    let (recorder, rx) = InboundRecorder::new();
    let config = EngineConfig::default()
        .with_device_name("receiver")
        .with_download_dir(dir);
    (TransferManager::new(config, recorder), rx)
}
