//! Sending side of a connection.
//!
//! The connection opens with CONNECTION_REQUEST and UKEY2 ClientInit, mirrors the
//! receiver's handshake steps, introduces the share target and, once accepted, streams
//! it:
//!
//! ```text
//! for each file:
//!     PAYLOAD_TRANSFER{id, FILE, total, offset = 0}          chunk 1
//!     PAYLOAD_TRANSFER{id, FILE, total, offset = chunk}      chunk 2
//!     ...
//!     PAYLOAD_TRANSFER{id, FILE, total, offset = total, LAST_CHUNK}
//! DISCONNECTION
//! ```
//!
//! Only one chunk write is in flight at a time. Between chunks the connection checks for
//! a local cancel and drains any frames the receiver already sent, so a CANCEL from the
//! receiver stops the loop early.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use quickdrop_crypto::proto::Ukey2Message;
use quickdrop_crypto::random::random_i64;
use quickdrop_crypto::{SessionKeys, Ukey2Initiator};
use quickdrop_files::{FileSource, classify, sanitize_file_name};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{Flow, Incoming, Session, Transport};
use crate::config::EngineConfig;
use crate::delegate::OutboundDelegate;
use crate::error::{CancellationReason, Error, Result};
use crate::proto::offline::{self, FrameType, PayloadType, connection_response_frame};
use crate::proto::sharing::{self, FileMetadata, PairedKeyStatus, ResponseStatus, TextMetadata};
use crate::transfer::{ShareTarget, TextKind, file_kind_to_wire};

/// Outbound connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundState {
    /// Nothing sent yet
    Initial,
    /// Waiting for UKEY2 ServerInit
    SentUkeyClientInit,
    /// Waiting for the receiver's plaintext CONNECTION_RESPONSE
    SentUkeyClientFinish,
    /// Waiting for the receiver's PAIRED_KEY_ENCRYPTION
    SentPairedKeyEncryption,
    /// Waiting for the receiver's PAIRED_KEY_RESULT
    SentPairedKeyResult,
    /// Waiting for the receiver's decision
    SentIntroduction,
    /// Streaming payloads
    SendingFiles,
    /// Connection closed
    Disconnected,
}

/// Commands from the manager to an outbound connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutboundCommand {
    Cancel,
}

/// Handle to a running outbound transfer
#[derive(Debug, Clone)]
pub struct OutboundHandle {
    canceled: Arc<AtomicBool>,
    commands: mpsc::Sender<OutboundCommand>,
}

impl OutboundHandle {
    /// Ask the connection to stop. The delegate receives
    /// `connection_failed(Canceled(UserCanceled))` unless the transfer already ended.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        if self.commands.try_send(OutboundCommand::Cancel).is_err() {
            debug!("Cancel command not queued; flag will be seen before the next chunk");
        }
    }

    /// Whether [`cancel`](Self::cancel) was called
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Whether the connection task has ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.commands.is_closed()
    }
}

struct QueuedFile {
    payload_id: i64,
    source: FileSource,
}

/// Local identity sent in CONNECTION_REQUEST
pub(crate) struct LocalEndpoint {
    pub(crate) id: String,
    pub(crate) info: Vec<u8>,
}

/// Sender state machine driven by one task
pub(crate) struct OutboundConnection<S> {
    session: Session<S>,
    state: OutboundState,
    config: Arc<EngineConfig>,
    delegate: Arc<dyn OutboundDelegate>,
    target: ShareTarget,
    local: LocalEndpoint,
    commands: mpsc::Receiver<OutboundCommand>,
    canceled: Arc<AtomicBool>,
    initiator: Option<Ukey2Initiator>,
    pending_keys: Option<SessionKeys>,
    queue: VecDeque<QueuedFile>,
    text_payload: Option<(i64, String)>,
    total_bytes: u64,
    sent_bytes: u64,
}

impl<S: Transport> OutboundConnection<S> {
    pub(crate) fn new(
        id: impl Into<String>,
        stream: S,
        config: Arc<EngineConfig>,
        local: LocalEndpoint,
        target: ShareTarget,
        delegate: Arc<dyn OutboundDelegate>,
    ) -> (Self, OutboundHandle) {
        let (tx, rx) = mpsc::channel(4);
        let canceled = Arc::new(AtomicBool::new(false));
        let handle = OutboundHandle {
            canceled: canceled.clone(),
            commands: tx,
        };
        let connection = Self {
            session: Session::new(id, stream),
            state: OutboundState::Initial,
            config,
            delegate,
            target,
            local,
            commands: rx,
            canceled,
            initiator: None,
            pending_keys: None,
            queue: VecDeque::new(),
            text_payload: None,
            total_bytes: 0,
            sent_bytes: 0,
        };
        (connection, handle)
    }

    /// Drive the transfer and report the outcome to the delegate exactly once.
    pub(crate) async fn run(mut self) {
        let result = self.drive().await;
        self.state = OutboundState::Disconnected;
        self.session.close().await;

        let id = self.session.id().to_string();
        match result {
            Ok(()) => {
                info!(connection = %id, bytes = self.sent_bytes, "Outgoing transfer finished");
                self.delegate.transfer_finished();
            }
            Err(e) => {
                if e.is_canceled() {
                    info!(connection = %id, reason = %e, "Outgoing transfer ended");
                } else {
                    error!(connection = %id, error = %e, "Outgoing connection failed");
                }
                self.delegate.connection_failed(e);
            }
        }
    }

    async fn drive(&mut self) -> Result<()> {
        self.start().await?;
        loop {
            if self.canceled.load(Ordering::SeqCst) {
                return Err(self.send_cancel().await);
            }
            let flow = tokio::select! {
                frame = self.session.next_frame() => match frame? {
                    Some(raw) => self.handle_frame(&raw).await?,
                    None => return Err(closed_early()),
                },
                Some(OutboundCommand::Cancel) = self.commands.recv() => {
                    return Err(self.send_cancel().await);
                }
            };
            if flow == Flow::Close {
                return Ok(());
            }
        }
    }

    async fn start(&mut self) -> Result<()> {
        let request = offline::connection_request(
            &self.local.id,
            &self.config.device_name,
            self.local.info.clone(),
        );
        self.session.send_offline(&request).await?;

        let initiator = Ukey2Initiator::new().map_err(Error::Handshake)?;
        self.session.send_raw(initiator.client_init().to_vec()).await?;
        self.initiator = Some(initiator);
        self.state = OutboundState::SentUkeyClientInit;
        Ok(())
    }

    async fn handle_frame(&mut self, raw: &[u8]) -> Result<Flow> {
        match self.state {
            OutboundState::SentUkeyClientInit => self.on_server_init(raw).await,
            OutboundState::SentUkeyClientFinish => self.on_plaintext_frame(raw).await,
            OutboundState::Initial | OutboundState::Disconnected => Ok(Flow::Close),
            _ => {
                let incoming = self.session.receive_encrypted(raw).await?;
                self.on_incoming(incoming).await
            }
        }
    }

    // ============ Handshake ============

    async fn on_server_init(&mut self, raw: &[u8]) -> Result<Flow> {
        let initiator = self
            .initiator
            .take()
            .ok_or(Error::protocol("handshake already finished"))?;
        match initiator.handle_server_init(raw) {
            Ok((outcome, client_finish)) => {
                self.session.send_raw(client_finish).await?;
                self.session
                    .send_offline(&offline::connection_response_accept())
                    .await?;
                info!(connection = %self.session.id(), pin = %outcome.pin, "Handshake complete");
                self.delegate.connection_established(&outcome.pin);
                self.pending_keys = Some(outcome.keys);
                self.state = OutboundState::SentUkeyClientFinish;
                Ok(Flow::Continue)
            }
            Err(e) => {
                warn!(connection = %self.session.id(), error = %e, "Handshake failed, sending alert");
                if let Err(send_err) = self.session.send_raw(Ukey2Message::alert(e.alert())).await
                {
                    debug!(connection = %self.session.id(), error = %send_err, "Could not send alert");
                }
                Err(Error::Handshake(e))
            }
        }
    }

    async fn on_plaintext_frame(&mut self, raw: &[u8]) -> Result<Flow> {
        let frame = offline::decode(raw)?;
        let (frame_type, v1) = offline::v1(&frame)?;
        match frame_type {
            FrameType::ConnectionResponse => {
                let response = v1
                    .connection_response
                    .as_ref()
                    .ok_or(Error::RequiredFieldMissing("offlineFrame.v1.connectionResponse"))?;
                if response.response() != connection_response_frame::ResponseStatus::Accept {
                    return Err(Error::protocol("receiver did not accept the connection"));
                }
                let keys = self
                    .pending_keys
                    .take()
                    .ok_or(Error::protocol("session keys missing"))?;
                self.session.enable_encryption(keys);
                self.session
                    .send_sharing(&sharing::paired_key_encryption()?)
                    .await?;
                self.state = OutboundState::SentPairedKeyEncryption;
                Ok(Flow::Continue)
            }
            FrameType::KeepAlive => {
                self.session.answer_keep_alive(v1).await?;
                Ok(Flow::Continue)
            }
            FrameType::Disconnection => Err(closed_early()),
            other => Err(Error::Protocol(
                format!("unexpected {other:?} frame before encryption").into(),
            )),
        }
    }

    // ============ Encrypted Phase ============

    async fn on_incoming(&mut self, incoming: Incoming) -> Result<Flow> {
        match incoming {
            Incoming::Bytes { data, .. } => self.on_sharing_frame(&sharing::decode(&data)?).await,
            Incoming::FileChunk { .. } => Err(Error::protocol("receiver sent a file payload")),
            Incoming::Disconnection => Err(closed_early()),
            Incoming::Handled => Ok(Flow::Continue),
            Incoming::Other(frame_type) => {
                debug!(connection = %self.session.id(), ?frame_type, "Ignoring offline frame");
                Ok(Flow::Continue)
            }
        }
    }

    async fn on_sharing_frame(&mut self, frame: &sharing::Frame) -> Result<Flow> {
        let (frame_type, v1) = sharing::v1(frame)?;
        debug!(connection = %self.session.id(), ?frame_type, state = ?self.state, "Sharing frame");

        match (self.state, frame_type) {
            (_, sharing::FrameType::Cancel) => Err(self.peer_canceled().await),
            (_, sharing::FrameType::CertificateInfo) => Ok(Flow::Continue),
            (OutboundState::SentPairedKeyEncryption, sharing::FrameType::PairedKeyEncryption) => {
                self.session
                    .send_sharing(&sharing::paired_key_result(PairedKeyStatus::Unable))
                    .await?;
                self.state = OutboundState::SentPairedKeyResult;
                Ok(Flow::Continue)
            }
            (OutboundState::SentPairedKeyResult, sharing::FrameType::PairedKeyResult) => {
                self.send_introduction().await?;
                self.state = OutboundState::SentIntroduction;
                Ok(Flow::Continue)
            }
            (OutboundState::SentIntroduction, sharing::FrameType::Response) => {
                let status = v1
                    .connection_response
                    .as_ref()
                    .ok_or(Error::RequiredFieldMissing("sharingFrame.v1.connectionResponse"))?
                    .status();
                self.on_response(status).await
            }
            (state, frame_type) => Err(Error::Protocol(
                format!("unexpected {frame_type:?} frame in state {state:?}").into(),
            )),
        }
    }

    async fn send_introduction(&mut self) -> Result<()> {
        let introduction = match self.target.clone() {
            ShareTarget::Url(url) => {
                let text = url.to_string();
                let payload_id = random_i64()?;
                let metadata = TextMetadata {
                    text_title: Some(url.host_str().unwrap_or("URL").to_string()),
                    r#type: Some(TextKind::Url.to_wire() as i32),
                    payload_id: Some(payload_id),
                    size: Some(text.len() as i64),
                    id: Some(random_i64()?),
                };
                self.total_bytes = text.len() as u64;
                self.text_payload = Some((payload_id, text));
                sharing::introduction(Vec::new(), vec![metadata])
            }
            ShareTarget::Files(paths) => {
                if paths.is_empty() {
                    return Err(Error::protocol("no files to send"));
                }
                let mut metadata = Vec::with_capacity(paths.len());
                for path in &paths {
                    let source = FileSource::with_chunk_size(path, self.config.chunk_size).await?;
                    let (mime_type, kind) = classify(path);
                    let payload_id = random_i64()?;
                    metadata.push(FileMetadata {
                        name: Some(sanitize_file_name(source.name())),
                        r#type: Some(file_kind_to_wire(kind) as i32),
                        payload_id: Some(payload_id),
                        size: Some(source.size() as i64),
                        mime_type: Some(mime_type),
                        id: Some(random_i64()?),
                    });
                    self.total_bytes += source.size();
                    self.queue.push_back(QueuedFile { payload_id, source });
                }
                sharing::introduction(metadata, Vec::new())
            }
        };
        info!(
            connection = %self.session.id(),
            files = self.queue.len(),
            bytes = self.total_bytes,
            "Sending introduction"
        );
        self.session.send_sharing(&introduction).await
    }

    async fn on_response(&mut self, status: ResponseStatus) -> Result<Flow> {
        let reason = match status {
            ResponseStatus::Accept => {
                info!(connection = %self.session.id(), "Receiver accepted");
                self.delegate.transfer_accepted();
                self.state = OutboundState::SendingFiles;
                return self.send_payloads().await;
            }
            ResponseStatus::Reject | ResponseStatus::Unknown => CancellationReason::UserRejected,
            ResponseStatus::NotEnoughSpace => CancellationReason::NotEnoughSpace,
            ResponseStatus::UnsupportedAttachmentType => CancellationReason::UnsupportedType,
            ResponseStatus::TimedOut => CancellationReason::TimedOut,
        };
        info!(connection = %self.session.id(), %reason, "Receiver declined");
        self.session.disconnect_quietly().await;
        Err(Error::Canceled(reason))
    }

    // ============ Payloads ============

    async fn send_payloads(&mut self) -> Result<Flow> {
        if let Some((payload_id, text)) = self.text_payload.take() {
            self.check_interrupts().await?;
            let len = text.len() as u64;
            self.session
                .send_bytes_payload(payload_id, text.into_bytes())
                .await?;
            self.sent_bytes += len;
        }

        while let Some(mut file) = self.queue.pop_front() {
            let size = file.source.size();
            debug!(
                connection = %self.session.id(),
                payload_id = file.payload_id,
                name = %file.source.name(),
                size,
                "Sending file"
            );
            loop {
                self.check_interrupts().await?;
                let offset = file.source.offset();
                let Some(chunk) = file.source.next_chunk().await? else {
                    break;
                };
                let len = chunk.len() as u64;
                if offset + len > size {
                    return Err(Error::Protocol(
                        format!("{} grew while it was being sent", file.source.name()).into(),
                    ));
                }
                self.session
                    .send_offline(&offline::payload_chunk(
                        file.payload_id,
                        PayloadType::File,
                        size as i64,
                        offset as i64,
                        Some(chunk),
                        false,
                    ))
                    .await?;
                self.sent_bytes += len;
                self.report_progress();
            }
            if file.source.offset() != size {
                return Err(Error::Protocol(
                    format!("{} shrank while it was being sent", file.source.name()).into(),
                ));
            }
            self.session
                .send_offline(&offline::payload_chunk(
                    file.payload_id,
                    PayloadType::File,
                    size as i64,
                    size as i64,
                    Some(Vec::new()),
                    true,
                ))
                .await?;
        }

        self.delegate.transfer_progress(1.0);
        self.session.send_disconnection().await?;
        Ok(Flow::Close)
    }

    /// Progress strictly below 1.0; 1.0 is reported once every last-chunk marker is out.
    fn report_progress(&self) {
        if self.total_bytes == 0 {
            return;
        }
        let fraction = self.sent_bytes as f64 / self.total_bytes as f64;
        if fraction < 1.0 {
            self.delegate.transfer_progress(fraction);
        }
    }

    /// Stop on a local cancel, and process whatever the receiver has already sent.
    async fn check_interrupts(&mut self) -> Result<()> {
        if self.canceled.load(Ordering::SeqCst)
            || matches!(self.commands.try_recv(), Ok(OutboundCommand::Cancel))
        {
            return Err(self.send_cancel().await);
        }
        while let Some(frame) = self.session.next_frame().now_or_never() {
            let Some(raw) = frame? else {
                return Err(closed_early());
            };
            match self.session.receive_encrypted(&raw).await? {
                Incoming::Bytes { data, .. } => {
                    let frame = sharing::decode(&data)?;
                    let (frame_type, _) = sharing::v1(&frame)?;
                    if frame_type == sharing::FrameType::Cancel {
                        return Err(self.peer_canceled().await);
                    }
                    debug!(connection = %self.session.id(), ?frame_type, "Ignoring sharing frame while sending");
                }
                Incoming::Disconnection => {
                    return Err(Error::Canceled(CancellationReason::UserCanceled));
                }
                Incoming::FileChunk { .. } => {
                    return Err(Error::protocol("receiver sent a file payload"));
                }
                Incoming::Handled | Incoming::Other(_) => {}
            }
        }
        Ok(())
    }

    // ============ Cancellation ============

    async fn send_cancel(&mut self) -> Error {
        info!(connection = %self.session.id(), state = ?self.state, "Canceling transfer");
        if self.session.is_encrypted() {
            if let Err(e) = self.session.send_sharing(&sharing::cancel()).await {
                debug!(connection = %self.session.id(), error = %e, "Could not send cancel");
            }
        }
        self.session.disconnect_quietly().await;
        Error::Canceled(CancellationReason::UserCanceled)
    }

    async fn peer_canceled(&mut self) -> Error {
        info!(connection = %self.session.id(), "Receiver canceled the transfer");
        self.session.disconnect_quietly().await;
        Error::Canceled(CancellationReason::UserCanceled)
    }
}

fn closed_early() -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "receiver closed the connection",
    ))
}
