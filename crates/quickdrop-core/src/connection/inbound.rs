//! Receiving side of a connection.
//!
//! # Flow
//!
//! ```text
//! Sender                                   Receiver (this side)
//!   |-- CONNECTION_REQUEST ------------------->|  Initial
//!   |-- UKEY2 ClientInit --------------------->|  ReceivedConnectionRequest
//!   |<------------------- UKEY2 ServerInit ----|
//!   |-- UKEY2 ClientFinish ------------------->|  SentUkeyServerInit
//!   |-- CONNECTION_RESPONSE ------------------>|  ReceivedUkeyClientFinish
//!   |<------------------ CONNECTION_RESPONSE --|
//!   |            [encrypted from here on]      |
//!   |<---------------- PAIRED_KEY_ENCRYPTION --|
//!   |-- PAIRED_KEY_ENCRYPTION ---------------->|  SentConnectionResponse
//!   |<-------------- PAIRED_KEY_RESULT UNABLE -|
//!   |-- PAIRED_KEY_RESULT -------------------->|  SentPairedKeyResult
//!   |-- INTRODUCTION ------------------------->|  ReceivedPairedKeyResult
//!   |                                          |  WaitingForUserConsent
//!   |<--------------------- RESPONSE ACCEPT ---|
//!   |-- PAYLOAD_TRANSFER ... LAST_CHUNK ------>|  ReceivingFiles / ReceivingText
//!   |<------------------------ DISCONNECTION --|  Disconnected
//! ```

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use quickdrop_crypto::proto::Ukey2Message;
use quickdrop_crypto::{CryptoError, SessionKeys, Ukey2Responder};
use quickdrop_discovery::{EndpointInfo, RemoteDeviceInfo};
use quickdrop_files::{FileError, IncomingFile, unique_destination};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{Flow, Incoming, Session, Transport};
use crate::config::EngineConfig;
use crate::delegate::InboundDelegate;
use crate::error::{CancellationReason, Error, Result};
use crate::proto::offline::{self, FrameType, connection_response_frame};
use crate::proto::sharing::{
    self, FileMetadata, IntroductionFrame, PairedKeyStatus, ResponseStatus, TextMetadata,
    text_metadata,
};
use crate::transfer::{FileInfo, FileProgress, TextInfo, TextKind, TransferMetadata};

/// Inbound connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundState {
    /// Waiting for CONNECTION_REQUEST
    Initial,
    /// Waiting for UKEY2 ClientInit
    ReceivedConnectionRequest,
    /// Waiting for UKEY2 ClientFinish
    SentUkeyServerInit,
    /// Waiting for the sender's plaintext CONNECTION_RESPONSE
    ReceivedUkeyClientFinish,
    /// Waiting for the sender's PAIRED_KEY_ENCRYPTION
    SentConnectionResponse,
    /// Waiting for the sender's PAIRED_KEY_RESULT
    SentPairedKeyResult,
    /// Waiting for INTRODUCTION
    ReceivedPairedKeyResult,
    /// Introduction surfaced, waiting for the user
    WaitingForUserConsent,
    /// Accepted file transfer in progress
    ReceivingFiles,
    /// Accepted text transfer in progress
    ReceivingText,
    /// Connection closed
    Disconnected,
}

/// Commands from the manager to an inbound connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InboundCommand {
    /// User decision on the introduced transfer
    Consent(bool),
}

#[derive(Debug, Clone, Copy)]
struct PendingText {
    payload_id: i64,
    kind: TextKind,
}

/// Receiver state machine driven by one task
pub(crate) struct InboundConnection<S> {
    session: Session<S>,
    state: InboundState,
    config: Arc<EngineConfig>,
    delegate: Arc<dyn InboundDelegate>,
    commands: mpsc::Receiver<InboundCommand>,
    responder: Option<Ukey2Responder>,
    pending_keys: Option<SessionKeys>,
    pin: Option<String>,
    remote: Option<RemoteDeviceInfo>,
    files: HashMap<i64, IncomingFile>,
    text: Option<PendingText>,
    finished: bool,
}

impl<S: Transport> InboundConnection<S> {
    pub(crate) fn new(
        id: impl Into<String>,
        stream: S,
        config: Arc<EngineConfig>,
        delegate: Arc<dyn InboundDelegate>,
        commands: mpsc::Receiver<InboundCommand>,
    ) -> Self {
        Self {
            session: Session::new(id, stream),
            state: InboundState::Initial,
            config,
            delegate,
            commands,
            responder: Some(Ukey2Responder::new()),
            pending_keys: None,
            pin: None,
            remote: None,
            files: HashMap::new(),
            text: None,
            finished: false,
        }
    }

    /// Drive the connection to completion, clean up, and report the outcome once.
    pub(crate) async fn run(mut self) {
        let result = self.drive().await;
        let id = self.session.id().to_string();

        self.state = InboundState::Disconnected;
        self.session.close().await;
        for file in self.files.values_mut() {
            file.discard().await;
        }

        let error = match result {
            Ok(()) => {
                info!(connection = %id, "Incoming transfer finished");
                None
            }
            Err(e) if e.is_canceled() => {
                info!(connection = %id, reason = %e, "Incoming transfer ended");
                Some(e)
            }
            Err(e) => {
                error!(connection = %id, error = %e, "Incoming connection failed");
                Some(e)
            }
        };
        self.delegate.incoming_transfer_finished(&id, error);
    }

    async fn drive(&mut self) -> Result<()> {
        loop {
            let flow = tokio::select! {
                frame = self.session.next_frame() => match frame? {
                    Some(raw) => self.handle_frame(&raw).await?,
                    None => return self.on_stream_closed(),
                },
                Some(command) = self.commands.recv() => self.handle_command(command).await?,
            };
            if flow == Flow::Close {
                return Ok(());
            }
        }
    }

    async fn handle_frame(&mut self, raw: &[u8]) -> Result<Flow> {
        match self.state {
            InboundState::Initial => self.on_connection_request(raw),
            InboundState::ReceivedConnectionRequest => self.on_client_init(raw).await,
            InboundState::SentUkeyServerInit => self.on_client_finish(raw).await,
            InboundState::ReceivedUkeyClientFinish => self.on_plaintext_frame(raw).await,
            InboundState::Disconnected => Ok(Flow::Close),
            _ => {
                let incoming = self.session.receive_encrypted(raw).await?;
                self.on_incoming(incoming).await
            }
        }
    }

    async fn handle_command(&mut self, command: InboundCommand) -> Result<Flow> {
        match command {
            InboundCommand::Consent(accept) if self.state == InboundState::WaitingForUserConsent => {
                self.on_consent(accept).await
            }
            InboundCommand::Consent(_) => {
                warn!(
                    connection = %self.session.id(),
                    state = ?self.state,
                    "Ignoring consent for a transfer that is not waiting for it"
                );
                Ok(Flow::Continue)
            }
        }
    }

    // ============ Handshake ============

    fn on_connection_request(&mut self, raw: &[u8]) -> Result<Flow> {
        let frame = offline::decode(raw)?;
        let (frame_type, v1) = offline::v1(&frame)?;
        if frame_type != FrameType::ConnectionRequest {
            return Err(Error::Protocol(
                format!("expected connection request, got {frame_type:?}").into(),
            ));
        }
        let request = v1
            .connection_request
            .as_ref()
            .ok_or(Error::RequiredFieldMissing("offlineFrame.v1.connectionRequest"))?;
        let endpoint_info = request
            .endpoint_info
            .as_deref()
            .ok_or(Error::RequiredFieldMissing("connectionRequest.endpointInfo"))?;

        let mut remote = RemoteDeviceInfo::from(EndpointInfo::decode(endpoint_info)?);
        remote.id = request.endpoint_id.clone();
        info!(
            connection = %self.session.id(),
            device = %remote.name,
            device_type = %remote.device_type,
            "Connection request"
        );

        self.remote = Some(remote);
        self.state = InboundState::ReceivedConnectionRequest;
        Ok(Flow::Continue)
    }

    async fn on_client_init(&mut self, raw: &[u8]) -> Result<Flow> {
        let responder = self
            .responder
            .as_mut()
            .ok_or(Error::protocol("handshake already finished"))?;
        match responder.handle_client_init(raw) {
            Ok(server_init) => {
                self.session.send_raw(server_init).await?;
                self.state = InboundState::SentUkeyServerInit;
                Ok(Flow::Continue)
            }
            Err(e) => Err(self.handshake_failed(e).await),
        }
    }

    async fn on_client_finish(&mut self, raw: &[u8]) -> Result<Flow> {
        let responder = self
            .responder
            .take()
            .ok_or(Error::protocol("handshake already finished"))?;
        match responder.handle_client_finish(raw) {
            Ok(outcome) => {
                info!(connection = %self.session.id(), pin = %outcome.pin, "Handshake complete");
                self.pin = Some(outcome.pin);
                self.pending_keys = Some(outcome.keys);
                self.state = InboundState::ReceivedUkeyClientFinish;
                Ok(Flow::Continue)
            }
            Err(e) => Err(self.handshake_failed(e).await),
        }
    }

    async fn handshake_failed(&mut self, err: CryptoError) -> Error {
        warn!(connection = %self.session.id(), error = %err, "Handshake failed, sending alert");
        if let Err(e) = self.session.send_raw(Ukey2Message::alert(err.alert())).await {
            debug!(connection = %self.session.id(), error = %e, "Could not send alert");
        }
        Error::Handshake(err)
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
                    return Err(Error::protocol("sender did not accept the connection"));
                }
                self.session
                    .send_offline(&offline::connection_response_accept())
                    .await?;
                let keys = self
                    .pending_keys
                    .take()
                    .ok_or(Error::protocol("session keys missing"))?;
                self.session.enable_encryption(keys);
                self.session
                    .send_sharing(&sharing::paired_key_encryption()?)
                    .await?;
                self.state = InboundState::SentConnectionResponse;
                Ok(Flow::Continue)
            }
            FrameType::KeepAlive => {
                self.session.answer_keep_alive(v1).await?;
                Ok(Flow::Continue)
            }
            FrameType::Disconnection => self.on_disconnection(),
            other => Err(Error::Protocol(
                format!("unexpected {other:?} frame before encryption").into(),
            )),
        }
    }

    // ============ Encrypted Phase ============

    async fn on_incoming(&mut self, incoming: Incoming) -> Result<Flow> {
        match incoming {
            Incoming::Bytes { id, data } => self.on_bytes_payload(id, data).await,
            Incoming::FileChunk {
                id,
                offset,
                body,
                last,
            } => self.on_file_chunk(id, offset, &body, last).await,
            Incoming::Disconnection => self.on_disconnection(),
            Incoming::Handled => Ok(Flow::Continue),
            Incoming::Other(frame_type) => {
                debug!(connection = %self.session.id(), ?frame_type, "Ignoring offline frame");
                Ok(Flow::Continue)
            }
        }
    }

    async fn on_bytes_payload(&mut self, payload_id: i64, data: Vec<u8>) -> Result<Flow> {
        let text_kind = self
            .text
            .filter(|t| t.payload_id == payload_id)
            .map(|t| t.kind);
        let Some(kind) = text_kind else {
            return self.on_sharing_frame(&sharing::decode(&data)?).await;
        };

        if self.state != InboundState::ReceivingText {
            return Err(Error::protocol("text payload before the transfer was accepted"));
        }
        let text =
            String::from_utf8(data).map_err(|_| Error::protocol("text payload is not UTF-8"))?;
        info!(connection = %self.session.id(), %kind, len = text.len(), "Text received");
        self.delegate.received_text(self.session.id(), kind, &text);

        self.finished = true;
        self.session.send_disconnection().await?;
        Ok(Flow::Close)
    }

    async fn on_sharing_frame(&mut self, frame: &sharing::Frame) -> Result<Flow> {
        let (frame_type, v1) = sharing::v1(frame)?;
        debug!(connection = %self.session.id(), ?frame_type, state = ?self.state, "Sharing frame");

        match (self.state, frame_type) {
            (_, sharing::FrameType::Cancel) => {
                info!(connection = %self.session.id(), "Sender canceled the transfer");
                self.session.disconnect_quietly().await;
                Err(Error::Canceled(CancellationReason::UserCanceled))
            }
            (_, sharing::FrameType::CertificateInfo) => Ok(Flow::Continue),
            (InboundState::SentConnectionResponse, sharing::FrameType::PairedKeyEncryption) => {
                if v1.paired_key_encryption.is_none() {
                    return Err(Error::RequiredFieldMissing("sharingFrame.v1.pairedKeyEncryption"));
                }
                self.session
                    .send_sharing(&sharing::paired_key_result(PairedKeyStatus::Unable))
                    .await?;
                self.state = InboundState::SentPairedKeyResult;
                Ok(Flow::Continue)
            }
            (InboundState::SentPairedKeyResult, sharing::FrameType::PairedKeyResult) => {
                if v1.paired_key_result.is_none() {
                    return Err(Error::RequiredFieldMissing("sharingFrame.v1.pairedKeyResult"));
                }
                self.state = InboundState::ReceivedPairedKeyResult;
                Ok(Flow::Continue)
            }
            (InboundState::ReceivedPairedKeyResult, sharing::FrameType::Introduction) => {
                let introduction = v1
                    .introduction
                    .as_ref()
                    .ok_or(Error::RequiredFieldMissing("sharingFrame.v1.introduction"))?;
                self.on_introduction(introduction).await
            }
            (state, frame_type) => Err(Error::Protocol(
                format!("unexpected {frame_type:?} frame in state {state:?}").into(),
            )),
        }
    }

    // ============ Introduction & Consent ============

    async fn on_introduction(&mut self, introduction: &IntroductionFrame) -> Result<Flow> {
        let pin = self.pin.clone().unwrap_or_default();
        let metadata = match (
            introduction.file_metadata.as_slice(),
            introduction.text_metadata.as_slice(),
        ) {
            ([_, ..], []) => self.prepare_files(&introduction.file_metadata, pin)?,
            ([], [text]) if is_accepted_text(text) => self.prepare_text(text, pin)?,
            // mixed file and text offers are refused rather than half-accepted
            _ => {
                info!(connection = %self.session.id(), "Rejecting unsupported introduction");
                self.session
                    .send_sharing(&sharing::response(ResponseStatus::UnsupportedAttachmentType))
                    .await?;
                self.session.disconnect_quietly().await;
                return Err(Error::Canceled(CancellationReason::UnsupportedType));
            }
        };

        let device = self
            .remote
            .as_ref()
            .ok_or(Error::protocol("introduction before connection request"))?;
        info!(
            connection = %self.session.id(),
            device = %device.name,
            offer = %metadata.describe(),
            "Asking for consent"
        );
        self.state = InboundState::WaitingForUserConsent;
        self.delegate.obtain_user_consent(&metadata, device);
        Ok(Flow::Continue)
    }

    fn prepare_files(&mut self, files: &[FileMetadata], pin: String) -> Result<TransferMetadata> {
        let mut reserved = Vec::with_capacity(files.len());
        let mut infos = Vec::with_capacity(files.len());

        for meta in files {
            let payload_id = meta
                .payload_id
                .ok_or(Error::RequiredFieldMissing("fileMetadata.payloadId"))?;
            let name = meta
                .name
                .as_deref()
                .ok_or(Error::RequiredFieldMissing("fileMetadata.name"))?;
            let size = meta
                .size
                .ok_or(Error::RequiredFieldMissing("fileMetadata.size"))?;
            let size = u64::try_from(size).map_err(|_| Error::protocol("negative file size"))?;

            let destination = unique_destination(&self.config.download_dir, name, &reserved);
            reserved.push(destination.clone());
            let pending = IncomingFile::new(payload_id, name, destination.clone(), size);
            if self.files.insert(payload_id, pending).is_some() {
                return Err(Error::Protocol(
                    format!("duplicate payload id {payload_id} in introduction").into(),
                ));
            }
            infos.push(FileInfo {
                name: name.to_string(),
                size,
                mime_type: meta.mime_type().to_string(),
                destination,
            });
        }

        Ok(TransferMetadata {
            id: self.session.id().to_string(),
            files: infos,
            text: None,
            pin,
        })
    }

    fn prepare_text(&mut self, meta: &TextMetadata, pin: String) -> Result<TransferMetadata> {
        let payload_id = meta
            .payload_id
            .ok_or(Error::RequiredFieldMissing("textMetadata.payloadId"))?;
        let kind = TextKind::from_wire(meta.r#type())
            .ok_or(Error::protocol("unknown text type"))?;
        self.text = Some(PendingText { payload_id, kind });

        Ok(TransferMetadata {
            id: self.session.id().to_string(),
            files: Vec::new(),
            text: Some(TextInfo {
                title: meta.text_title().to_string(),
                kind,
                size: u64::try_from(meta.size()).unwrap_or(0),
            }),
            pin,
        })
    }

    async fn on_consent(&mut self, accept: bool) -> Result<Flow> {
        if !accept {
            info!(connection = %self.session.id(), "Transfer rejected by user");
            self.session
                .send_sharing(&sharing::response(ResponseStatus::Reject))
                .await?;
            self.session.disconnect_quietly().await;
            return Err(Error::Canceled(CancellationReason::UserRejected));
        }

        if self.text.is_some() {
            self.state = InboundState::ReceivingText;
        } else {
            for file in self.files.values_mut() {
                file.create().await?;
            }
            self.state = InboundState::ReceivingFiles;
        }
        info!(connection = %self.session.id(), "Transfer accepted by user");
        self.session
            .send_sharing(&sharing::response(ResponseStatus::Accept))
            .await?;
        Ok(Flow::Continue)
    }

    // ============ Payloads ============

    async fn on_file_chunk(
        &mut self,
        payload_id: i64,
        offset: u64,
        body: &[u8],
        last: bool,
    ) -> Result<Flow> {
        if self.state != InboundState::ReceivingFiles {
            return Err(Error::protocol("file payload outside an accepted transfer"));
        }
        let file = self
            .files
            .get_mut(&payload_id)
            .ok_or_else(|| Error::Protocol(format!("unknown payload id {payload_id}").into()))?;

        if offset != file.bytes_written() {
            return Err(FileError::OffsetMismatch {
                expected: file.bytes_written(),
                actual: offset,
            }
            .into());
        }
        if !body.is_empty() {
            file.append(offset, body).await?;
            self.delegate.transfer_progress(
                self.session.id(),
                FileProgress {
                    payload_id,
                    bytes_received: file.bytes_written(),
                    bytes_total: file.declared_size(),
                },
            );
        }
        if !last {
            return Ok(Flow::Continue);
        }

        if file.bytes_written() != file.declared_size() {
            return Err(Error::Protocol(Cow::Owned(format!(
                "file {} ended after {} of {} bytes",
                file.name(),
                file.bytes_written(),
                file.declared_size()
            ))));
        }
        file.finish().await?;
        if let Some(done) = self.files.remove(&payload_id) {
            info!(
                connection = %self.session.id(),
                payload_id,
                path = %done.path().display(),
                bytes = done.bytes_written(),
                "File received"
            );
        }

        if self.files.is_empty() {
            self.finished = true;
            self.session.send_disconnection().await?;
            return Ok(Flow::Close);
        }
        Ok(Flow::Continue)
    }

    // ============ Closure ============

    fn on_disconnection(&self) -> Result<Flow> {
        if self.finished {
            return Ok(Flow::Close);
        }
        info!(connection = %self.session.id(), state = ?self.state, "Sender disconnected");
        Err(Error::Canceled(CancellationReason::UserCanceled))
    }

    fn on_stream_closed(&self) -> Result<()> {
        if self.finished || self.state == InboundState::Initial {
            return Ok(());
        }
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed before the transfer completed",
        )))
    }
}

fn is_accepted_text(meta: &TextMetadata) -> bool {
    matches!(
        meta.r#type(),
        text_metadata::Type::Url | text_metadata::Type::PhoneNumber | text_metadata::Type::Text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use prost::Message;
    use quickdrop_crypto::proto::{AlertType, Ukey2Alert, Ukey2MessageType};
    use quickdrop_discovery::DeviceType;
    use tokio::io::DuplexStream;

    #[derive(Default)]
    struct Recorder {
        finished: Mutex<Vec<(String, Option<String>)>>,
    }

    impl InboundDelegate for Recorder {
        fn obtain_user_consent(&self, _: &TransferMetadata, _: &RemoteDeviceInfo) {}

        fn incoming_transfer_finished(&self, id: &str, error: Option<Error>) {
            self.finished
                .lock()
                .unwrap()
                .push((id.to_string(), error.map(|e| e.to_string())));
        }
    }

    fn spawn_connection(
        stream: DuplexStream,
    ) -> (Arc<Recorder>, mpsc::Sender<InboundCommand>, tokio::task::JoinHandle<()>) {
        let recorder = Arc::new(Recorder::default());
        let (tx, rx) = mpsc::channel(4);
        let connection = InboundConnection::new(
            "test",
            stream,
            Arc::new(EngineConfig::default()),
            recorder.clone(),
            rx,
        );
        (recorder, tx, tokio::spawn(connection.run()))
    }

    #[tokio::test]
    async fn test_first_frame_must_be_connection_request() {
        let (client, server) = tokio::io::duplex(1 << 16);
        let (recorder, _tx, task) = spawn_connection(server);

        let mut peer = Session::new("peer", client);
        peer.send_offline(&offline::keep_alive(false)).await.unwrap();
        task.await.unwrap();

        let finished = recorder.finished.lock().unwrap();
        assert_eq!(finished.len(), 1);
        assert!(finished[0].1.as_deref().unwrap().contains("expected connection request"));
    }

    #[tokio::test]
    async fn test_bad_client_init_answered_with_alert() {
        let (client, server) = tokio::io::duplex(1 << 16);
        let (recorder, _tx, task) = spawn_connection(server);

        let mut peer = Session::new("peer", client);
        let info = EndpointInfo::new("Pixel", DeviceType::Phone).encode().unwrap();
        peer.send_offline(&offline::connection_request("ABCD", "Pixel", info))
            .await
            .unwrap();
        peer.send_raw(vec![0x08, 0x63]).await.unwrap();

        let raw = peer.next_frame().await.unwrap().unwrap();
        let message = Ukey2Message::decode(&raw[..]).unwrap();
        assert_eq!(message.message_type(), Ukey2MessageType::Alert);
        let alert = Ukey2Alert::decode(message.message_data()).unwrap();
        assert_eq!(alert.r#type(), AlertType::BadMessage);

        task.await.unwrap();
        let finished = recorder.finished.lock().unwrap();
        assert!(finished[0].1.as_deref().unwrap().starts_with("Handshake failed"));
    }

    #[tokio::test]
    async fn test_close_before_anything_is_clean() {
        let (client, server) = tokio::io::duplex(1024);
        let (recorder, _tx, task) = spawn_connection(server);
        drop(client);
        task.await.unwrap();
        assert_eq!(
            recorder.finished.lock().unwrap().as_slice(),
            &[("test".to_string(), None)]
        );
    }

    #[test]
    fn test_accepted_text_kinds() {
        let meta = |kind: text_metadata::Type| TextMetadata {
            r#type: Some(kind as i32),
            ..Default::default()
        };
        assert!(is_accepted_text(&meta(text_metadata::Type::Url)));
        assert!(is_accepted_text(&meta(text_metadata::Type::Text)));
        assert!(is_accepted_text(&meta(text_metadata::Type::PhoneNumber)));
        assert!(!is_accepted_text(&meta(text_metadata::Type::Address)));
        assert!(!is_accepted_text(&meta(text_metadata::Type::Unknown)));
    }
}
