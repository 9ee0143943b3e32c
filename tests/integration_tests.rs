//! End-to-end scenarios for the QuickDrop protocol engine
//!
//! Each test runs the engine on one end of an in-memory duplex stream and either a
//! scripted [`Peer`] or a second engine on the other end.

use std::time::Duration;

use prost::Message;
use quickdrop_core::proto::offline;
use quickdrop_core::proto::sharing::{self, FileMetadata, ResponseStatus, TextMetadata};
use quickdrop_core::{CancellationReason, EngineConfig, Error, ShareTarget, TextKind, TransferManager};
use quickdrop_crypto::proto::{AlertType, Ukey2Alert, Ukey2ClientInit, Ukey2Message, Ukey2MessageType};
use quickdrop_integration_tests::{
    InboundEvent, InboundRecorder, OutboundEvent, OutboundRecorder, Peer, PeerEvent, STEP_TIMEOUT,
    next_event, pattern, receiving_manager, response_status, sharing_type, wait_inbound_finished,
};
use tempfile::TempDir;
use tokio::io::duplex;

const DUPLEX_BUFFER: usize = 256 * 1024;

fn file_metadata(name: &str, payload_id: i64, size: usize) -> FileMetadata {
    FileMetadata {
        name: Some(name.to_string()),
        r#type: Some(sharing::file_metadata::Type::Unknown as i32),
        payload_id: Some(payload_id),
        size: Some(size as i64),
        mime_type: Some("application/octet-stream".to_string()),
        id: Some(payload_id + 1_000_000),
    }
}

fn text_metadata(kind: sharing::text_metadata::Type, payload_id: i64, text: &str) -> TextMetadata {
    TextMetadata {
        text_title: Some("title".to_string()),
        r#type: Some(kind as i32),
        payload_id: Some(payload_id),
        size: Some(text.len() as i64),
        id: Some(7),
    }
}

async fn wait_until_finished(handle: &quickdrop_core::OutboundHandle) {
    tokio::time::timeout(STEP_TIMEOUT, async {
        while !handle.is_finished() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("outbound connection did not finish");
}

// ============================================================================
// Inbound
// ============================================================================

#[tokio::test]
async fn test_inbound_ten_files() {
    const FILES: usize = 10;
    const FILE_SIZE: usize = 100_000;

    let dir = TempDir::new().unwrap();
    let (manager, mut events) = receiving_manager(dir.path());
    let (engine_end, peer_end) = duplex(DUPLEX_BUFFER);
    let transfer_id = manager.accept_inbound(engine_end);
    let mut peer = Peer::new(peer_end);

    let pin = peer.handshake_as_sender("Pixel").await;
    let metadata: Vec<FileMetadata> = (0..FILES)
        .map(|i| file_metadata(&format!("file-{i}.bin"), 100 + i as i64, FILE_SIZE))
        .collect();
    peer.send_sharing(&sharing::introduction(metadata, Vec::new()))
        .await;

    let InboundEvent::Consent(transfer, device) = next_event(&mut events).await else {
        panic!("expected a consent request");
    };
    assert_eq!(transfer.id, transfer_id);
    assert_eq!(transfer.pin, pin);
    assert_eq!(transfer.files.len(), FILES);
    assert_eq!(transfer.total_size(), 1_000_000);
    assert_eq!(device.name, "Pixel");
    assert_eq!(device.id.as_deref(), Some("PEER"));

    manager.submit_user_consent(&transfer_id, true);
    let response = peer.recv_sharing().await;
    assert_eq!(response_status(&response), ResponseStatus::Accept);

    for i in 0..FILES {
        peer.send_file(100 + i as i64, &pattern(i as u8, FILE_SIZE), 40_000)
            .await;
    }
    assert!(matches!(peer.recv_event().await, PeerEvent::Disconnection));

    let mut progress = 0;
    let error = loop {
        match next_event(&mut events).await {
            InboundEvent::Progress(p) => {
                assert!(p.bytes_received <= p.bytes_total);
                progress += 1;
            }
            InboundEvent::Finished(id, error) => {
                assert_eq!(id, transfer_id);
                break error;
            }
            other => panic!("unexpected event {other:?}"),
        }
    };
    assert!(error.is_none(), "transfer failed: {error:?}");
    assert_eq!(progress, FILES * 3);

    for (i, info) in transfer.files.iter().enumerate() {
        assert_eq!(info.destination, dir.path().join(format!("file-{i}.bin")));
        let contents = std::fs::read(&info.destination).unwrap();
        assert_eq!(contents, pattern(i as u8, FILE_SIZE));
    }
}

#[tokio::test]
async fn test_inbound_bad_offset_fails_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let (manager, mut events) = receiving_manager(dir.path());
    let (engine_end, peer_end) = duplex(DUPLEX_BUFFER);
    let transfer_id = manager.accept_inbound(engine_end);
    let mut peer = Peer::new(peer_end);

    peer.handshake_as_sender("Pixel").await;
    peer.send_sharing(&sharing::introduction(
        vec![file_metadata("broken.bin", 5, 1000)],
        Vec::new(),
    ))
    .await;
    let InboundEvent::Consent(transfer, _) = next_event(&mut events).await else {
        panic!("expected a consent request");
    };
    manager.submit_user_consent(&transfer_id, true);
    assert_eq!(
        response_status(&peer.recv_sharing().await),
        ResponseStatus::Accept
    );

    peer.send_file_chunk(5, 1000, 10, vec![0; 100], false).await;

    let (_, error) = wait_inbound_finished(&mut events).await;
    match error {
        Some(Error::Protocol(msg)) => assert!(msg.contains("offset"), "{msg}"),
        other => panic!("expected an offset error, got {other:?}"),
    }
    assert!(!transfer.files[0].destination.exists());
}

#[tokio::test]
async fn test_inbound_bad_offset_keeps_completed_files() {
    const FILE_SIZE: usize = 1000;

    let dir = TempDir::new().unwrap();
    let (manager, mut events) = receiving_manager(dir.path());
    let (engine_end, peer_end) = duplex(DUPLEX_BUFFER);
    let transfer_id = manager.accept_inbound(engine_end);
    let mut peer = Peer::new(peer_end);

    peer.handshake_as_sender("Pixel").await;
    peer.send_sharing(&sharing::introduction(
        vec![
            file_metadata("done.bin", 1, FILE_SIZE),
            file_metadata("broken.bin", 2, FILE_SIZE),
            file_metadata("untouched.bin", 3, FILE_SIZE),
        ],
        Vec::new(),
    ))
    .await;
    let InboundEvent::Consent(transfer, _) = next_event(&mut events).await else {
        panic!("expected a consent request");
    };
    manager.submit_user_consent(&transfer_id, true);
    assert_eq!(
        response_status(&peer.recv_sharing().await),
        ResponseStatus::Accept
    );
    for info in &transfer.files {
        assert!(info.destination.exists());
    }

    let done = pattern(1, FILE_SIZE);
    peer.send_file(1, &done, 400).await;
    peer.send_file_chunk(2, FILE_SIZE as i64, 0, vec![7; 300], false)
        .await;
    peer.send_file_chunk(2, FILE_SIZE as i64, 500, vec![7; 300], false)
        .await;

    let (_, error) = wait_inbound_finished(&mut events).await;
    match error {
        Some(Error::Protocol(msg)) => assert!(msg.contains("offset"), "{msg}"),
        other => panic!("expected an offset error, got {other:?}"),
    }

    let paths: Vec<_> = transfer.files.iter().map(|f| &f.destination).collect();
    assert_eq!(std::fs::read(paths[0]).unwrap(), done);
    assert!(!paths[1].exists());
    assert!(!paths[2].exists());
}

#[tokio::test]
async fn test_inbound_url_text() {
    let dir = TempDir::new().unwrap();
    let (manager, mut events) = receiving_manager(dir.path());
    let (engine_end, peer_end) = duplex(DUPLEX_BUFFER);
    let transfer_id = manager.accept_inbound(engine_end);
    let mut peer = Peer::new(peer_end);

    let url = "https://example.com/article?id=4";
    peer.handshake_as_sender("Pixel").await;
    peer.send_sharing(&sharing::introduction(
        Vec::new(),
        vec![text_metadata(sharing::text_metadata::Type::Url, 77, url)],
    ))
    .await;

    let InboundEvent::Consent(transfer, _) = next_event(&mut events).await else {
        panic!("expected a consent request");
    };
    let text = transfer.text.as_ref().unwrap();
    assert_eq!(text.kind, TextKind::Url);
    assert_eq!(text.size, url.len() as u64);

    manager.submit_user_consent(&transfer_id, true);
    assert_eq!(
        response_status(&peer.recv_sharing().await),
        ResponseStatus::Accept
    );
    peer.send_bytes_payload(77, url.as_bytes().to_vec()).await;

    match next_event(&mut events).await {
        InboundEvent::Text(kind, received) => {
            assert_eq!(kind, TextKind::Url);
            assert_eq!(received, url);
        }
        other => panic!("expected text, got {other:?}"),
    }
    assert!(matches!(peer.recv_event().await, PeerEvent::Disconnection));
    let (_, error) = wait_inbound_finished(&mut events).await;
    assert!(error.is_none());
}

#[tokio::test]
async fn test_inbound_user_rejects() {
    let dir = TempDir::new().unwrap();
    let (manager, mut events) = receiving_manager(dir.path());
    let (engine_end, peer_end) = duplex(DUPLEX_BUFFER);
    let transfer_id = manager.accept_inbound(engine_end);
    let mut peer = Peer::new(peer_end);

    peer.handshake_as_sender("Pixel").await;
    peer.send_sharing(&sharing::introduction(
        vec![file_metadata("a.txt", 1, 3)],
        Vec::new(),
    ))
    .await;
    assert!(matches!(
        next_event(&mut events).await,
        InboundEvent::Consent(..)
    ));

    manager.submit_user_consent(&transfer_id, false);
    assert_eq!(
        response_status(&peer.recv_sharing().await),
        ResponseStatus::Reject
    );
    assert!(matches!(peer.recv_event().await, PeerEvent::Disconnection));

    let (_, error) = wait_inbound_finished(&mut events).await;
    assert!(matches!(
        error,
        Some(Error::Canceled(CancellationReason::UserRejected))
    ));
    assert!(!dir.path().join("a.txt").exists());
}

#[tokio::test]
async fn test_inbound_rejects_address_text() {
    let dir = TempDir::new().unwrap();
    let (manager, mut events) = receiving_manager(dir.path());
    let (engine_end, peer_end) = duplex(DUPLEX_BUFFER);
    manager.accept_inbound(engine_end);
    let mut peer = Peer::new(peer_end);

    peer.handshake_as_sender("Pixel").await;
    peer.send_sharing(&sharing::introduction(
        Vec::new(),
        vec![text_metadata(
            sharing::text_metadata::Type::Address,
            3,
            "1 Main St",
        )],
    ))
    .await;

    assert_eq!(
        response_status(&peer.recv_sharing().await),
        ResponseStatus::UnsupportedAttachmentType
    );
    let (_, error) = wait_inbound_finished(&mut events).await;
    assert!(matches!(
        error,
        Some(Error::Canceled(CancellationReason::UnsupportedType))
    ));
}

#[tokio::test]
async fn test_inbound_rejects_files_mixed_with_text() {
    let dir = TempDir::new().unwrap();
    let (manager, mut events) = receiving_manager(dir.path());
    let (engine_end, peer_end) = duplex(DUPLEX_BUFFER);
    manager.accept_inbound(engine_end);
    let mut peer = Peer::new(peer_end);

    peer.handshake_as_sender("Pixel").await;
    peer.send_sharing(&sharing::introduction(
        vec![file_metadata("a.txt", 1, 3)],
        vec![text_metadata(
            sharing::text_metadata::Type::Url,
            2,
            "https://example.com",
        )],
    ))
    .await;

    assert_eq!(
        response_status(&peer.recv_sharing().await),
        ResponseStatus::UnsupportedAttachmentType
    );
    let (_, error) = wait_inbound_finished(&mut events).await;
    assert!(matches!(
        error,
        Some(Error::Canceled(CancellationReason::UnsupportedType))
    ));
    assert!(!dir.path().join("a.txt").exists());
}

#[tokio::test]
async fn test_sender_cancel_while_waiting_for_consent() {
    let dir = TempDir::new().unwrap();
    let (manager, mut events) = receiving_manager(dir.path());
    let (engine_end, peer_end) = duplex(DUPLEX_BUFFER);
    let transfer_id = manager.accept_inbound(engine_end);
    let mut peer = Peer::new(peer_end);

    peer.handshake_as_sender("Pixel").await;
    peer.send_sharing(&sharing::introduction(
        vec![file_metadata("a.txt", 1, 3)],
        Vec::new(),
    ))
    .await;
    assert!(matches!(
        next_event(&mut events).await,
        InboundEvent::Consent(..)
    ));

    peer.send_sharing(&sharing::cancel()).await;
    let (_, error) = wait_inbound_finished(&mut events).await;
    assert!(matches!(
        error,
        Some(Error::Canceled(CancellationReason::UserCanceled))
    ));

    // Consent after the connection ended is ignored.
    manager.submit_user_consent(&transfer_id, true);
}

#[tokio::test]
async fn test_keep_alive_is_acknowledged() {
    let dir = TempDir::new().unwrap();
    let (manager, _events) = receiving_manager(dir.path());
    let (engine_end, peer_end) = duplex(DUPLEX_BUFFER);
    manager.accept_inbound(engine_end);
    let mut peer = Peer::new(peer_end);

    peer.handshake_as_sender("Pixel").await;
    peer.send_offline(&offline::keep_alive(false)).await;

    assert!(matches!(peer.recv_event().await, PeerEvent::KeepAlive(true)));
}

#[tokio::test]
async fn test_bad_ukey2_version_gets_alert() {
    let dir = TempDir::new().unwrap();
    let (manager, mut events) = receiving_manager(dir.path());
    let (engine_end, peer_end) = duplex(DUPLEX_BUFFER);
    manager.accept_inbound(engine_end);
    let mut peer = Peer::new(peer_end);

    let info = quickdrop_discovery::EndpointInfo::new("Pixel", quickdrop_discovery::DeviceType::Phone)
        .encode()
        .unwrap();
    peer.send_offline(&offline::connection_request("PEER", "Pixel", info))
        .await;
    let client_init = Ukey2ClientInit {
        version: Some(2),
        random: Some(vec![0; 32]),
        cipher_commitments: Vec::new(),
        next_protocol: Some("AES_256_CBC-HMAC_SHA256".to_string()),
    };
    peer.send_raw(Ukey2Message::wrap(Ukey2MessageType::ClientInit, &client_init).encode_to_vec())
        .await;

    let raw = peer.recv_raw().await.expect("no alert");
    let message = Ukey2Message::decode(&raw[..]).unwrap();
    assert_eq!(message.message_type(), Ukey2MessageType::Alert);
    let alert = Ukey2Alert::decode(message.message_data()).unwrap();
    assert_eq!(alert.r#type(), AlertType::BadVersion);

    let (_, error) = wait_inbound_finished(&mut events).await;
    assert!(matches!(error, Some(Error::Handshake(_))));
}

// ============================================================================
// Outbound
// ============================================================================

#[tokio::test]
async fn test_outbound_file_chunks_and_progress() {
    const SIZE: usize = 1_258_291;
    const CHUNK: usize = 512 * 1024;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("photo.jpg");
    std::fs::write(&path, pattern(9, SIZE)).unwrap();

    let (recorder, _inbound) = InboundRecorder::new();
    let manager = TransferManager::new(
        EngineConfig::default()
            .with_device_name("laptop")
            .with_chunk_size(CHUNK),
        recorder,
    );

    let (engine_end, peer_end) = duplex(DUPLEX_BUFFER);
    let (delegate, mut outbound) = OutboundRecorder::new();
    let handle = manager
        .start_outbound_transfer_over("peer", engine_end, ShareTarget::Files(vec![path]), delegate)
        .unwrap();
    let mut peer = Peer::new(peer_end);

    let (pin, sender_name) = peer.handshake_as_receiver().await;
    assert_eq!(sender_name, "laptop");
    assert!(matches!(next_event(&mut outbound).await, OutboundEvent::Established(p) if p == pin));

    let introduction = peer.recv_sharing().await;
    let (_, v1) = sharing::v1(&introduction).unwrap();
    let intro = v1.introduction.as_ref().unwrap();
    assert_eq!(intro.file_metadata.len(), 1);
    let file = &intro.file_metadata[0];
    assert_eq!(file.name(), "photo.jpg");
    assert_eq!(file.size(), SIZE as i64);
    assert_eq!(file.mime_type(), "image/jpeg");
    assert_eq!(file.r#type(), sharing::file_metadata::Type::Image);

    peer.send_sharing(&sharing::response(ResponseStatus::Accept))
        .await;

    let mut chunks = Vec::new();
    let mut received = Vec::with_capacity(SIZE);
    loop {
        match peer.recv_event().await {
            PeerEvent::FileChunk {
                id,
                total,
                offset,
                body,
                last,
            } => {
                assert_eq!(id, file.payload_id());
                assert_eq!(total, SIZE as i64);
                chunks.push((offset, body.len(), last));
                received.extend_from_slice(&body);
            }
            PeerEvent::Disconnection => break,
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(
        chunks,
        vec![
            (0, CHUNK, false),
            (CHUNK as i64, CHUNK, false),
            (2 * CHUNK as i64, SIZE - 2 * CHUNK, false),
            (SIZE as i64, 0, true),
        ]
    );
    assert_eq!(received, pattern(9, SIZE));

    assert!(matches!(next_event(&mut outbound).await, OutboundEvent::Accepted));
    let mut fractions = Vec::new();
    loop {
        match next_event(&mut outbound).await {
            OutboundEvent::Progress(f) => fractions.push(f),
            OutboundEvent::Finished => break,
            other => panic!("unexpected {other:?}"),
        }
    }
    assert!(!fractions.is_empty());
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
    assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)));
    assert_eq!(fractions.last().copied(), Some(1.0));

    wait_until_finished(&handle).await;
}

#[tokio::test]
async fn test_outbound_cancel_after_introduction() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, b"some notes").unwrap();

    let (recorder, _inbound) = InboundRecorder::new();
    let manager = TransferManager::new(EngineConfig::default(), recorder);
    let (engine_end, peer_end) = duplex(DUPLEX_BUFFER);
    let (delegate, mut outbound) = OutboundRecorder::new();
    let handle = manager
        .start_outbound_transfer_over("peer", engine_end, ShareTarget::Files(vec![path]), delegate)
        .unwrap();
    let mut peer = Peer::new(peer_end);

    peer.handshake_as_receiver().await;
    let introduction = peer.recv_sharing().await;
    assert_eq!(sharing_type(&introduction), sharing::FrameType::Introduction);

    assert!(manager.cancel_outgoing_transfer("peer"));
    let cancel = peer.recv_sharing().await;
    assert_eq!(sharing_type(&cancel), sharing::FrameType::Cancel);
    assert!(matches!(peer.recv_event().await, PeerEvent::Disconnection));

    wait_until_finished(&handle).await;
    assert!(!manager.cancel_outgoing_transfer("peer"));

    let mut failures = 0;
    while let Ok(event) = outbound.try_recv() {
        match event {
            OutboundEvent::Failed(error) => {
                assert!(matches!(
                    error,
                    Error::Canceled(CancellationReason::UserCanceled)
                ));
                failures += 1;
            }
            OutboundEvent::Finished => panic!("canceled transfer reported success"),
            _ => {}
        }
    }
    assert_eq!(failures, 1);
}

#[tokio::test]
async fn test_outbound_receiver_declines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, b"some notes").unwrap();

    let (recorder, _inbound) = InboundRecorder::new();
    let manager = TransferManager::new(EngineConfig::default(), recorder);
    let (engine_end, peer_end) = duplex(DUPLEX_BUFFER);
    let (delegate, mut outbound) = OutboundRecorder::new();
    manager
        .start_outbound_transfer_over("peer", engine_end, ShareTarget::Files(vec![path]), delegate)
        .unwrap();
    let mut peer = Peer::new(peer_end);

    peer.handshake_as_receiver().await;
    peer.recv_sharing().await;
    peer.send_sharing(&sharing::response(ResponseStatus::NotEnoughSpace))
        .await;
    assert!(matches!(peer.recv_event().await, PeerEvent::Disconnection));

    loop {
        match next_event(&mut outbound).await {
            OutboundEvent::Failed(error) => {
                assert!(matches!(
                    error,
                    Error::Canceled(CancellationReason::NotEnoughSpace)
                ));
                break;
            }
            OutboundEvent::Established(_) => {}
            other => panic!("unexpected {other:?}"),
        }
    }
}

// ============================================================================
// Engine to engine
// ============================================================================

#[tokio::test]
async fn test_engine_to_engine_files() {
    let source = TempDir::new().unwrap();
    let inbox = TempDir::new().unwrap();
    let first = source.path().join("a.txt");
    let second = source.path().join("b.bin");
    std::fs::write(&first, b"hello from the other side").unwrap();
    std::fs::write(&second, pattern(3, 700_000)).unwrap();
    // Existing file forces a collision-free name on the receiver.
    std::fs::write(inbox.path().join("a.txt"), b"older").unwrap();

    let (receiver, mut inbound) = receiving_manager(inbox.path());
    let (recorder, _unused) = InboundRecorder::new();
    let sender = TransferManager::new(
        EngineConfig::default()
            .with_device_name("sender")
            .with_chunk_size(64 * 1024),
        recorder,
    );

    let (a, b) = duplex(DUPLEX_BUFFER);
    let transfer_id = receiver.accept_inbound(a);
    let (delegate, mut outbound) = OutboundRecorder::new();
    sender
        .start_outbound_transfer_over(
            "receiver",
            b,
            ShareTarget::Files(vec![first, second]),
            delegate,
        )
        .unwrap();

    let OutboundEvent::Established(sender_pin) = next_event(&mut outbound).await else {
        panic!("expected the handshake to finish");
    };
    let InboundEvent::Consent(transfer, device) = next_event(&mut inbound).await else {
        panic!("expected a consent request");
    };
    assert_eq!(transfer.pin, sender_pin);
    assert_eq!(device.name, "sender");
    assert_eq!(device.id.as_deref(), Some(sender.endpoint_id().as_str()));
    assert_eq!(transfer.describe(), "2 files");

    receiver.submit_user_consent(&transfer_id, true);

    let (_, error) = wait_inbound_finished(&mut inbound).await;
    assert!(error.is_none(), "{error:?}");
    loop {
        match next_event(&mut outbound).await {
            OutboundEvent::Finished => break,
            OutboundEvent::Failed(e) => panic!("sender failed: {e}"),
            _ => {}
        }
    }

    assert_eq!(
        std::fs::read(inbox.path().join("a (1).txt")).unwrap(),
        b"hello from the other side"
    );
    assert_eq!(std::fs::read(inbox.path().join("a.txt")).unwrap(), b"older");
    assert_eq!(
        std::fs::read(inbox.path().join("b.bin")).unwrap(),
        pattern(3, 700_000)
    );
}

#[tokio::test]
async fn test_engine_to_engine_url() {
    let inbox = TempDir::new().unwrap();
    let (receiver, mut inbound) = receiving_manager(inbox.path());
    let (recorder, _unused) = InboundRecorder::new();
    let sender = TransferManager::new(EngineConfig::default(), recorder);

    let (a, b) = duplex(DUPLEX_BUFFER);
    let transfer_id = receiver.accept_inbound(a);
    let (delegate, mut outbound) = OutboundRecorder::new();
    let target = ShareTarget::from_args(["https://example.org/page"]).unwrap();
    sender
        .start_outbound_transfer_over("receiver", b, target, delegate)
        .unwrap();

    let InboundEvent::Consent(transfer, _) = next_event(&mut inbound).await else {
        panic!("expected a consent request");
    };
    assert_eq!(transfer.describe(), "URL \"example.org\"");
    receiver.submit_user_consent(&transfer_id, true);

    match next_event(&mut inbound).await {
        InboundEvent::Text(TextKind::Url, text) => assert_eq!(text, "https://example.org/page"),
        other => panic!("expected text, got {other:?}"),
    }
    let (_, error) = wait_inbound_finished(&mut inbound).await;
    assert!(error.is_none());

    loop {
        match next_event(&mut outbound).await {
            OutboundEvent::Finished => break,
            OutboundEvent::Failed(e) => panic!("sender failed: {e}"),
            _ => {}
        }
    }
}
