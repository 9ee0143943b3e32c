//! # QuickDrop Core
//!
//! Protocol engine for Quick Share (Nearby Share) compatible transfers on a local
//! network.
//!
//! This crate provides:
//! - Length-prefixed frame transport over any async byte stream
//! - Offline (`location.nearby.connections`) and sharing (`sharing.nearby`) frames
//! - Inbound and outbound connection state machines
//! - The [`TransferManager`] tying discovery, consent and connections together
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      TransferManager                             │
//! │   (identity, discovery cache, live connections, consent)         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │            InboundConnection / OutboundConnection                │
//! │   (one task per connection, explicit state machines)             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                          Session                                 │
//! │   (UKEY2 keys, SecureMessage envelope, payload reassembly)       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                       NearbyFrameCodec                           │
//! │   (4-byte big-endian length prefix, 5 MiB limit)                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use quickdrop_core::{
//!     EngineConfig, Error, InboundDelegate, TransferManager, TransferMetadata,
//! };
//! use quickdrop_discovery::RemoteDeviceInfo;
//!
//! struct AcceptAll;
//!
//! impl InboundDelegate for AcceptAll {
//!     fn obtain_user_consent(&self, transfer: &TransferMetadata, device: &RemoteDeviceInfo) {
//!         println!("{} wants to send {} (PIN {})", device.name, transfer.describe(), transfer.pin);
//!     }
//!
//!     fn incoming_transfer_finished(&self, id: &str, error: Option<Error>) {
//!         println!("{id} finished: {error:?}");
//!     }
//! }
//!
//! # async fn run() -> std::io::Result<()> {
//! let manager = TransferManager::new(EngineConfig::default(), Arc::new(AcceptAll));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:0").await?;
//! loop {
//!     let (stream, _) = listener.accept().await?;
//!     manager.accept_inbound(stream);
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connection;
pub mod delegate;
pub mod error;
pub mod frame;
pub mod manager;
pub mod proto;
pub mod transfer;

pub use config::EngineConfig;
pub use connection::{InboundState, OutboundHandle, OutboundState, Transport};
pub use delegate::{InboundDelegate, OutboundDelegate, ShareDelegate};
pub use error::{CancellationReason, Error, FrameError, Result};
pub use frame::{NearbyFrameCodec, SANE_FRAME_LENGTH};
pub use manager::TransferManager;
pub use transfer::{
    FileInfo, FileProgress, ShareTarget, TextInfo, TextKind, TransferId, TransferMetadata,
};
