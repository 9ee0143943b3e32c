//! Callbacks from the engine to the embedding application.
//!
//! Delegates are called from connection tasks and must not block; hand work off to another
//! task or channel if it takes time.

use quickdrop_discovery::{DiscoveredDevice, EndpointId, RemoteDeviceInfo};

use crate::error::Error;
use crate::transfer::{FileProgress, TextKind, TransferMetadata};

/// Receives events for incoming transfers
pub trait InboundDelegate: Send + Sync {
    /// A sender introduced a transfer. Answer with
    /// [`TransferManager::submit_user_consent`](crate::TransferManager::submit_user_consent).
    fn obtain_user_consent(&self, transfer: &TransferMetadata, device: &RemoteDeviceInfo);

    /// The connection for `id` ended. `error` is `None` on success.
    fn incoming_transfer_finished(&self, id: &str, error: Option<Error>);

    /// An accepted text transfer delivered its contents.
    fn received_text(&self, id: &str, kind: TextKind, text: &str) {
        let _ = (id, kind, text);
    }

    /// Bytes were written for one of the files of `id`.
    fn transfer_progress(&self, id: &str, progress: FileProgress) {
        let _ = (id, progress);
    }
}

/// Receives events for one outgoing transfer
pub trait OutboundDelegate: Send + Sync {
    /// Handshake finished; `pin` should match the one shown on the receiver.
    fn connection_established(&self, pin: &str) {
        let _ = pin;
    }

    /// The receiver accepted.
    fn transfer_accepted(&self) {}

    /// Fraction of bytes written, non-decreasing, in `0.0..=1.0`.
    fn transfer_progress(&self, fraction: f64) {
        let _ = fraction;
    }

    /// Everything was sent.
    fn transfer_finished(&self);

    /// The transfer ended without completing. Called at most once.
    fn connection_failed(&self, error: Error);
}

/// Receives changes to the set of visible devices
pub trait ShareDelegate: Send + Sync {
    /// A device appeared (or was replayed on registration).
    fn device_added(&self, device: &DiscoveredDevice);

    /// A device went away.
    fn device_removed(&self, id: &EndpointId);
}
