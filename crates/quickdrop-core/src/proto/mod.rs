//! Protobuf wire frames above the handshake layer.
//!
//! Field numbers follow the `location.nearby.connections` and `sharing.nearby`
//! packages.

pub mod offline;
pub mod sharing;
