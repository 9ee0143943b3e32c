//! Length-prefixed frame transport.
//!
//! ```text
//! +----------------+---------------------------+
//! | length (u32 BE)| payload (length bytes)    |
//! +----------------+---------------------------+
//! ```
//!
//! Lengths at or above [`SANE_FRAME_LENGTH`] are rejected before any of the payload is
//! read. The codec is cancel-safe: a partially received frame stays in the read buffer.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::FrameError;

/// Exclusive upper bound on a frame's payload length (5 MiB)
pub const SANE_FRAME_LENGTH: usize = 5 * 1024 * 1024;

/// Size of the length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Codec for 4-byte big-endian length-prefixed frames
#[derive(Debug, Clone, Copy, Default)]
pub struct NearbyFrameCodec {
    _priv: (),
}

impl NearbyFrameCodec {
    /// Create a codec
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for NearbyFrameCodec {
    type Item = BytesMut;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_SIZE]);
        let length = u32::from_be_bytes(prefix) as usize;

        if length >= SANE_FRAME_LENGTH {
            return Err(FrameError::TooLarge {
                length,
                limit: SANE_FRAME_LENGTH,
            });
        }

        if src.len() < LENGTH_PREFIX_SIZE + length {
            src.reserve(LENGTH_PREFIX_SIZE + length - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(src.split_to(length)))
    }
}

impl Encoder<Bytes> for NearbyFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() >= SANE_FRAME_LENGTH {
            return Err(FrameError::TooLarge {
                length: item.len(),
                limit: SANE_FRAME_LENGTH,
            });
        }
        dst.reserve(LENGTH_PREFIX_SIZE + item.len());
        // bounded by SANE_FRAME_LENGTH
        dst.put_u32(item.len() as u32);
        dst.extend_from_slice(&item);
        Ok(())
    }
}
