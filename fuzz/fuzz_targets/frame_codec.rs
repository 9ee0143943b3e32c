//! Fuzz target for the length-prefixed frame codec
//!
//! Feeds arbitrary bytes in arbitrary pieces and checks that every decoded frame is
//! below the size limit.

#![no_main]

use arbitrary::Arbitrary;
use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use quickdrop_core::{NearbyFrameCodec, SANE_FRAME_LENGTH};
use tokio_util::codec::Decoder;

#[derive(Arbitrary, Debug)]
struct Input {
    pieces: Vec<Vec<u8>>,
}

fuzz_target!(|input: Input| {
    let mut codec = NearbyFrameCodec::new();
    let mut buf = BytesMut::new();

    for piece in input.pieces {
        buf.extend_from_slice(&piece);
        loop {
            match codec.decode(&mut buf) {
                Ok(Some(frame)) => assert!(frame.len() < SANE_FRAME_LENGTH),
                Ok(None) => break,
                Err(_) => return,
            }
        }
    }
});
