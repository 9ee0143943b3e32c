//! Fuzz target for offline and sharing frame decoding

#![no_main]

use libfuzzer_sys::fuzz_target;
use quickdrop_core::proto::{offline, sharing};

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = offline::decode(data) {
        let _ = offline::v1(&frame);
    }
    if let Ok(frame) = sharing::decode(data) {
        let _ = sharing::v1(&frame);
    }
});
