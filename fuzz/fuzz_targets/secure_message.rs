//! Fuzz target for the encrypted envelope
//!
//! Opening attacker-controlled bytes must fail cleanly and never advance the
//! receive sequence.

#![no_main]

use libfuzzer_sys::fuzz_target;
use quickdrop_crypto::{SecureChannel, SessionKeys};

fuzz_target!(|data: &[u8]| {
    let mut channel = SecureChannel::new(SessionKeys {
        encrypt_key: [1; 32],
        decrypt_key: [2; 32],
        send_hmac_key: [3; 32],
        recv_hmac_key: [4; 32],
    });

    if channel.open(data).is_err() {
        assert_eq!(channel.recv_sequence(), 0);
    }
});
