//! Fuzz target for advertisement parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use quickdrop_discovery::EndpointInfo;
use quickdrop_discovery::service::{decode_service_name, parse_txt_value};

fuzz_target!(|data: &[u8]| {
    if let Ok(info) = EndpointInfo::decode(data) {
        assert!(info.name.len() <= 255);
    }

    if let Ok(text) = std::str::from_utf8(data) {
        let _ = decode_service_name(text);
        let _ = parse_txt_value(text);
    }
});
