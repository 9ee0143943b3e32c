//! URL-safe base64 as used by service names, TXT records and QR URLs.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::CryptoError;

/// Emits no padding, accepts input with or without it.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes as unpadded URL-safe base64.
#[must_use]
pub fn base64url_encode(data: &[u8]) -> String {
    URL_SAFE_LENIENT.encode(data)
}

/// Decode URL-safe base64, padded or not.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidEncoding`] on characters outside the URL-safe alphabet.
pub fn base64url_decode(data: &str) -> Result<Vec<u8>, CryptoError> {
    URL_SAFE_LENIENT
        .decode(data.trim())
        .map_err(|_| CryptoError::InvalidEncoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_padding_emitted() {
        assert_eq!(base64url_encode(&[0xfb, 0xff]), "-_8");
    }

    #[test]
    fn test_padding_tolerated() {
        assert_eq!(base64url_decode("-_8=").unwrap(), vec![0xfb, 0xff]);
        assert_eq!(base64url_decode("-_8").unwrap(), vec![0xfb, 0xff]);
    }

    #[test]
    fn test_standard_alphabet_rejected() {
        assert!(base64url_decode("+/8").is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn roundtrip_without_padding(data in prop::collection::vec(any::<u8>(), 0..256)) {
                let encoded = base64url_encode(&data);
                prop_assert!(!encoded.contains(['=', '+', '/']));
                prop_assert_eq!(base64url_decode(&encoded).unwrap(), data);
            }
        }
    }
}
