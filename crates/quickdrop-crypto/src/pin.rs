//! Four-digit verification PIN shown on both devices.

const PIN_MODULUS: i32 = 9973;
const PIN_MULTIPLIER: i32 = 31;

/// Derive the PIN from the UKEY2 authentication string.
///
/// Bytes are read as signed 8-bit integers, so the running hash can go negative;
/// its absolute value is printed zero-padded to four digits.
#[must_use]
pub fn pin_from_auth_string(auth: &[u8]) -> String {
    let mut hash: i32 = 0;
    let mut multiplier: i32 = 1;
    for &byte in auth {
        hash = (hash + i32::from(byte as i8) * multiplier) % PIN_MODULUS;
        multiplier = (multiplier * PIN_MULTIPLIER) % PIN_MODULUS;
    }
    format!("{:04}", hash.abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_auth() {
        assert_eq!(pin_from_auth_string(&[0u8; 32]), "0000");
        assert_eq!(pin_from_auth_string(&[]), "0000");
    }

    #[test]
    fn test_signed_bytes() {
        assert_eq!(pin_from_auth_string(&[0x01]), "0001");
        assert_eq!(pin_from_auth_string(&[0xff]), "0001");
        assert_eq!(pin_from_auth_string(&[0x80]), "0128");
    }

    #[test]
    fn test_multiplier_progression() {
        // 1 + 1*31
        assert_eq!(pin_from_auth_string(&[0x01, 0x01]), "0032");
        // 1 + 1*31 + 1*961
        assert_eq!(pin_from_auth_string(&[0x01, 0x01, 0x01]), "0993");
    }
}
