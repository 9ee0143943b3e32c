//! SHA-2 digests and HKDF-SHA256 key derivation.
//!
//! Provides:
//! - SHA-256 / SHA-512 one-shot digests
//! - HKDF extract and expand (RFC 5869) over HMAC-SHA256
//! - A fixed 32-byte convenience wrapper used by the UKEY2 key schedule

use hkdf::Hkdf;
use sha2::{Digest, Sha256, Sha512};

use crate::CryptoError;

/// SHA-256 output (32 bytes).
pub type Sha256Output = [u8; 32];

/// Compute SHA-256 of input data.
#[must_use]
pub fn sha256(data: &[u8]) -> Sha256Output {
    Sha256::digest(data).into()
}

/// Compute SHA-512 of input data.
#[must_use]
pub fn sha512(data: &[u8]) -> [u8; 64] {
    let mut out = [0u8; 64];
    out.copy_from_slice(&Sha512::digest(data));
    out
}

/// HKDF-Extract: derive a pseudorandom key from `salt` and `ikm`.
///
/// An empty salt is treated as a string of zeros, per RFC 5869.
#[must_use]
pub fn hkdf_extract(salt: &[u8], ikm: &[u8]) -> Sha256Output {
    let (prk, _) = Hkdf::<Sha256>::extract(Some(salt), ikm);
    prk.into()
}

/// HKDF-Expand: stretch `prk` into `len` bytes bound to `info`.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivationFailed`] if `len` exceeds 255 * 32 bytes.
pub fn hkdf_expand(prk: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>, CryptoError> {
    let hk = Hkdf::<Sha256>::from_prk(prk).map_err(|_| CryptoError::InvalidKeyLength {
        expected: 32,
        actual: prk.len(),
    })?;
    let mut okm = vec![0u8; len];
    hk.expand(info, &mut okm)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;
    Ok(okm)
}

/// Extract then expand in one call.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivationFailed`] if `len` is too large.
pub fn hkdf(salt: &[u8], ikm: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>, CryptoError> {
    hkdf_expand(&hkdf_extract(salt, ikm), info, len)
}

/// Derive exactly 32 bytes.
#[must_use]
pub fn hkdf_32(salt: &[u8], ikm: &[u8], info: &[u8]) -> [u8; 32] {
    let mut okm = [0u8; 32];
    // 32 bytes is always within the HKDF-SHA256 output limit
    let _ = Hkdf::<Sha256>::new(Some(salt), ikm).expand(info, &mut okm);
    okm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_empty() {
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hkdf_deterministic() {
        let a = hkdf(b"salt", b"ikm", b"info", 32).unwrap();
        let b = hkdf(b"salt", b"ikm", b"info", 32).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hkdf_32_matches_generic() {
        let generic = hkdf(b"UKEY2 v1 auth", b"master", b"transcript", 32).unwrap();
        assert_eq!(hkdf_32(b"UKEY2 v1 auth", b"master", b"transcript").to_vec(), generic);
    }

    #[test]
    fn test_hkdf_expand_too_long() {
        let prk = hkdf_extract(b"", b"ikm");
        assert!(hkdf_expand(&prk, b"", 255 * 32 + 1).is_err());
    }

    #[test]
    fn test_hkdf_prefix_property() {
        // Shorter output is a prefix of longer output for the same inputs
        let short = hkdf(b"s", b"k", b"i", 16).unwrap();
        let long = hkdf(b"s", b"k", b"i", 64).unwrap();
        assert_eq!(&long[..16], &short[..]);
    }
}
