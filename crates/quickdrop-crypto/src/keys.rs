//! Ephemeral P-256 keys and their `GenericPublicKey` wire form.

use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::{EncodedPoint, FieldBytes, PublicKey, SecretKey};
use rand_core::OsRng;
use zeroize::Zeroizing;

use crate::CryptoError;
use crate::proto::{EcP256PublicKey, GenericPublicKey, PublicKeyType};

/// Width of a P-256 coordinate
const COORDINATE_SIZE: usize = 32;

/// Single-use P-256 key pair.
///
/// The secret scalar is zeroized when the pair is dropped.
pub struct EphemeralKeyPair {
    secret: SecretKey,
}

impl EphemeralKeyPair {
    /// Generate a fresh key pair from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::random(&mut OsRng),
        }
    }

    /// Public half.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.secret.public_key()
    }

    /// Public half as a `GenericPublicKey` message.
    #[must_use]
    pub fn generic_public_key(&self) -> GenericPublicKey {
        encode_public_key(&self.public_key())
    }

    /// ECDH with `peer`, returning the shared X coordinate.
    #[must_use]
    pub fn diffie_hellman(&self, peer: &PublicKey) -> Zeroizing<[u8; COORDINATE_SIZE]> {
        let shared = p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), peer.as_affine());
        let mut out = Zeroizing::new([0u8; COORDINATE_SIZE]);
        out.copy_from_slice(shared.raw_secret_bytes());
        out
    }
}

/// Encode a public key with two's-complement coordinates.
#[must_use]
pub fn encode_public_key(key: &PublicKey) -> GenericPublicKey {
    let point = key.to_encoded_point(false);
    GenericPublicKey {
        r#type: PublicKeyType::EcP256 as i32,
        ec_p256_public_key: Some(EcP256PublicKey {
            x: point.x().map(|x| signed_big_endian(x)).unwrap_or_default(),
            y: point.y().map(|y| signed_big_endian(y)).unwrap_or_default(),
        }),
    }
}

/// Decode a `GenericPublicKey` into a curve point.
///
/// Coordinates may carry a leading sign byte or be shorter than 32 bytes.
///
/// # Errors
///
/// Returns [`CryptoError::MissingField`] if the EC key is absent and
/// [`CryptoError::InvalidPublicKey`] if the type is wrong or the point is not on the curve.
pub fn decode_public_key(key: &GenericPublicKey) -> Result<PublicKey, CryptoError> {
    if key.r#type != PublicKeyType::EcP256 as i32 {
        return Err(CryptoError::InvalidPublicKey);
    }
    let ec = key
        .ec_p256_public_key
        .as_ref()
        .ok_or(CryptoError::MissingField("ec_p256_public_key"))?;
    let x = fixed_coordinate(&ec.x)?;
    let y = fixed_coordinate(&ec.y)?;
    let point = EncodedPoint::from_affine_coordinates(&x, &y, false);
    Option::from(PublicKey::from_encoded_point(&point)).ok_or(CryptoError::InvalidPublicKey)
}

/// Prefix a zero byte when the high bit is set so the value stays positive.
fn signed_big_endian(unsigned: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(unsigned.len() + 1);
    if unsigned.first().is_some_and(|b| b & 0x80 != 0) {
        out.push(0);
    }
    out.extend_from_slice(unsigned);
    out
}

fn fixed_coordinate(signed: &[u8]) -> Result<FieldBytes, CryptoError> {
    let magnitude = if signed.len() > COORDINATE_SIZE {
        let (sign, rest) = signed.split_at(signed.len() - COORDINATE_SIZE);
        if sign.iter().any(|&b| b != 0) {
            return Err(CryptoError::InvalidPublicKey);
        }
        rest
    } else {
        signed
    };
    let mut out = FieldBytes::default();
    out[COORDINATE_SIZE - magnitude.len()..].copy_from_slice(magnitude);
    Ok(out)
}
