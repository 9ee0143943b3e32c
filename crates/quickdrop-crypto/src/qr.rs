//! QR-code pairing.
//!
//! The receiver shows a QR code carrying an ephemeral public key. Both sides derive an
//! advertising token and a name key from that key material:
//!
//! - a phone that is visible advertises the raw token, matched by equality;
//! - a hidden phone advertises `nonce ‖ AES-GCM(name, aad = token)`, which only a device
//!   holding the QR key material can open.
//!
//! Records shorter than [`SEALED_RECORD_MIN_LEN`] are tokens, longer ones are sealed names.

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes128Gcm, KeyInit, Nonce};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use zeroize::Zeroizing;

use crate::CryptoError;
use crate::encoding::base64url_encode;
use crate::hash::hkdf;
use crate::keys::EphemeralKeyPair;
use crate::random::random_array;

/// Prefix of the URL encoded into the QR code
pub const QR_URL_PREFIX: &str = "https://quickshare.google/qrcode#key=";

/// Advertising token length
pub const ADVERTISING_TOKEN_SIZE: usize = 16;

/// Records at least this long are sealed names (12-byte nonce + 16-byte tag)
pub const SEALED_RECORD_MIN_LEN: usize = 28;

const NONCE_SIZE: usize = 12;
const NAME_KEY_SIZE: usize = 16;

/// Outcome of matching an advertised QR record against local key material
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrMatch {
    /// Peer advertises the same token
    Token,
    /// Peer is hidden and sealed this one-time device name
    SealedName(String),
    /// Short record that does not match
    NoMatch,
}

/// Key material shown in the QR code and the secrets derived from it
pub struct QrCodeKeys {
    key_material: Vec<u8>,
    advertising_token: [u8; ADVERTISING_TOKEN_SIZE],
    name_key: Zeroizing<[u8; NAME_KEY_SIZE]>,
}

impl QrCodeKeys {
    /// Generate keys from a fresh ephemeral P-256 key.
    ///
    /// Key material is `[0x00, 0x00] ‖ SEC1-compressed public key`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyDerivationFailed`] if HKDF fails.
    pub fn generate() -> Result<Self, CryptoError> {
        let pair = EphemeralKeyPair::generate();
        let compressed = pair.public_key().to_encoded_point(true);
        let mut key_material = vec![0x00, 0x00];
        key_material.extend_from_slice(compressed.as_bytes());
        Self::from_key_material(key_material)
    }

    /// Derive token and name key from key material read out of a QR code.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyDerivationFailed`] if HKDF fails.
    pub fn from_key_material(key_material: Vec<u8>) -> Result<Self, CryptoError> {
        let token = hkdf(&[], &key_material, b"advertisingContext", ADVERTISING_TOKEN_SIZE)?;
        let name = hkdf(&[], &key_material, b"encryptionKey", NAME_KEY_SIZE)?;

        let mut advertising_token = [0u8; ADVERTISING_TOKEN_SIZE];
        advertising_token.copy_from_slice(&token);
        let mut name_key = Zeroizing::new([0u8; NAME_KEY_SIZE]);
        name_key.copy_from_slice(&name);

        Ok(Self {
            key_material,
            advertising_token,
            name_key,
        })
    }

    /// Raw key material.
    #[must_use]
    pub fn key_material(&self) -> &[u8] {
        &self.key_material
    }

    /// URL to render as a QR code.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{QR_URL_PREFIX}{}", base64url_encode(&self.key_material))
    }

    /// Token published in the advertisement TLV.
    #[must_use]
    pub fn advertising_token(&self) -> &[u8; ADVERTISING_TOKEN_SIZE] {
        &self.advertising_token
    }

    /// Seal a device name the way a hidden scanning device does.
    ///
    /// # Errors
    ///
    /// Returns an error if the CSPRNG or AES-GCM fails.
    pub fn seal_name(&self, name: &str) -> Result<Vec<u8>, CryptoError> {
        let nonce: [u8; NONCE_SIZE] = random_array()?;
        let cipher = self.cipher()?;
        let sealed = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: name.as_bytes(),
                    aad: &self.advertising_token,
                },
            )
            .map_err(|_| CryptoError::invalid_message("AES-GCM seal failed"))?;
        let mut record = nonce.to_vec();
        record.extend_from_slice(&sealed);
        Ok(record)
    }

    /// Match an advertised QR record.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] if a sealed record does not open with
    /// these keys, or [`CryptoError::InvalidMessage`] if the opened name is not UTF-8.
    pub fn match_record(&self, record: &[u8]) -> Result<QrMatch, CryptoError> {
        if record.len() < SEALED_RECORD_MIN_LEN {
            return Ok(if record == self.advertising_token.as_slice() {
                QrMatch::Token
            } else {
                QrMatch::NoMatch
            });
        }

        let (nonce, sealed) = record.split_at(NONCE_SIZE);
        let name = self
            .cipher()?
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: &self.advertising_token,
                },
            )
            .map_err(|_| CryptoError::DecryptionFailed)?;
        String::from_utf8(name)
            .map(QrMatch::SealedName)
            .map_err(|_| CryptoError::invalid_message("sealed name is not UTF-8"))
    }

    fn cipher(&self) -> Result<Aes128Gcm, CryptoError> {
        Aes128Gcm::new_from_slice(self.name_key.as_slice()).map_err(|_| {
            CryptoError::InvalidKeyLength {
                expected: NAME_KEY_SIZE,
                actual: self.name_key.len(),
            }
        })
    }
}
