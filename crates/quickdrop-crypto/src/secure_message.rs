//! SecureMessage envelope: AES-256-CBC then HMAC-SHA256, with sequence numbers.
//!
//! Every post-handshake frame travels as
//! `SecureMessage { HeaderAndBody { Header, AES(DeviceToDeviceMessage) }, HMAC }`.
//! Sequence numbers start at 1 in each direction and must advance by exactly one.

use hmac::{Hmac, Mac};
use libaes::Cipher;
use prost::Message;
use sha2::Sha256;

use crate::error::CryptoError;
use crate::proto::{
    DeviceToDeviceMessage, EncScheme, GcmMessageType, GcmMetadata, Header, HeaderAndBody,
    SecureMessage, SigScheme,
};
use crate::random::random_array;
use crate::{IV_SIZE, SessionKeys};

type HmacSha256 = Hmac<Sha256>;

/// Encrypting/decrypting state for one connection.
///
/// Owns the session keys; they are zeroized when the channel is dropped.
pub struct SecureChannel {
    keys: SessionKeys,
    send_seq: i32,
    recv_seq: i32,
}

impl SecureChannel {
    /// Create a channel from freshly derived keys.
    #[must_use]
    pub fn new(keys: SessionKeys) -> Self {
        Self {
            keys,
            send_seq: 0,
            recv_seq: 0,
        }
    }

    /// Sequence number of the last message sealed.
    #[must_use]
    pub fn send_sequence(&self) -> i32 {
        self.send_seq
    }

    /// Sequence number of the last message accepted.
    #[must_use]
    pub fn recv_sequence(&self) -> i32 {
        self.recv_seq
    }

    /// Wrap `plaintext` into a serialized SecureMessage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequence counter is exhausted or the CSPRNG fails.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let seq = self
            .send_seq
            .checked_add(1)
            .ok_or(CryptoError::SequenceOverflow)?;

        let inner = DeviceToDeviceMessage {
            message: Some(plaintext.to_vec()),
            sequence_number: Some(seq),
        }
        .encode_to_vec();

        let iv: [u8; IV_SIZE] = random_array()?;
        let body = Cipher::new_256(&self.keys.encrypt_key).cbc_encrypt(&iv, &inner);

        let metadata = GcmMetadata {
            r#type: GcmMessageType::DeviceToDeviceMessage as i32,
            version: Some(1),
        };
        let header_and_body = HeaderAndBody {
            header: Header {
                signature_scheme: SigScheme::HmacSha256 as i32,
                encryption_scheme: EncScheme::Aes256Cbc as i32,
                iv: Some(iv.to_vec()),
                public_metadata: Some(metadata.encode_to_vec()),
                ..Default::default()
            },
            body,
        }
        .encode_to_vec();

        let signature = sign(&self.keys.send_hmac_key, &header_and_body)?;
        self.send_seq = seq;

        Ok(SecureMessage {
            header_and_body,
            signature,
        }
        .encode_to_vec())
    }

    /// Verify, decrypt and sequence-check a serialized SecureMessage.
    ///
    /// Nothing is returned unless every check passes.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::InvalidSignature`] if the HMAC does not match
    /// - [`CryptoError::SequenceMismatch`] if a message was skipped or replayed
    /// - [`CryptoError::MissingField`] / [`CryptoError::InvalidMessage`] on malformed input
    pub fn open(&mut self, frame: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let msg = SecureMessage::decode(frame)
            .map_err(|_| CryptoError::invalid_message("malformed SecureMessage"))?;

        let mut mac = HmacSha256::new_from_slice(&self.keys.recv_hmac_key).map_err(|_| {
            CryptoError::InvalidKeyLength {
                expected: 32,
                actual: self.keys.recv_hmac_key.len(),
            }
        })?;
        mac.update(&msg.header_and_body);
        mac.verify_slice(&msg.signature)
            .map_err(|_| CryptoError::InvalidSignature)?;

        let header_and_body = HeaderAndBody::decode(msg.header_and_body.as_slice())
            .map_err(|_| CryptoError::invalid_message("malformed HeaderAndBody"))?;
        let header = &header_and_body.header;
        if header.encryption_scheme != EncScheme::Aes256Cbc as i32 {
            return Err(CryptoError::invalid_message("unsupported encryption scheme"));
        }
        let iv = header.iv.as_deref().ok_or(CryptoError::MissingField("iv"))?;
        if iv.len() != IV_SIZE {
            return Err(CryptoError::invalid_message("IV must be 16 bytes"));
        }

        let plaintext =
            Cipher::new_256(&self.keys.decrypt_key).cbc_decrypt(iv, &header_and_body.body);
        let inner = DeviceToDeviceMessage::decode(plaintext.as_slice())
            .map_err(|_| CryptoError::invalid_message("malformed DeviceToDeviceMessage"))?;

        let seq = inner
            .sequence_number
            .ok_or(CryptoError::MissingField("sequence_number"))?;
        let expected = self
            .recv_seq
            .checked_add(1)
            .ok_or(CryptoError::SequenceOverflow)?;
        if seq != expected {
            return Err(CryptoError::SequenceMismatch {
                expected,
                actual: seq,
            });
        }
        self.recv_seq = seq;

        inner.message.ok_or(CryptoError::MissingField("message"))
    }
}

fn sign(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: 32,
        actual: key.len(),
    })?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_keys(seed: u8) -> SessionKeys {
        SessionKeys {
            encrypt_key: [seed; 32],
            decrypt_key: [seed.wrapping_add(1); 32],
            send_hmac_key: [seed.wrapping_add(2); 32],
            recv_hmac_key: [seed.wrapping_add(3); 32],
        }
    }

    fn pair() -> (SecureChannel, SecureChannel) {
        let keys = test_keys(7);
        let peer = keys.mirrored();
        (SecureChannel::new(keys), SecureChannel::new(peer))
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let (mut a, mut b) = pair();
        for msg in [&b"first"[..], &b""[..], &[0u8; 1000][..]] {
            let sealed = a.seal(msg).unwrap();
            assert_eq!(b.open(&sealed).unwrap(), msg);
        }
        assert_eq!(a.send_sequence(), 3);
        assert_eq!(b.recv_sequence(), 3);
    }

    #[test]
    fn test_tampered_signature() {
        let (mut a, mut b) = pair();
        let sealed = a.seal(b"payload").unwrap();
        let mut msg = SecureMessage::decode(sealed.as_slice()).unwrap();
        msg.signature[0] ^= 0x01;
        let tampered = msg.encode_to_vec();
        assert!(matches!(
            b.open(&tampered),
            Err(CryptoError::InvalidSignature)
        ));
        // Rejected messages do not advance the counter
        assert_eq!(b.recv_sequence(), 0);
    }

    #[test]
    fn test_wrong_keys() {
        let mut a = SecureChannel::new(test_keys(1));
        let mut b = SecureChannel::new(test_keys(50).mirrored());
        let sealed = a.seal(b"payload").unwrap();
        assert!(b.open(&sealed).is_err());
    }

    #[test]
    fn test_skipped_sequence() {
        let (mut a, mut b) = pair();
        let _lost = a.seal(b"one").unwrap();
        let second = a.seal(b"two").unwrap();
        assert!(matches!(
            b.open(&second),
            Err(CryptoError::SequenceMismatch {
                expected: 1,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_replay_rejected() {
        let (mut a, mut b) = pair();
        let sealed = a.seal(b"once").unwrap();
        b.open(&sealed).unwrap();
        assert!(b.open(&sealed).is_err());
    }

    #[test]
    fn test_header_fields() {
        let (mut a, _) = pair();
        let sealed = a.seal(b"x").unwrap();
        let msg = SecureMessage::decode(sealed.as_slice()).unwrap();
        let hb = HeaderAndBody::decode(msg.header_and_body.as_slice()).unwrap();
        assert_eq!(hb.header.iv.as_ref().map(Vec::len), Some(IV_SIZE));
        assert_eq!(hb.header.encryption_scheme, EncScheme::Aes256Cbc as i32);
        let meta = GcmMetadata::decode(hb.header.public_metadata()).unwrap();
        assert_eq!(meta.r#type, GcmMessageType::DeviceToDeviceMessage as i32);
        assert_eq!(meta.version, Some(1));
        // CBC output is block aligned
        assert_eq!(hb.body.len() % 16, 0);
    }
}
