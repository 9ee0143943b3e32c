//! # QuickDrop Crypto
//!
//! Cryptographic layer of the Quick Share wire protocol.
//!
//! This crate provides:
//! - Binary codec helpers (URL-safe base64, OS randomness, HKDF, PIN derivation)
//! - P-256 ephemeral keys and their `GenericPublicKey` wire encoding
//! - The UKEY2 handshake in both the initiator and responder roles
//! - The SecureMessage encrypt-then-MAC envelope with sequence checking
//! - QR-code pairing tokens and sealed device names
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm |
//! |----------|-----------|
//! | Key Exchange | ECDH P-256 |
//! | Commitment | SHA-512 |
//! | KDF | HKDF-SHA256 |
//! | Encryption | AES-256-CBC, PKCS7 |
//! | Authentication | HMAC-SHA256 |
//! | QR name sealing | AES-128-GCM |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod encoding;
pub mod error;
pub mod hash;
pub mod keys;
pub mod pin;
pub mod proto;
pub mod qr;
pub mod random;
pub mod secure_message;
pub mod ukey2;

pub use error::CryptoError;
pub use pin::pin_from_auth_string;
pub use secure_message::SecureChannel;
pub use ukey2::{HandshakeOutcome, Ukey2Initiator, Ukey2Responder};

/// AES-256 / HMAC-SHA256 key size
pub const SESSION_KEY_SIZE: usize = 32;

/// AES-CBC initialisation vector size
pub const IV_SIZE: usize = 16;

/// Role a connection plays in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Side that opened the stream and sends ClientInit
    Initiator,
    /// Side that accepted the stream and answers with ServerInit
    Responder,
}

/// Per-direction keys derived from a completed UKEY2 handshake
#[derive(zeroize::Zeroize, zeroize::ZeroizeOnDrop)]
pub struct SessionKeys {
    /// AES key for outgoing messages
    pub encrypt_key: [u8; SESSION_KEY_SIZE],
    /// AES key for incoming messages
    pub decrypt_key: [u8; SESSION_KEY_SIZE],
    /// HMAC key for outgoing messages
    pub send_hmac_key: [u8; SESSION_KEY_SIZE],
    /// HMAC key for incoming messages
    pub recv_hmac_key: [u8; SESSION_KEY_SIZE],
}

impl SessionKeys {
    /// Keys as seen by the other end of the connection.
    #[must_use]
    pub fn mirrored(&self) -> Self {
        Self {
            encrypt_key: self.decrypt_key,
            decrypt_key: self.encrypt_key,
            send_hmac_key: self.recv_hmac_key,
            recv_hmac_key: self.send_hmac_key,
        }
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}
