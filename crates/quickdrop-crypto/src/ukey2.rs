//! UKEY2 handshake (P-256 / SHA-512 profile).
//!
//! ```text
//! Initiator                                    Responder
//!   ClientInit { random, commit(ClientFinish) } ──►
//!                               ◄── ServerInit { random, public key }
//!   ClientFinish { public key }               ──►
//! ```
//!
//! Both sides then run the same key schedule over the two hello messages:
//!
//! - `master = SHA-256(ECDH x)`
//! - `auth = HKDF(master, "UKEY2 v1 auth", ClientInit ‖ ServerInit)` → PIN
//! - `next = HKDF(master, "UKEY2 v1 next", ClientInit ‖ ServerInit)`
//! - `d2d_{client,server} = HKDF(next, D2D_SALT, "client" | "server")`
//! - `{enc,mac}_{client,server} = HKDF(d2d, SHA-256("SecureMessage"), "ENC:2" | "SIG:1")`
//!
//! Messages are handled as raw bytes because the transcript hashes cover the exact
//! serialized form.

use prost::Message;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::hash::{hkdf_32, sha256, sha512};
use crate::keys::{EphemeralKeyPair, decode_public_key};
use crate::pin::pin_from_auth_string;
use crate::proto::{
    AlertType, GenericPublicKey, Ukey2ClientFinished, Ukey2ClientInit, Ukey2HandshakeCipher,
    Ukey2Message, Ukey2MessageType, Ukey2ServerInit, ukey2_client_init::CipherCommitment,
};
use crate::random::random_vec;
use crate::{Role, SessionKeys};

/// Only supported protocol version
pub const UKEY2_VERSION: i32 = 1;

/// Protocol the handshake negotiates for the session
pub const NEXT_PROTOCOL: &str = "AES_256_CBC-HMAC_SHA256";

/// Length of the random field in both hellos
pub const RANDOM_SIZE: usize = 32;

const AUTH_SALT: &[u8] = b"UKEY2 v1 auth";
const NEXT_SALT: &[u8] = b"UKEY2 v1 next";

/// Salt for the device-to-device stage
const D2D_SALT: [u8; 32] = [
    0x82, 0xAA, 0x55, 0xA0, 0xD3, 0x97, 0xF8, 0x83, 0x46, 0xCA, 0x1C, 0xEE, 0x8D, 0x39, 0x09, 0xB9,
    0x5F, 0x13, 0xFA, 0x7D, 0xEB, 0x1D, 0x4A, 0xB3, 0x83, 0x76, 0xB8, 0x25, 0x6D, 0xA8, 0x55, 0x10,
];

/// Result of a completed handshake
#[derive(Debug)]
pub struct HandshakeOutcome {
    /// Session keys oriented for the local role
    pub keys: SessionKeys,
    /// Four-digit verification code
    pub pin: String,
}

/// Responder half: answers ClientInit, then verifies ClientFinish.
pub struct Ukey2Responder {
    key: EphemeralKeyPair,
    client_init: Option<Vec<u8>>,
    server_init: Option<Vec<u8>>,
    commitment: Option<Vec<u8>>,
}

impl Ukey2Responder {
    /// Create a responder with a fresh ephemeral key.
    #[must_use]
    pub fn new() -> Self {
        Self {
            key: EphemeralKeyPair::generate(),
            client_init: None,
            server_init: None,
            commitment: None,
        }
    }

    /// Validate a ClientInit frame and build the ServerInit reply.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Handshake`] carrying the alert to send on any
    /// validation failure.
    pub fn handle_client_init(&mut self, frame: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let data = unwrap_message(frame, Ukey2MessageType::ClientInit)?;
        let init = Ukey2ClientInit::decode(data.as_slice()).map_err(|_| {
            CryptoError::handshake(AlertType::BadMessageData, "malformed ClientInit")
        })?;

        if init.version != Some(UKEY2_VERSION) {
            return Err(CryptoError::handshake(
                AlertType::BadVersion,
                "unsupported UKEY2 version",
            ));
        }
        if init.random.as_ref().map(Vec::len) != Some(RANDOM_SIZE) {
            return Err(CryptoError::handshake(
                AlertType::BadRandom,
                "ClientInit random has wrong length",
            ));
        }
        let commitment = init
            .cipher_commitments
            .iter()
            .find(|c| c.handshake_cipher == Some(Ukey2HandshakeCipher::P256Sha512 as i32))
            .and_then(|c| c.commitment.clone())
            .ok_or(CryptoError::handshake(
                AlertType::BadHandshakeCipher,
                "no P256_SHA512 commitment",
            ))?;
        if init.next_protocol.as_deref() != Some(NEXT_PROTOCOL) {
            return Err(CryptoError::handshake(
                AlertType::BadNextProtocol,
                "unsupported next protocol",
            ));
        }

        let server_init = Ukey2ServerInit {
            version: Some(UKEY2_VERSION),
            random: Some(random_vec(RANDOM_SIZE)?),
            handshake_cipher: Some(Ukey2HandshakeCipher::P256Sha512 as i32),
            public_key: Some(self.key.generic_public_key().encode_to_vec()),
        };
        let reply = Ukey2Message::wrap(Ukey2MessageType::ServerInit, &server_init).encode_to_vec();

        self.commitment = Some(commitment);
        self.client_init = Some(frame.to_vec());
        self.server_init = Some(reply.clone());
        Ok(reply)
    }

    /// Verify ClientFinish against the commitment and derive session keys.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Handshake`] if the commitment does not match or the
    /// peer key is unusable.
    pub fn handle_client_finish(self, frame: &[u8]) -> Result<HandshakeOutcome, CryptoError> {
        let (Some(commitment), Some(client_init), Some(server_init)) =
            (self.commitment, self.client_init, self.server_init)
        else {
            return Err(CryptoError::handshake(
                AlertType::IncorrectMessage,
                "ClientFinish before ClientInit",
            ));
        };

        if sha512(frame).as_slice() != commitment.as_slice() {
            return Err(CryptoError::handshake(
                AlertType::BadMessage,
                "ClientFinish does not match commitment",
            ));
        }

        let data = unwrap_message(frame, Ukey2MessageType::ClientFinish)?;
        let finish = Ukey2ClientFinished::decode(data.as_slice()).map_err(|_| {
            CryptoError::handshake(AlertType::BadMessageData, "malformed ClientFinish")
        })?;
        let peer = parse_peer_key(finish.public_key.as_deref())?;

        Ok(derive_session(
            Role::Responder,
            &self.key,
            &peer,
            &client_init,
            &server_init,
        ))
    }
}

impl Default for Ukey2Responder {
    fn default() -> Self {
        Self::new()
    }
}

/// Initiator half: commits to its ClientFinish up front.
pub struct Ukey2Initiator {
    key: EphemeralKeyPair,
    client_init: Vec<u8>,
    client_finish: Vec<u8>,
}

impl Ukey2Initiator {
    /// Build ClientInit and the matching ClientFinish.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RandomFailed`] if the OS CSPRNG fails.
    pub fn new() -> Result<Self, CryptoError> {
        let key = EphemeralKeyPair::generate();

        let finish = Ukey2ClientFinished {
            public_key: Some(key.generic_public_key().encode_to_vec()),
        };
        let client_finish =
            Ukey2Message::wrap(Ukey2MessageType::ClientFinish, &finish).encode_to_vec();

        let init = Ukey2ClientInit {
            version: Some(UKEY2_VERSION),
            random: Some(random_vec(RANDOM_SIZE)?),
            cipher_commitments: vec![CipherCommitment {
                handshake_cipher: Some(Ukey2HandshakeCipher::P256Sha512 as i32),
                commitment: Some(sha512(&client_finish).to_vec()),
            }],
            next_protocol: Some(NEXT_PROTOCOL.to_string()),
        };
        let client_init = Ukey2Message::wrap(Ukey2MessageType::ClientInit, &init).encode_to_vec();

        Ok(Self {
            key,
            client_init,
            client_finish,
        })
    }

    /// Serialized ClientInit to send first.
    #[must_use]
    pub fn client_init(&self) -> &[u8] {
        &self.client_init
    }

    /// Validate ServerInit, derive keys, and hand back the ClientFinish to send.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Handshake`] carrying the alert to send on any
    /// validation failure.
    pub fn handle_server_init(
        self,
        frame: &[u8],
    ) -> Result<(HandshakeOutcome, Vec<u8>), CryptoError> {
        let data = unwrap_message(frame, Ukey2MessageType::ServerInit)?;
        let init = Ukey2ServerInit::decode(data.as_slice()).map_err(|_| {
            CryptoError::handshake(AlertType::BadMessageData, "malformed ServerInit")
        })?;

        if init.version != Some(UKEY2_VERSION) {
            return Err(CryptoError::handshake(
                AlertType::BadVersion,
                "unsupported UKEY2 version",
            ));
        }
        if init.random.as_ref().map(Vec::len) != Some(RANDOM_SIZE) {
            return Err(CryptoError::handshake(
                AlertType::BadRandom,
                "ServerInit random has wrong length",
            ));
        }
        if init.handshake_cipher != Some(Ukey2HandshakeCipher::P256Sha512 as i32) {
            return Err(CryptoError::handshake(
                AlertType::BadHandshakeCipher,
                "server picked an unsupported cipher",
            ));
        }
        let peer = parse_peer_key(init.public_key.as_deref())?;

        let outcome = derive_session(
            Role::Initiator,
            &self.key,
            &peer,
            &self.client_init,
            frame,
        );
        Ok((outcome, self.client_finish))
    }
}

/// Check the outer message type and return the inner payload.
fn unwrap_message(frame: &[u8], expected: Ukey2MessageType) -> Result<Vec<u8>, CryptoError> {
    let msg = Ukey2Message::decode(frame)
        .map_err(|_| CryptoError::handshake(AlertType::BadMessage, "malformed Ukey2Message"))?;
    let (Some(message_type), Some(data)) = (msg.message_type, msg.message_data) else {
        return Err(CryptoError::handshake(
            AlertType::BadMessage,
            "Ukey2Message missing type or data",
        ));
    };
    if message_type != expected as i32 {
        return Err(CryptoError::handshake(
            AlertType::BadMessageType,
            "unexpected Ukey2Message type",
        ));
    }
    Ok(data)
}

fn parse_peer_key(encoded: Option<&[u8]>) -> Result<p256::PublicKey, CryptoError> {
    let bad_key = || CryptoError::handshake(AlertType::BadPublicKey, "unusable peer public key");
    let bytes = encoded.ok_or_else(bad_key)?;
    let generic = GenericPublicKey::decode(bytes).map_err(|_| bad_key())?;
    decode_public_key(&generic).map_err(|_| bad_key())
}

/// Run the key schedule over the handshake transcript.
#[must_use]
pub fn derive_session(
    role: Role,
    local: &EphemeralKeyPair,
    peer: &p256::PublicKey,
    client_init: &[u8],
    server_init: &[u8],
) -> HandshakeOutcome {
    let shared = local.diffie_hellman(peer);
    let master = Zeroizing::new(sha256(shared.as_slice()));

    let mut transcript = Vec::with_capacity(client_init.len() + server_init.len());
    transcript.extend_from_slice(client_init);
    transcript.extend_from_slice(server_init);

    let auth = Zeroizing::new(hkdf_32(AUTH_SALT, master.as_slice(), &transcript));
    let next = Zeroizing::new(hkdf_32(NEXT_SALT, master.as_slice(), &transcript));

    let d2d_client = Zeroizing::new(hkdf_32(&D2D_SALT, next.as_slice(), b"client"));
    let d2d_server = Zeroizing::new(hkdf_32(&D2D_SALT, next.as_slice(), b"server"));

    let salt = sha256(b"SecureMessage");
    let client_enc = hkdf_32(&salt, d2d_client.as_slice(), b"ENC:2");
    let client_mac = hkdf_32(&salt, d2d_client.as_slice(), b"SIG:1");
    let server_enc = hkdf_32(&salt, d2d_server.as_slice(), b"ENC:2");
    let server_mac = hkdf_32(&salt, d2d_server.as_slice(), b"SIG:1");

    let keys = match role {
        Role::Responder => SessionKeys {
            encrypt_key: server_enc,
            decrypt_key: client_enc,
            send_hmac_key: server_mac,
            recv_hmac_key: client_mac,
        },
        Role::Initiator => SessionKeys {
            encrypt_key: client_enc,
            decrypt_key: server_enc,
            send_hmac_key: client_mac,
            recv_hmac_key: server_mac,
        },
    };

    HandshakeOutcome {
        keys,
        pin: pin_from_auth_string(auth.as_slice()),
    }
}
