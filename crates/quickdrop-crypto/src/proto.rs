//! Wire messages for the UKEY2 handshake and the SecureMessage envelope.
//!
//! Field numbers match the `securegcm` and `securemessage` protobuf packages, so the
//! structs interoperate byte-for-byte with other Quick Share implementations.

use prost::Message;

pub use ukey2_alert::AlertType;
pub use ukey2_message::Type as Ukey2MessageType;

// ============ UKEY2 ============

/// Outer envelope for every handshake message
#[derive(Clone, PartialEq, Message)]
pub struct Ukey2Message {
    /// Which handshake step `message_data` holds
    #[prost(enumeration = "ukey2_message::Type", optional, tag = "1")]
    pub message_type: Option<i32>,
    /// Serialized inner message
    #[prost(bytes = "vec", optional, tag = "2")]
    pub message_data: Option<Vec<u8>>,
}

/// Nested types for [`Ukey2Message`]
pub mod ukey2_message {
    /// Handshake step
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        /// Never sent
        UnknownDoNotUse = 0,
        /// Handshake abort
        Alert = 1,
        /// Initiator hello with cipher commitment
        ClientInit = 2,
        /// Responder hello with public key
        ServerInit = 3,
        /// Initiator public key
        ClientFinish = 4,
    }
}

/// Sent instead of the next handshake step when validation fails
#[derive(Clone, PartialEq, Message)]
pub struct Ukey2Alert {
    /// Failure class
    #[prost(enumeration = "ukey2_alert::AlertType", optional, tag = "1")]
    pub r#type: Option<i32>,
    /// Free-form detail
    #[prost(string, optional, tag = "2")]
    pub error_message: Option<String>,
}

/// Nested types for [`Ukey2Alert`]
pub mod ukey2_alert {
    /// Handshake failure classes
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum AlertType {
        /// Outer message could not be parsed
        BadMessage = 1,
        /// Message type unexpected at this step
        BadMessageType = 2,
        /// Message type valid but out of order
        IncorrectMessage = 3,
        /// Inner message could not be parsed
        BadMessageData = 4,
        /// Unsupported protocol version
        BadVersion = 100,
        /// Random field has the wrong length
        BadRandom = 101,
        /// No acceptable handshake cipher
        BadHandshakeCipher = 102,
        /// Unsupported next protocol
        BadNextProtocol = 103,
        /// Public key could not be parsed
        BadPublicKey = 104,
        /// Local failure
        InternalError = 200,
    }
}

/// Handshake cipher suites
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Ukey2HandshakeCipher {
    /// Placeholder
    Reserved = 0,
    /// NIST P-256 with SHA-512 commitments
    P256Sha512 = 100,
    /// Curve25519 with SHA-512 commitments
    Curve25519Sha512 = 200,
}

/// Initiator hello
#[derive(Clone, PartialEq, Message)]
pub struct Ukey2ClientInit {
    /// Protocol version, always 1
    #[prost(int32, optional, tag = "1")]
    pub version: Option<i32>,
    /// 32 random bytes
    #[prost(bytes = "vec", optional, tag = "2")]
    pub random: Option<Vec<u8>>,
    /// One commitment per offered cipher
    #[prost(message, repeated, tag = "3")]
    pub cipher_commitments: Vec<ukey2_client_init::CipherCommitment>,
    /// Protocol to run after the handshake
    #[prost(string, optional, tag = "4")]
    pub next_protocol: Option<String>,
}

/// Nested types for [`Ukey2ClientInit`]
pub mod ukey2_client_init {
    /// Hash of the ClientFinish the initiator will send for `handshake_cipher`
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct CipherCommitment {
        /// Cipher the commitment applies to
        #[prost(enumeration = "super::Ukey2HandshakeCipher", optional, tag = "1")]
        pub handshake_cipher: Option<i32>,
        /// SHA-512 of the serialized ClientFinish message
        #[prost(bytes = "vec", optional, tag = "2")]
        pub commitment: Option<Vec<u8>>,
    }
}

/// Responder hello
#[derive(Clone, PartialEq, Message)]
pub struct Ukey2ServerInit {
    /// Protocol version, always 1
    #[prost(int32, optional, tag = "1")]
    pub version: Option<i32>,
    /// 32 random bytes
    #[prost(bytes = "vec", optional, tag = "2")]
    pub random: Option<Vec<u8>>,
    /// Cipher picked from the initiator's commitments
    #[prost(enumeration = "Ukey2HandshakeCipher", optional, tag = "3")]
    pub handshake_cipher: Option<i32>,
    /// Serialized [`GenericPublicKey`]
    #[prost(bytes = "vec", optional, tag = "4")]
    pub public_key: Option<Vec<u8>>,
}

/// Initiator's final handshake message
#[derive(Clone, PartialEq, Message)]
pub struct Ukey2ClientFinished {
    /// Serialized [`GenericPublicKey`]
    #[prost(bytes = "vec", optional, tag = "1")]
    pub public_key: Option<Vec<u8>>,
}

// ============ Public Keys ============

/// Public key algorithm
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PublicKeyType {
    /// NIST P-256
    EcP256 = 1,
    /// RSA 2048
    Rsa2048 = 2,
    /// Diffie-Hellman 2048 MODP group
    Dh2048Modp = 3,
}

/// Affine P-256 point, coordinates as two's-complement big-endian integers
#[derive(Clone, PartialEq, Message)]
pub struct EcP256PublicKey {
    /// X coordinate
    #[prost(bytes = "vec", required, tag = "1")]
    pub x: Vec<u8>,
    /// Y coordinate
    #[prost(bytes = "vec", required, tag = "2")]
    pub y: Vec<u8>,
}

/// Algorithm-tagged public key
#[derive(Clone, PartialEq, Message)]
pub struct GenericPublicKey {
    /// Key algorithm
    #[prost(enumeration = "PublicKeyType", required, tag = "1")]
    pub r#type: i32,
    /// Present when `type` is `EcP256`
    #[prost(message, optional, tag = "2")]
    pub ec_p256_public_key: Option<EcP256PublicKey>,
}

// ============ SecureMessage ============

/// Signature schemes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SigScheme {
    /// HMAC-SHA256 with a shared key
    HmacSha256 = 1,
    /// ECDSA over P-256
    EcdsaP256Sha256 = 2,
    /// RSA-2048 PKCS#1
    Rsa2048Sha256 = 3,
}

/// Encryption schemes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum EncScheme {
    /// Signed only
    None = 1,
    /// AES-256-CBC with PKCS7 padding
    Aes256Cbc = 2,
}

/// Signed envelope
#[derive(Clone, PartialEq, Message)]
pub struct SecureMessage {
    /// Serialized [`HeaderAndBody`]
    #[prost(bytes = "vec", required, tag = "1")]
    pub header_and_body: Vec<u8>,
    /// MAC over `header_and_body`
    #[prost(bytes = "vec", required, tag = "2")]
    pub signature: Vec<u8>,
}

/// Cleartext header of a SecureMessage
#[derive(Clone, PartialEq, Message)]
pub struct Header {
    /// How `signature` was produced
    #[prost(enumeration = "SigScheme", required, tag = "1")]
    pub signature_scheme: i32,
    /// How `body` was encrypted
    #[prost(enumeration = "EncScheme", required, tag = "2")]
    pub encryption_scheme: i32,
    /// Unused by this profile
    #[prost(bytes = "vec", optional, tag = "3")]
    pub verification_key_id: Option<Vec<u8>>,
    /// Unused by this profile
    #[prost(bytes = "vec", optional, tag = "4")]
    pub decryption_key_id: Option<Vec<u8>>,
    /// CBC initialisation vector
    #[prost(bytes = "vec", optional, tag = "5")]
    pub iv: Option<Vec<u8>>,
    /// Serialized [`GcmMetadata`]
    #[prost(bytes = "vec", optional, tag = "6")]
    pub public_metadata: Option<Vec<u8>>,
    /// Unused by this profile
    #[prost(uint32, optional, tag = "7")]
    pub associated_data_length: Option<u32>,
}

/// Header plus ciphertext, the unit covered by the signature
#[derive(Clone, PartialEq, Message)]
pub struct HeaderAndBody {
    /// Cleartext header
    #[prost(message, required, tag = "1")]
    pub header: Header,
    /// Ciphertext
    #[prost(bytes = "vec", required, tag = "2")]
    pub body: Vec<u8>,
}

/// `securegcm.Type` values relevant to this profile
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum GcmMessageType {
    /// Enrollment
    Enrollment = 0,
    /// Tickle
    Tickle = 1,
    /// Device-to-device responder hello
    DeviceToDeviceResponderHelloPayload = 12,
    /// Device-to-device application message
    DeviceToDeviceMessage = 13,
}

/// Public metadata carried in every SecureMessage header
#[derive(Clone, PartialEq, Message)]
pub struct GcmMetadata {
    /// Message class
    #[prost(enumeration = "GcmMessageType", required, tag = "1")]
    pub r#type: i32,
    /// Metadata version
    #[prost(int32, optional, tag = "2")]
    pub version: Option<i32>,
}

/// Sequenced plaintext inside the encrypted body
#[derive(Clone, PartialEq, Message)]
pub struct DeviceToDeviceMessage {
    /// Inner protocol frame
    #[prost(bytes = "vec", optional, tag = "1")]
    pub message: Option<Vec<u8>>,
    /// Per-direction counter, starting at 1
    #[prost(int32, optional, tag = "2")]
    pub sequence_number: Option<i32>,
}

impl Ukey2Message {
    /// Wrap an inner handshake message.
    #[must_use]
    pub fn wrap(message_type: Ukey2MessageType, inner: &impl Message) -> Self {
        Self {
            message_type: Some(message_type as i32),
            message_data: Some(inner.encode_to_vec()),
        }
    }

    /// Serialized alert frame for `alert`.
    #[must_use]
    pub fn alert(alert: AlertType) -> Vec<u8> {
        let body = Ukey2Alert {
            r#type: Some(alert as i32),
            error_message: None,
        };
        Self::wrap(Ukey2MessageType::Alert, &body).encode_to_vec()
    }
}
