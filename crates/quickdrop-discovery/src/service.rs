//! Service instance names and endpoint IDs.

use std::fmt;

use quickdrop_crypto::encoding::{base64url_decode, base64url_encode};
use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::endpoint_info::EndpointInfo;
use crate::error::AdvertisementError;
use crate::TXT_ENDPOINT_INFO_KEY;

/// Length of an endpoint ID
pub const ENDPOINT_ID_LEN: usize = 4;

/// Leading PCP byte of the service name
pub const PCP: u8 = 0x23;

/// First three bytes of SHA-256("NearbySharing")
pub const SERVICE_ID_HASH: [u8; 3] = [0xFC, 0x9F, 0x5E];

const SERVICE_NAME_LEN: usize = 10;

/// Four alphanumeric characters identifying an advertising endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(String);

impl EndpointId {
    /// Fresh random ID for this process
    #[must_use]
    pub fn random() -> Self {
        let id = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(ENDPOINT_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    /// Validate raw bytes as an endpoint ID.
    ///
    /// # Errors
    ///
    /// Returns [`AdvertisementError::InvalidEndpointId`] unless the input is exactly
    /// four ASCII alphanumerics.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AdvertisementError> {
        if bytes.len() != ENDPOINT_ID_LEN || !bytes.iter().all(u8::is_ascii_alphanumeric) {
            return Err(AdvertisementError::InvalidEndpointId);
        }
        // all-ASCII input is valid UTF-8
        let id = String::from_utf8_lossy(bytes).into_owned();
        Ok(Self(id))
    }

    /// The ID as text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for EndpointId {
    type Err = AdvertisementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}

/// Build the mDNS instance name: base64url of
/// `[PCP, id[0..4], 0xFC, 0x9F, 0x5E, 0x00, 0x00]`.
#[must_use]
pub fn encode_service_name(id: &EndpointId) -> String {
    let mut raw = Vec::with_capacity(SERVICE_NAME_LEN);
    raw.push(PCP);
    raw.extend_from_slice(id.as_str().as_bytes());
    raw.extend_from_slice(&SERVICE_ID_HASH);
    raw.extend_from_slice(&[0, 0]);
    base64url_encode(&raw)
}

/// Recover the endpoint ID from an mDNS instance name.
///
/// # Errors
///
/// Returns [`AdvertisementError::ForeignService`] if the name is not a Quick Share
/// service, or [`AdvertisementError::InvalidEndpointId`] if the ID bytes are not
/// alphanumeric.
pub fn decode_service_name(name: &str) -> Result<EndpointId, AdvertisementError> {
    let raw = base64url_decode(name)?;
    if raw.len() < SERVICE_NAME_LEN || raw[0] != PCP || raw[5..8] != SERVICE_ID_HASH {
        return Err(AdvertisementError::ForeignService);
    }
    EndpointId::from_bytes(&raw[1..5])
}

/// TXT entry to publish alongside the service.
///
/// # Errors
///
/// Returns an error if the endpoint info cannot be encoded.
pub fn txt_record(info: &EndpointInfo) -> Result<(String, String), AdvertisementError> {
    Ok((
        TXT_ENDPOINT_INFO_KEY.to_string(),
        base64url_encode(&info.encode()?),
    ))
}

/// Decode the value of the `n` TXT entry.
///
/// # Errors
///
/// Returns an error if the value is not base64url or not a valid endpoint info.
pub fn parse_txt_value(value: &str) -> Result<EndpointInfo, AdvertisementError> {
    EndpointInfo::decode(&base64url_decode(value)?)
}
