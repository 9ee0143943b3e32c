//! Endpoint info record.
//!
//! ```text
//! byte 0      (device_type << 1) | hidden
//! bytes 1-16  random filler
//! byte 17     name length N
//! bytes 18..  N bytes of UTF-8 name
//! then        optional TLVs: type (1) | length (1) | value
//! ```

use quickdrop_crypto::random::fill_random;

use crate::DeviceType;
use crate::error::AdvertisementError;

/// Fixed header size before the name
pub const ENDPOINT_INFO_HEADER_SIZE: usize = 18;

/// Longest name the one-byte length prefix can describe
pub const MAX_NAME_LEN: usize = 255;

/// TLV type carrying a QR advertising token or sealed name
pub const TLV_QR_RECORD: u8 = 1;

const NAME_LEN_OFFSET: usize = 17;
const FILLER_SIZE: usize = 16;

/// Decoded endpoint info
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    /// Device class
    pub device_type: DeviceType,
    /// Visibility bit
    pub hidden: bool,
    /// Device name
    pub name: String,
    /// Value of the QR TLV, if present
    pub qr_record: Option<Vec<u8>>,
}

impl EndpointInfo {
    /// Visible device with no QR record.
    #[must_use]
    pub fn new(name: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            device_type,
            hidden: false,
            name: name.into(),
            qr_record: None,
        }
    }

    /// Attach a QR record (advertising token).
    #[must_use]
    pub fn with_qr_record(mut self, record: Vec<u8>) -> Self {
        self.qr_record = Some(record);
        self
    }

    /// Serialize the record. Names longer than 255 bytes are cut at a character boundary.
    ///
    /// # Errors
    ///
    /// Returns [`AdvertisementError::RandomFailed`] if the filler cannot be generated.
    pub fn encode(&self) -> Result<Vec<u8>, AdvertisementError> {
        let name = truncate_utf8(&self.name, MAX_NAME_LEN);
        let mut out = Vec::with_capacity(ENDPOINT_INFO_HEADER_SIZE + name.len() + 2);

        out.push(((self.device_type as u8) << 1) | u8::from(self.hidden));
        let mut filler = [0u8; FILLER_SIZE];
        fill_random(&mut filler)?;
        out.extend_from_slice(&filler);
        // truncate_utf8 bounds the length to 255
        out.push(name.len() as u8);
        out.extend_from_slice(name.as_bytes());

        if let Some(record) = &self.qr_record {
            let value = &record[..record.len().min(u8::MAX as usize)];
            out.push(TLV_QR_RECORD);
            out.push(value.len() as u8);
            out.extend_from_slice(value);
        }
        Ok(out)
    }

    /// Parse a record. Never reads past the declared name or a truncated TLV.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is short, the name overruns the buffer or
    /// the name is not UTF-8.
    pub fn decode(data: &[u8]) -> Result<Self, AdvertisementError> {
        if data.len() < ENDPOINT_INFO_HEADER_SIZE {
            return Err(AdvertisementError::TooShort {
                expected: ENDPOINT_INFO_HEADER_SIZE,
                actual: data.len(),
            });
        }

        let name_len = data[NAME_LEN_OFFSET] as usize;
        let body = &data[ENDPOINT_INFO_HEADER_SIZE..];
        if body.len() < name_len {
            return Err(AdvertisementError::NameOverrun {
                declared: name_len,
                available: body.len(),
            });
        }
        let (name, mut tlvs) = body.split_at(name_len);
        let name = std::str::from_utf8(name)
            .map_err(|_| AdvertisementError::InvalidName)?
            .to_string();

        let mut qr_record = None;
        while let [kind, len, rest @ ..] = tlvs {
            let len = *len as usize;
            if rest.len() < len {
                break;
            }
            let (value, next) = rest.split_at(len);
            if *kind == TLV_QR_RECORD {
                qr_record = Some(value.to_vec());
            }
            tlvs = next;
        }

        Ok(Self {
            device_type: DeviceType::from_raw((data[0] & 7) >> 1),
            hidden: data[0] & 1 != 0,
            name,
            qr_record,
        })
    }
}

fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
