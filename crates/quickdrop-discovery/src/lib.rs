//! # QuickDrop Discovery
//!
//! What goes into, and comes out of, the local-network service advertisement.
//!
//! This crate provides:
//! - The endpoint info record (device type, name, optional QR token TLV)
//! - The 10-byte service name carrying the endpoint ID
//! - A registry of discovered devices fed by an external mDNS browser
//!
//! The mDNS transport itself is not part of this crate. A publisher announces
//! [`SERVICE_TYPE`] under [`service::encode_service_name`] with a single TXT entry
//! [`TXT_ENDPOINT_INFO_KEY`] holding the base64url endpoint info.
//!
//! ## Example
//!
//! ```rust
//! use quickdrop_discovery::{DeviceType, EndpointId, EndpointInfo, service};
//!
//! let id = EndpointId::random();
//! let name = service::encode_service_name(&id);
//! assert_eq!(service::decode_service_name(&name).unwrap(), id);
//!
//! let info = EndpointInfo::new("Workstation", DeviceType::Computer);
//! let record = info.encode().unwrap();
//! assert_eq!(EndpointInfo::decode(&record).unwrap().name, "Workstation");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod endpoint_info;
pub mod error;
pub mod registry;
pub mod service;

pub use endpoint_info::EndpointInfo;
pub use error::AdvertisementError;
pub use registry::{DeviceRegistry, DiscoveredDevice, DiscoveryEvent, RegistryChange, ServiceRecord};
pub use service::EndpointId;

/// mDNS service type for Quick Share
pub const SERVICE_TYPE: &str = "_FC9F5ED42C8A._tcp";

/// TXT key holding the endpoint info record
pub const TXT_ENDPOINT_INFO_KEY: &str = "n";

/// Device class advertised in the endpoint info record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DeviceType {
    /// Unspecified
    #[default]
    Unknown = 0,
    /// Phone
    Phone = 1,
    /// Tablet
    Tablet = 2,
    /// Laptop or desktop
    Computer = 3,
}

impl DeviceType {
    /// Map the 2-bit wire value; anything out of range is `Unknown`.
    #[must_use]
    pub fn from_raw(value: u8) -> Self {
        match value {
            1 => Self::Phone,
            2 => Self::Tablet,
            3 => Self::Computer,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Phone => write!(f, "phone"),
            Self::Tablet => write!(f, "tablet"),
            Self::Computer => write!(f, "computer"),
        }
    }
}

/// A peer as seen by the transfer engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDeviceInfo {
    /// Display name (UTF-8, at most 255 bytes)
    pub name: String,
    /// Device class
    pub device_type: DeviceType,
    /// Endpoint ID, known once the device was discovered
    pub id: Option<String>,
    /// QR record advertised by the device, if any
    pub qr_record: Option<Vec<u8>>,
}

impl From<EndpointInfo> for RemoteDeviceInfo {
    fn from(info: EndpointInfo) -> Self {
        Self {
            name: info.name,
            device_type: info.device_type,
            id: None,
            qr_record: info.qr_record,
        }
    }
}
