//! Registry of devices found by the mDNS browser.
//!
//! The browser itself lives outside this crate. It feeds [`DiscoveryEvent`]s in and
//! receives a [`RegistryChange`] back whenever the visible set changes.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use quickdrop_crypto::qr::{QrCodeKeys, QrMatch};

use crate::error::AdvertisementError;
use crate::service::{EndpointId, decode_service_name, parse_txt_value};
use crate::{RemoteDeviceInfo, TXT_ENDPOINT_INFO_KEY};

/// A resolved mDNS service instance
#[derive(Debug, Clone, Default)]
pub struct ServiceRecord {
    /// Instance name
    pub name: String,
    /// TXT entries
    pub txt: HashMap<String, String>,
    /// Resolved addresses
    pub addresses: Vec<IpAddr>,
    /// Service port
    pub port: u16,
}

/// Browser output
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// Service resolved
    Found(ServiceRecord),
    /// Service withdrawn
    Lost {
        /// Instance name
        name: String,
    },
}

/// A device currently visible on the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Endpoint ID from the service name
    pub id: EndpointId,
    /// Name and type from the endpoint info
    pub info: RemoteDeviceInfo,
    /// Reachable non-loopback addresses
    pub addresses: Vec<SocketAddr>,
    /// Device advertised the local QR token or a name sealed for it
    pub qr_paired: bool,
}

/// Change in the visible device set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    /// New or updated device
    Added(DiscoveredDevice),
    /// Device went away
    Removed(EndpointId),
}

/// Devices keyed by endpoint ID
#[derive(Default)]
pub struct DeviceRegistry {
    devices: DashMap<EndpointId, DiscoveredDevice>,
    qr_keys: RwLock<Option<Arc<QrCodeKeys>>>,
}

impl DeviceRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or clear) the QR keys used to classify advertised QR records.
    pub fn set_qr_keys(&self, keys: Option<Arc<QrCodeKeys>>) {
        *self.qr_keys.write().unwrap_or_else(PoisonError::into_inner) = keys;
    }

    /// Apply one browser event.
    ///
    /// Records that fail to decode, resolve only to loopback addresses or carry a
    /// QR record that does not match the local keys are skipped with a log line.
    pub fn apply(&self, event: DiscoveryEvent) -> Option<RegistryChange> {
        match event {
            DiscoveryEvent::Found(record) => match self.classify(&record) {
                Ok(Some(device)) => {
                    match self.devices.entry(device.id.clone()) {
                        Entry::Occupied(entry) if *entry.get() == device => return None,
                        Entry::Occupied(mut entry) => {
                            entry.insert(device.clone());
                        }
                        Entry::Vacant(entry) => {
                            entry.insert(device.clone());
                        }
                    }
                    tracing::debug!(
                        endpoint_id = %device.id,
                        name = %device.info.name,
                        device_type = %device.info.device_type,
                        qr_paired = device.qr_paired,
                        "Device discovered"
                    );
                    Some(RegistryChange::Added(device))
                }
                Ok(None) => None,
                Err(e) => {
                    tracing::debug!(service = %record.name, error = %e, "Ignoring advertisement");
                    None
                }
            },
            DiscoveryEvent::Lost { name } => {
                let id = decode_service_name(&name).ok()?;
                self.devices.remove(&id).map(|(id, _)| {
                    tracing::debug!(endpoint_id = %id, "Device lost");
                    RegistryChange::Removed(id)
                })
            }
        }
    }

    fn classify(
        &self,
        record: &ServiceRecord,
    ) -> Result<Option<DiscoveredDevice>, AdvertisementError> {
        let id = decode_service_name(&record.name)?;
        let value = record
            .txt
            .get(TXT_ENDPOINT_INFO_KEY)
            .ok_or(AdvertisementError::MissingEndpointInfo)?;
        let endpoint_info = parse_txt_value(value)?;

        let addresses: Vec<SocketAddr> = record
            .addresses
            .iter()
            .filter(|ip| !ip.is_loopback())
            .map(|ip| SocketAddr::new(*ip, record.port))
            .collect();
        if addresses.is_empty() && !record.addresses.is_empty() {
            tracing::trace!(endpoint_id = %id, "Skipping loopback-only service");
            return Ok(None);
        }

        let mut info = RemoteDeviceInfo::from(endpoint_info);
        info.id = Some(id.to_string());

        let mut qr_paired = false;
        let keys = self
            .qr_keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let (Some(keys), Some(qr_record)) = (keys, info.qr_record.as_deref()) {
            match keys.match_record(qr_record) {
                Ok(QrMatch::Token) => qr_paired = true,
                Ok(QrMatch::SealedName(name)) => {
                    info.name = name;
                    qr_paired = true;
                }
                Ok(QrMatch::NoMatch) => {
                    tracing::debug!(endpoint_id = %id, "QR record does not match local code");
                    return Ok(None);
                }
                Err(e) => {
                    tracing::warn!(endpoint_id = %id, error = %e, "Failed to open sealed device name");
                    return Ok(None);
                }
            }
        }

        Ok(Some(DiscoveredDevice {
            id,
            info,
            addresses,
            qr_paired,
        }))
    }

    /// Look up a device by endpoint ID
    #[must_use]
    pub fn get(&self, id: &EndpointId) -> Option<DiscoveredDevice> {
        self.devices.get(id).map(|d| d.clone())
    }

    /// Snapshot of all visible devices
    #[must_use]
    pub fn devices(&self) -> Vec<DiscoveredDevice> {
        self.devices.iter().map(|d| d.value().clone()).collect()
    }

    /// Number of visible devices
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no devices are visible
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Forget every device (discovery stopped)
    pub fn clear(&self) {
        self.devices.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{encode_service_name, txt_record};
    use crate::{DeviceType, EndpointInfo};
    use std::net::Ipv4Addr;

    fn record(id: &str, info: &EndpointInfo, ip: IpAddr) -> ServiceRecord {
        let (key, value) = txt_record(info).unwrap();
        ServiceRecord {
            name: encode_service_name(&id.parse().unwrap()),
            txt: HashMap::from([(key, value)]),
            addresses: vec![ip],
            port: 5200,
        }
    }

    fn lan() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))
    }

    #[test]
    fn test_add_and_remove() {
        let registry = DeviceRegistry::new();
        let info = EndpointInfo::new("Phone", DeviceType::Phone);
        let rec = record("ABCD", &info, lan());

        let change = registry.apply(DiscoveryEvent::Found(rec.clone())).unwrap();
        let RegistryChange::Added(device) = change else {
            panic!("expected Added");
        };
        assert_eq!(device.info.name, "Phone");
        assert_eq!(device.info.id.as_deref(), Some("ABCD"));
        assert_eq!(device.addresses, vec![SocketAddr::new(lan(), 5200)]);
        assert_eq!(registry.len(), 1);

        let removed = registry.apply(DiscoveryEvent::Lost { name: rec.name }).unwrap();
        assert_eq!(removed, RegistryChange::Removed("ABCD".parse().unwrap()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_found_is_silent() {
        let registry = DeviceRegistry::new();
        let rec = record("ABCD", &EndpointInfo::new("Phone", DeviceType::Phone), lan());
        assert!(registry.apply(DiscoveryEvent::Found(rec.clone())).is_some());
        assert!(registry.apply(DiscoveryEvent::Found(rec)).is_none());
    }

    #[test]
    fn test_loopback_only_skipped() {
        let registry = DeviceRegistry::new();
        let rec = record(
            "ABCD",
            &EndpointInfo::new("Me", DeviceType::Computer),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
        );
        assert!(registry.apply(DiscoveryEvent::Found(rec)).is_none());
    }

    #[test]
    fn test_bad_records_ignored() {
        let registry = DeviceRegistry::new();
        let mut rec = record("ABCD", &EndpointInfo::new("x", DeviceType::Phone), lan());
        rec.txt.clear();
        assert!(registry.apply(DiscoveryEvent::Found(rec)).is_none());

        let foreign = ServiceRecord {
            name: "printer".into(),
            ..ServiceRecord::default()
        };
        assert!(registry.apply(DiscoveryEvent::Found(foreign)).is_none());
        assert!(registry.apply(DiscoveryEvent::Lost { name: "printer".into() }).is_none());
    }

    #[test]
    fn test_qr_token_match() {
        let registry = DeviceRegistry::new();
        let keys = Arc::new(QrCodeKeys::generate().unwrap());
        registry.set_qr_keys(Some(keys.clone()));

        let info = EndpointInfo::new("Friend", DeviceType::Phone)
            .with_qr_record(keys.advertising_token().to_vec());
        let Some(RegistryChange::Added(device)) =
            registry.apply(DiscoveryEvent::Found(record("QR01", &info, lan())))
        else {
            panic!("expected Added");
        };
        assert!(device.qr_paired);
    }

    #[test]
    fn test_qr_sealed_name() {
        let registry = DeviceRegistry::new();
        let keys = Arc::new(QrCodeKeys::generate().unwrap());
        registry.set_qr_keys(Some(keys.clone()));

        let mut info = EndpointInfo::new("", DeviceType::Phone)
            .with_qr_record(keys.seal_name("Hidden Pixel").unwrap());
        info.hidden = true;
        let Some(RegistryChange::Added(device)) =
            registry.apply(DiscoveryEvent::Found(record("QR02", &info, lan())))
        else {
            panic!("expected Added");
        };
        assert_eq!(device.info.name, "Hidden Pixel");
    }

    #[test]
    fn test_qr_mismatch_ignored() {
        let registry = DeviceRegistry::new();
        registry.set_qr_keys(Some(Arc::new(QrCodeKeys::generate().unwrap())));

        let info = EndpointInfo::new("Stranger", DeviceType::Phone).with_qr_record(vec![0; 16]);
        assert!(registry
            .apply(DiscoveryEvent::Found(record("QR03", &info, lan())))
            .is_none());

        let plain = EndpointInfo::new("Plain", DeviceType::Phone);
        assert!(registry
            .apply(DiscoveryEvent::Found(record("PLN1", &plain, lan())))
            .is_some());
    }
}
