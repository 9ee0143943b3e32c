//! Process-wide transfer manager.
//!
//! The manager owns the local identity, the discovery cache and the command channels of
//! every live connection. It is cheap to clone; all clones share the same state.
//!
//! ```text
//!                  +-------------------------------+
//!  mDNS browser -->| handle_discovery_event        |--> ShareDelegate
//!                  |   DeviceRegistry (DashMap)    |
//!                  |                               |
//!  TCP accept ---->| accept_inbound ---------------|--> InboundConnection task
//!  user decision ->| submit_user_consent ----------|      (mpsc: Consent)
//!                  |                               |
//!  user send ----->| start_outbound_transfer* -----|--> OutboundConnection task
//!  user cancel --->| cancel_outgoing_transfer -----|      (OutboundHandle)
//!                  +-------------------------------+
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use quickdrop_crypto::qr::QrCodeKeys;
use quickdrop_discovery::service::{encode_service_name, txt_record};
use quickdrop_discovery::{
    DeviceRegistry, DiscoveredDevice, DiscoveryEvent, EndpointId, EndpointInfo, RegistryChange,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::connection::Transport;
use crate::connection::inbound::{InboundCommand, InboundConnection};
use crate::connection::outbound::{LocalEndpoint, OutboundConnection, OutboundHandle};
use crate::delegate::{InboundDelegate, OutboundDelegate, ShareDelegate};
use crate::error::{Error, Result};
use crate::transfer::{ShareTarget, TransferId};

/// Entry point of the engine
#[derive(Clone)]
pub struct TransferManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<EngineConfig>,
    endpoint_id: EndpointId,
    inbound_delegate: Arc<dyn InboundDelegate>,
    registry: DeviceRegistry,
    share_delegates: RwLock<Vec<Arc<dyn ShareDelegate>>>,
    discovery_refs: AtomicUsize,
    qr_keys: RwLock<Option<Arc<QrCodeKeys>>>,
    inbound: DashMap<TransferId, mpsc::Sender<InboundCommand>>,
    outbound: DashMap<String, OutboundHandle>,
}

impl TransferManager {
    /// Create a manager with a fresh random endpoint ID.
    pub fn new(config: EngineConfig, inbound_delegate: Arc<dyn InboundDelegate>) -> Self {
        Self::with_endpoint_id(config, EndpointId::random(), inbound_delegate)
    }

    /// Create a manager with a fixed endpoint ID.
    pub fn with_endpoint_id(
        config: EngineConfig,
        endpoint_id: EndpointId,
        inbound_delegate: Arc<dyn InboundDelegate>,
    ) -> Self {
        info!(endpoint_id = %endpoint_id, device = %config.device_name, "Transfer manager created");
        Self {
            inner: Arc::new(Inner {
                config: Arc::new(config),
                endpoint_id,
                inbound_delegate,
                registry: DeviceRegistry::new(),
                share_delegates: RwLock::new(Vec::new()),
                discovery_refs: AtomicUsize::new(0),
                qr_keys: RwLock::new(None),
                inbound: DashMap::new(),
                outbound: DashMap::new(),
            }),
        }
    }

    /// Engine configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // ============ Advertisement ============

    /// Local endpoint ID
    #[must_use]
    pub fn endpoint_id(&self) -> &EndpointId {
        &self.inner.endpoint_id
    }

    /// mDNS instance name to publish
    #[must_use]
    pub fn service_name(&self) -> String {
        encode_service_name(&self.inner.endpoint_id)
    }

    fn local_endpoint_info(&self) -> EndpointInfo {
        let config = &self.inner.config;
        let mut info = EndpointInfo::new(config.device_name.clone(), config.device_type);
        info.hidden = config.hidden;
        match self.qr_keys() {
            Some(keys) => info.with_qr_record(keys.advertising_token().to_vec()),
            None => info,
        }
    }

    /// Serialized endpoint info, including the QR token when pairing is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if randomness is unavailable.
    pub fn endpoint_info(&self) -> Result<Vec<u8>> {
        Ok(self.local_endpoint_info().encode()?)
    }

    /// TXT record `(key, value)` to publish
    ///
    /// # Errors
    ///
    /// Returns an error if randomness is unavailable.
    pub fn txt_record(&self) -> Result<(String, String)> {
        Ok(txt_record(&self.local_endpoint_info())?)
    }

    // ============ QR Pairing ============

    /// Generate QR keys, advertise their token and return the URL to show as a QR code.
    ///
    /// While enabled, discovered devices that carry a QR record must match it.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn enable_qr_pairing(&self) -> Result<String> {
        let keys = Arc::new(QrCodeKeys::generate()?);
        let url = keys.url();
        self.inner.registry.set_qr_keys(Some(keys.clone()));
        *self
            .inner
            .qr_keys
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(keys);
        info!("QR pairing enabled");
        Ok(url)
    }

    /// Stop advertising a QR token.
    pub fn disable_qr_pairing(&self) {
        self.inner.registry.set_qr_keys(None);
        *self
            .inner
            .qr_keys
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Current QR keys, if pairing is enabled
    #[must_use]
    pub fn qr_keys(&self) -> Option<Arc<QrCodeKeys>> {
        self.inner
            .qr_keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ============ Discovery ============

    /// Register interest in nearby devices. Returns `true` for the first registration, when
    /// the caller should start browsing.
    pub fn start_device_discovery(&self) -> bool {
        let previous = self.inner.discovery_refs.fetch_add(1, Ordering::SeqCst);
        if previous == 0 {
            info!("Device discovery started");
        }
        previous == 0
    }

    /// Drop one registration. Returns `true` when the last one is gone; the cache is
    /// cleared and the caller should stop browsing.
    pub fn stop_device_discovery(&self) -> bool {
        let result = self
            .inner
            .discovery_refs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match result {
            Ok(1) => {
                self.inner.registry.clear();
                info!("Device discovery stopped");
                true
            }
            Ok(_) => false,
            Err(_) => {
                warn!("stop_device_discovery called without a matching start");
                false
            }
        }
    }

    /// Whether at least one discovery registration is active
    #[must_use]
    pub fn is_discovering(&self) -> bool {
        self.inner.discovery_refs.load(Ordering::SeqCst) > 0
    }

    /// Feed one browser event. Changes are forwarded to every share delegate.
    ///
    /// Events arriving while discovery is stopped are dropped.
    pub fn handle_discovery_event(&self, event: DiscoveryEvent) {
        if !self.is_discovering() {
            debug!("Dropping discovery event while discovery is stopped");
            return;
        }
        let Some(change) = self.inner.registry.apply(event) else {
            return;
        };
        let delegates = self
            .inner
            .share_delegates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for delegate in delegates {
            match &change {
                RegistryChange::Added(device) => delegate.device_added(device),
                RegistryChange::Removed(id) => delegate.device_removed(id),
            }
        }
    }

    /// Register a share delegate; it is told about every device already known.
    pub fn add_share_delegate(&self, delegate: Arc<dyn ShareDelegate>) {
        for device in self.inner.registry.devices() {
            delegate.device_added(&device);
        }
        self.inner
            .share_delegates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(delegate);
    }

    /// Unregister a share delegate previously passed to [`add_share_delegate`](Self::add_share_delegate).
    pub fn remove_share_delegate(&self, delegate: &Arc<dyn ShareDelegate>) {
        self.inner
            .share_delegates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|d| !Arc::ptr_eq(d, delegate));
    }

    /// Snapshot of visible devices
    #[must_use]
    pub fn devices(&self) -> Vec<DiscoveredDevice> {
        self.inner.registry.devices()
    }

    // ============ Inbound ============

    /// Run the receiving protocol on an accepted stream. Must be called inside a tokio
    /// runtime. Returns the transfer ID used for consent.
    pub fn accept_inbound<S: Transport>(&self, stream: S) -> TransferId {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(4);
        self.inner.inbound.insert(id.clone(), tx);

        let connection = InboundConnection::new(
            id.clone(),
            stream,
            self.inner.config.clone(),
            self.inner.inbound_delegate.clone(),
            rx,
        );
        let inner = self.inner.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            connection.run().await;
            inner.inbound.remove(&task_id);
        });
        debug!(connection = %id, "Inbound connection accepted");
        id
    }

    /// Answer a consent request. Unknown or finished transfers are ignored with a warning.
    pub fn submit_user_consent(&self, transfer_id: &str, accept: bool) {
        let sender = self.inner.inbound.get(transfer_id).map(|s| s.clone());
        let Some(sender) = sender else {
            warn!(transfer_id, "Consent for unknown transfer");
            return;
        };
        if sender.try_send(InboundCommand::Consent(accept)).is_err() {
            warn!(transfer_id, "Consent could not be delivered");
        }
    }

    // ============ Outbound ============

    /// Connect to a discovered device and send `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDevice`] if the device is not visible,
    /// [`Error::TransferInProgress`] if a transfer to it is running, or the connect error.
    pub async fn start_outbound_transfer(
        &self,
        device_id: &EndpointId,
        target: ShareTarget,
        delegate: Arc<dyn OutboundDelegate>,
    ) -> Result<OutboundHandle> {
        let device = self
            .inner
            .registry
            .get(device_id)
            .ok_or_else(|| Error::UnknownDevice(device_id.to_string()))?;
        self.ensure_idle(device_id.as_str())?;

        let mut last_error = None;
        for addr in &device.addresses {
            match TcpStream::connect(*addr).await {
                Ok(stream) => {
                    return self.start_outbound_transfer_over(
                        device_id.as_str(),
                        stream,
                        target,
                        delegate,
                    );
                }
                Err(e) => {
                    debug!(endpoint_id = %device_id, %addr, error = %e, "Connect failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.map_or_else(|| Error::UnknownDevice(device_id.to_string()), Error::Io))
    }

    /// Connect to `addr` directly and send `target`; the address is the transfer key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransferInProgress`] or the connect error.
    pub async fn start_outbound_transfer_to(
        &self,
        addr: SocketAddr,
        target: ShareTarget,
        delegate: Arc<dyn OutboundDelegate>,
    ) -> Result<OutboundHandle> {
        let key = addr.to_string();
        self.ensure_idle(&key)?;
        let stream = TcpStream::connect(addr).await?;
        self.start_outbound_transfer_over(key, stream, target, delegate)
    }

    /// Send `target` over an already connected stream, keyed by `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransferInProgress`] if a transfer with the same key is running.
    pub fn start_outbound_transfer_over<S: Transport>(
        &self,
        key: impl Into<String>,
        stream: S,
        target: ShareTarget,
        delegate: Arc<dyn OutboundDelegate>,
    ) -> Result<OutboundHandle> {
        let key = key.into();
        let local = LocalEndpoint {
            id: self.inner.endpoint_id.to_string(),
            info: self.endpoint_info()?,
        };

        let entry = match self.inner.outbound.entry(key.clone()) {
            Entry::Occupied(entry) if !entry.get().is_finished() => {
                return Err(Error::TransferInProgress(key));
            }
            entry => entry,
        };
        let (connection, handle) = OutboundConnection::new(
            key.clone(),
            stream,
            self.inner.config.clone(),
            local,
            target,
            delegate,
        );
        entry.insert(handle.clone());

        let inner = self.inner.clone();
        let task_key = key.clone();
        tokio::spawn(async move {
            connection.run().await;
            inner
                .outbound
                .remove_if(&task_key, |_, handle| handle.is_finished());
        });
        info!(transfer = %key, "Outbound transfer started");
        Ok(handle)
    }

    /// Cancel the outbound transfer to `key`. Returns `false` if none is running.
    pub fn cancel_outgoing_transfer(&self, key: &str) -> bool {
        let handle = self.inner.outbound.get(key).map(|h| h.clone());
        match handle {
            Some(handle) if !handle.is_finished() => {
                handle.cancel();
                true
            }
            _ => false,
        }
    }

    fn ensure_idle(&self, key: &str) -> Result<()> {
        match self.inner.outbound.get(key) {
            Some(handle) if !handle.is_finished() => {
                Err(Error::TransferInProgress(key.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// IDs of live connections, inbound first
    #[must_use]
    pub fn connections(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.inbound.iter().map(|e| e.key().clone()).collect();
        ids.extend(
            self.inner
                .outbound
                .iter()
                .filter(|e| !e.value().is_finished())
                .map(|e| e.key().clone()),
        );
        ids
    }
}

impl std::fmt::Debug for TransferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferManager")
            .field("endpoint_id", &self.inner.endpoint_id)
            .field("device_name", &self.inner.config.device_name)
            .field("inbound", &self.inner.inbound.len())
            .field("outbound", &self.inner.outbound.len())
            .finish_non_exhaustive()
    }
}
