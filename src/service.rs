//! The connection service: one well-known access point over the one
//! physical link.

use std::sync::Mutex;

use crate::config::LinkConfig;
use crate::core::bluetooth::{
    BluetoothError, BoxedAdapter, ConnectionStatus, DataCallback, DeviceHandle,
    DiscoveredDevice, DiscoveryCallback, StatusCallback, create_adapter,
};

#[cfg(not(target_arch = "wasm32"))]
type Shared<T> = std::sync::Arc<T>;
#[cfg(target_arch = "wasm32")]
type Shared<T> = std::rc::Rc<T>;

/// Token returned by the subscribe calls; pass it back to
/// [`BluetoothService::unsubscribe`] when a control surface unmounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// Facade over the process's single Bluetooth adapter.
///
/// Every transport operation is forwarded verbatim; the service's own
/// contribution is being the shared access point all control surfaces use,
/// so mounting and unmounting surfaces never competes for the adapter's
/// single callback slots. The adapter slots are each claimed exactly once,
/// by the service's fan-out, and surfaces subscribe and unsubscribe here
/// with tokens instead.
///
/// Construct one instance at the composition root and hand it to each
/// surface by reference; the "exactly one physical connection" invariant
/// follows from there being exactly one service.
pub struct BluetoothService {
    adapter: BoxedAdapter,
    registry: Shared<Registry>,
}

#[derive(Default)]
struct Registry {
    next_id: Mutex<u64>,
    data: Mutex<Vec<(u64, DataCallback)>>,
    status: Mutex<Vec<(u64, StatusCallback)>>,
    discovery: Mutex<Vec<(u64, DiscoveryCallback)>>,
}

impl Registry {
    fn next_id(&self) -> u64 {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        *next
    }

    // Subscribers are cloned out before invocation so a callback may
    // subscribe or unsubscribe without deadlocking the registry.

    fn emit_data(&self, line: &str) {
        let subscribers: Vec<DataCallback> =
            self.data.lock().unwrap().iter().map(|(_, cb)| cb.clone()).collect();
        for cb in subscribers {
            cb(line);
        }
    }

    fn emit_status(&self, status: ConnectionStatus) {
        let subscribers: Vec<StatusCallback> =
            self.status.lock().unwrap().iter().map(|(_, cb)| cb.clone()).collect();
        for cb in subscribers {
            cb(status);
        }
    }

    fn emit_discovery(&self, device: &DiscoveredDevice) {
        let subscribers: Vec<DiscoveryCallback> =
            self.discovery.lock().unwrap().iter().map(|(_, cb)| cb.clone()).collect();
        for cb in subscribers {
            cb(device);
        }
    }
}

impl BluetoothService {
    /// Build the service over the platform's adapter with default tuning.
    pub async fn new() -> Self {
        Self::with_config(LinkConfig::default()).await
    }

    pub async fn with_config(config: LinkConfig) -> Self {
        Self::with_adapter(create_adapter(config).await)
    }

    /// Build the service over a caller-supplied adapter. This is the seam
    /// tests use to script the transport.
    pub fn with_adapter(adapter: BoxedAdapter) -> Self {
        let registry: Shared<Registry> = Shared::new(Registry::default());

        let fan_out = registry.clone();
        let data_cb: DataCallback = Shared::new(move |line: &str| fan_out.emit_data(line));
        adapter.on_data_received(data_cb);

        let fan_out = registry.clone();
        let status_cb: StatusCallback =
            Shared::new(move |status: ConnectionStatus| fan_out.emit_status(status));
        adapter.on_connection_status_change(status_cb);

        let fan_out = registry.clone();
        let discovery_cb: DiscoveryCallback =
            Shared::new(move |device: &DiscoveredDevice| fan_out.emit_discovery(device));
        adapter.on_device_discovered(discovery_cb);

        Self { adapter, registry }
    }

    // Subscriptions. Any number of surfaces may register; delivery order is
    // subscription order.

    /// Subscribe to complete received lines.
    pub fn subscribe_data(&self, callback: DataCallback) -> SubscriptionId {
        let id = self.registry.next_id();
        self.registry.data.lock().unwrap().push((id, callback));
        SubscriptionId(id)
    }

    /// Subscribe to connection status transitions.
    pub fn subscribe_status(&self, callback: StatusCallback) -> SubscriptionId {
        let id = self.registry.next_id();
        self.registry.status.lock().unwrap().push((id, callback));
        SubscriptionId(id)
    }

    /// Subscribe to scan discoveries.
    pub fn subscribe_discovery(&self, callback: DiscoveryCallback) -> SubscriptionId {
        let id = self.registry.next_id();
        self.registry.discovery.lock().unwrap().push((id, callback));
        SubscriptionId(id)
    }

    /// Drop a subscription of any kind. Unknown tokens are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.registry.data.lock().unwrap().retain(|(sub, _)| *sub != id.0);
        self.registry.status.lock().unwrap().retain(|(sub, _)| *sub != id.0);
        self.registry.discovery.lock().unwrap().retain(|(sub, _)| *sub != id.0);
    }

    // Transport contract pass-through.

    pub fn is_supported(&self) -> bool {
        self.adapter.is_supported()
    }

    pub async fn connect(&self) -> Result<DeviceHandle, BluetoothError> {
        self.adapter.connect().await
    }

    pub async fn connect_to_device(
        &self,
        id: &str,
        name: Option<&str>,
    ) -> Result<DeviceHandle, BluetoothError> {
        self.adapter.connect_to_device(id, name).await
    }

    pub async fn disconnect(&self) {
        self.adapter.disconnect().await
    }

    pub async fn send_data(&self, data: &str) -> Result<(), BluetoothError> {
        self.adapter.send_data(data).await
    }

    pub async fn send_at_command(&self, command: &str) -> Result<(), BluetoothError> {
        self.adapter.send_at_command(command).await
    }

    pub async fn start_scan(&self) -> Result<(), BluetoothError> {
        self.adapter.start_scan().await
    }

    pub async fn stop_scan(&self) {
        self.adapter.stop_scan().await
    }

    pub fn discovered_devices(&self) -> Vec<DiscoveredDevice> {
        self.adapter.discovered_devices()
    }

    pub fn device(&self) -> Option<DeviceHandle> {
        self.adapter.device()
    }

    pub fn is_connected(&self) -> bool {
        self.adapter.is_connected()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.adapter.connection_status()
    }
}
