//! The scan-then-connect adapter for desktop Bluetooth stacks.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bluest::{Adapter, Characteristic, Device};
use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::LinkConfig;

use super::constants::{DEFAULT_DEVICE_NAME, UART_CHARACTERISTIC_UUID, UART_SERVICE_UUID};
use super::error::BluetoothError;
use super::filter::is_selectable_with;
use super::reassembler::LineReassembler;
use super::scanner::BluetoothScanner;
use super::transport::BluetoothAdapter;
use super::types::{
    ConnectionStatus, DataCallback, DeviceHandle, DiscoveredDevice, DiscoveryCallback,
    StatusCallback,
};

/// Explicit-selection adapter: scan, pick by id, connect.
///
/// This stack has no chooser UI, so `connect()` runs the scan itself and
/// takes the first device that passes the selection filter; interactive
/// pickers use `start_scan`/`discovered_devices` and `connect_to_device`.
/// Scan teardown and the connect call are serialized with a settle delay,
/// and the link is only declared usable after the characteristic has had
/// time to become writable. Both are stack quirks, configurable through
/// [`LinkConfig`].
pub struct NativeBluetoothAdapter {
    adapter: Option<Adapter>,
    scanner: Option<BluetoothScanner>,
    config: Arc<LinkConfig>,
    shared: Arc<LinkShared>,
}

/// State and callback slots shared with the notification pump task.
struct LinkShared {
    state: Mutex<LinkState>,
    reassembler: Mutex<LineReassembler>,
    data_cb: Mutex<Option<DataCallback>>,
    status_cb: Mutex<Option<StatusCallback>>,
    discovery_cb: Arc<Mutex<Option<DiscoveryCallback>>>,
}

struct LinkState {
    status: ConnectionStatus,
    device: Option<DeviceHandle>,
    platform_device: Option<Device>,
    write_char: Option<Characteristic>,
    notify_task: Option<JoinHandle<()>>,
    /// Bumped at the start of every connect attempt so a stale notification
    /// pump cannot tear down a newer link.
    generation: u64,
}

impl Default for LinkState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            device: None,
            platform_device: None,
            write_char: None,
            notify_task: None,
            generation: 0,
        }
    }
}

impl LinkShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(LinkState::default()),
            reassembler: Mutex::new(LineReassembler::new()),
            data_cb: Mutex::new(None),
            status_cb: Mutex::new(None),
            discovery_cb: Arc::new(Mutex::new(None)),
        }
    }

    fn emit_status(&self, status: ConnectionStatus) {
        let cb = self.status_cb.lock().unwrap().clone();
        if let Some(cb) = cb {
            cb(status);
        }
    }

    /// Converge requested and unsolicited disconnects on one cleanup path.
    /// No-op when already disconnected, so racing callers and the platform
    /// disconnect event produce exactly one transition.
    fn force_disconnected(&self) {
        self.force_disconnected_inner(None);
    }

    /// Generation-guarded variant for the notification pump: a pump
    /// outliving its connection must not touch a newer one.
    fn force_disconnected_from(&self, generation: u64) {
        self.force_disconnected_inner(Some(generation));
    }

    fn force_disconnected_inner(&self, expected_generation: Option<u64>) {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(generation) = expected_generation {
                if state.generation != generation {
                    return;
                }
            }
            if state.status == ConnectionStatus::Disconnected {
                return;
            }
            state.status = ConnectionStatus::Disconnected;
            state.device = None;
            state.platform_device = None;
            state.write_char = None;
            if let Some(task) = state.notify_task.take() {
                task.abort();
            }
        }
        self.reassembler.lock().unwrap().clear();
        self.emit_status(ConnectionStatus::Disconnected);
    }
}

impl NativeBluetoothAdapter {
    /// Probe the system Bluetooth stack. A machine without one still yields
    /// an adapter; it reports `is_supported() == false` and fails connects
    /// with `Unsupported`.
    pub async fn new(config: LinkConfig) -> Self {
        let config = Arc::new(config);
        let adapter = Adapter::default().await;
        match &adapter {
            Some(adapter) => {
                if let Err(e) = adapter.wait_available().await {
                    warn!("Bluetooth adapter not available: {}", e);
                } else {
                    info!("Bluetooth adapter is available");
                }
            }
            None => warn!("No Bluetooth adapter found"),
        }

        let shared = Arc::new(LinkShared::new());
        let scanner = adapter.clone().map(|adapter| {
            BluetoothScanner::new(adapter, config.clone(), shared.discovery_cb.clone())
        });

        Self {
            adapter,
            scanner,
            config,
            shared,
        }
    }

    fn stack(&self) -> Result<(&Adapter, &BluetoothScanner), BluetoothError> {
        match (&self.adapter, &self.scanner) {
            (Some(adapter), Some(scanner)) => Ok((adapter, scanner)),
            _ => Err(BluetoothError::Unsupported),
        }
    }

    /// Claim the link for a connect attempt. Rejects overlapping attempts
    /// instead of disturbing a live or half-built link.
    fn begin_connecting(&self) -> Result<(), BluetoothError> {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.status != ConnectionStatus::Disconnected {
                return Err(BluetoothError::ConnectionFailed(
                    "already connecting or connected".into(),
                ));
            }
            state.status = ConnectionStatus::Connecting;
            state.generation += 1;
        }
        self.shared.emit_status(ConnectionStatus::Connecting);
        Ok(())
    }

    /// The module may already be connected at the system level; prefer it
    /// over a fresh scan.
    async fn find_connected_module(
        &self,
        adapter: &Adapter,
        scanner: &BluetoothScanner,
    ) -> Option<DiscoveredDevice> {
        let devices = adapter.connected_devices().await.ok()?;
        for device in devices {
            let name = device.name().ok();
            let selectable = name.as_deref().is_some_and(|name| {
                is_selectable_with(
                    name,
                    &self.config.module_name_prefixes,
                    &self.config.host_device_markers,
                )
            });
            if selectable {
                info!("Reusing system-connected device {}", device.id());
                return Some(scanner.adopt(device, name));
            }
        }
        None
    }

    /// Never connect while a scan is still tearing down: stop anything
    /// running, then wait out whatever is left of the settle window since
    /// the last scan ended, whoever stopped it.
    async fn ensure_scan_settled(&self, scanner: &BluetoothScanner) {
        let settle = Duration::from_millis(self.config.scan_stop_settle_ms);
        let wait = if scanner.stop().await {
            Some(settle)
        } else {
            scanner.settle_remaining(settle)
        };
        if let Some(wait) = wait {
            sleep(wait).await;
        }
    }

    /// Connect-by-id core. Caller has already claimed the link via
    /// [`begin_connecting`](Self::begin_connecting) and reverts on error.
    async fn connect_by_id(
        &self,
        adapter: &Adapter,
        scanner: &BluetoothScanner,
        id: &str,
        name: Option<&str>,
    ) -> Result<DeviceHandle, BluetoothError> {
        self.ensure_scan_settled(scanner).await;

        let device = scanner.device(id).ok_or_else(|| {
            BluetoothError::ConnectionFailed(format!(
                "device {id} not found; scan before connecting"
            ))
        })?;

        if !device.is_connected().await {
            info!("Connecting to {}...", id);
            let timeout = Duration::from_secs(self.config.connect_timeout_secs);
            match tokio::time::timeout(timeout, adapter.connect_device(&device)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return Err(BluetoothError::ConnectionFailed(format!(
                        "GATT connect failed: {e}"
                    )));
                }
                Err(_) => {
                    return Err(BluetoothError::ConnectionFailed(format!(
                        "GATT connect timed out after {}s",
                        self.config.connect_timeout_secs
                    )));
                }
            }
        }

        info!("Connection established, discovering services...");
        let services = device.services().await.map_err(|e| {
            BluetoothError::ConnectionFailed(format!("service discovery failed: {e}"))
        })?;
        let uart_service = services
            .into_iter()
            .find(|s| s.uuid() == UART_SERVICE_UUID)
            .ok_or_else(|| {
                BluetoothError::ConnectionFailed(format!(
                    "UART service {UART_SERVICE_UUID} not found"
                ))
            })?;

        let characteristic = uart_service
            .characteristics()
            .await
            .map_err(|e| {
                BluetoothError::ConnectionFailed(format!(
                    "characteristic discovery failed: {e}"
                ))
            })?
            .into_iter()
            .find(|c| c.uuid() == UART_CHARACTERISTIC_UUID)
            .ok_or_else(|| {
                BluetoothError::ConnectionFailed(format!(
                    "UART characteristic {UART_CHARACTERISTIC_UUID} not found"
                ))
            })?;

        info!("Subscribing to notifications...");
        let generation = self.shared.state.lock().unwrap().generation;
        let (ready_tx, ready_rx) = oneshot::channel();
        let shared = self.shared.clone();
        let notify_char = characteristic.clone();
        let task = tokio::spawn(async move {
            Self::pump_notifications(shared, notify_char, generation, ready_tx).await;
        });

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(BluetoothError::ConnectionFailed(format!(
                    "notification subscribe failed: {e}"
                )));
            }
            Err(_) => {
                return Err(BluetoothError::ConnectionFailed(
                    "notification task ended before subscribing".into(),
                ));
            }
        }

        // The characteristic is not reliably writable right after the
        // subscription on this stack; hold before declaring the link usable.
        sleep(Duration::from_millis(self.config.write_ready_delay_ms)).await;

        let resolved_name = name
            .map(str::to_string)
            .or_else(|| device.name().ok())
            .unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string());
        let handle = DeviceHandle {
            name: resolved_name,
            id: id.to_string(),
            connected: true,
        };

        {
            let mut state = self.shared.state.lock().unwrap();
            // The pump may already have seen the stream end while we waited
            // out the ready delay.
            if state.status != ConnectionStatus::Connecting {
                return Err(BluetoothError::ConnectionFailed(
                    "link dropped during setup".into(),
                ));
            }
            state.device = Some(handle.clone());
            state.platform_device = Some(device);
            state.write_char = Some(characteristic);
            state.notify_task = Some(task);
            state.status = ConnectionStatus::Connected;
        }
        self.shared.emit_status(ConnectionStatus::Connected);
        info!("Connected to {} ({})", handle.name, handle.id);
        Ok(handle)
    }

    /// Read the notification stream for the lifetime of one connection,
    /// feeding chunks through the reassembler. A stream end or error is an
    /// unsolicited disconnect and converges on the same cleanup as a
    /// requested one.
    async fn pump_notifications(
        shared: Arc<LinkShared>,
        characteristic: Characteristic,
        generation: u64,
        ready_tx: oneshot::Sender<Result<(), bluest::Error>>,
    ) {
        let mut stream = match characteristic.notify().await {
            Ok(stream) => {
                let _ = ready_tx.send(Ok(()));
                stream
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        while let Some(item) = stream.next().await {
            match item {
                Ok(value) => {
                    let lines = shared.reassembler.lock().unwrap().push(&value);
                    if lines.is_empty() {
                        continue;
                    }
                    let cb = shared.data_cb.lock().unwrap().clone();
                    if let Some(cb) = cb {
                        for line in &lines {
                            cb(line);
                        }
                    }
                }
                Err(e) => {
                    warn!("Notification stream error: {}", e);
                    break;
                }
            }
        }

        debug!("Notification stream ended");
        shared.force_disconnected_from(generation);
    }
}

#[async_trait]
impl BluetoothAdapter for NativeBluetoothAdapter {
    fn is_supported(&self) -> bool {
        self.adapter.is_some()
    }

    async fn connect(&self) -> Result<DeviceHandle, BluetoothError> {
        let (adapter, scanner) = self.stack()?;
        self.begin_connecting()?;

        let result = async {
            let picked = match self.find_connected_module(adapter, scanner).await {
                Some(found) => Some(found),
                None => scanner.scan_until_match().await.map_err(|e| {
                    BluetoothError::ConnectionFailed(format!("scan failed: {e}"))
                })?,
            };
            let picked = picked.ok_or_else(|| {
                BluetoothError::ConnectionFailed("scan found no usable device".into())
            })?;
            self.connect_by_id(adapter, scanner, &picked.id, picked.name.as_deref())
                .await
        }
        .await;

        result.inspect_err(|_| self.shared.force_disconnected())
    }

    async fn connect_to_device(
        &self,
        id: &str,
        name: Option<&str>,
    ) -> Result<DeviceHandle, BluetoothError> {
        let (adapter, scanner) = self.stack()?;
        self.begin_connecting()?;
        self.connect_by_id(adapter, scanner, id, name)
            .await
            .inspect_err(|_| self.shared.force_disconnected())
    }

    async fn disconnect(&self) {
        let platform_device = self.shared.state.lock().unwrap().platform_device.clone();
        if let (Some(adapter), Some(device)) = (&self.adapter, platform_device) {
            if let Err(e) = adapter.disconnect_device(&device).await {
                // State is forced below either way; the link must never be
                // left ambiguous.
                warn!("Platform disconnect failed: {}", e);
            }
        }
        self.shared.force_disconnected();
    }

    async fn send_data(&self, data: &str) -> Result<(), BluetoothError> {
        let characteristic = self
            .shared
            .state
            .lock()
            .unwrap()
            .write_char
            .clone()
            .ok_or(BluetoothError::NotConnected)?;

        // HM-10/BT05-class peripherals only handle unacknowledged writes
        // reliably on this stack.
        characteristic
            .write_without_response(data.as_bytes())
            .await
            .map_err(|e| BluetoothError::ConnectionFailed(format!("write failed: {e}")))
    }

    async fn start_scan(&self) -> Result<(), BluetoothError> {
        let (_, scanner) = self.stack()?;
        scanner.start().await;
        Ok(())
    }

    async fn stop_scan(&self) {
        if let Some(scanner) = &self.scanner {
            scanner.stop().await;
        }
    }

    fn discovered_devices(&self) -> Vec<DiscoveredDevice> {
        self.scanner
            .as_ref()
            .map(BluetoothScanner::discovered_devices)
            .unwrap_or_default()
    }

    fn on_data_received(&self, callback: DataCallback) {
        *self.shared.data_cb.lock().unwrap() = Some(callback);
    }

    fn on_connection_status_change(&self, callback: StatusCallback) {
        *self.shared.status_cb.lock().unwrap() = Some(callback);
    }

    fn on_device_discovered(&self, callback: DiscoveryCallback) {
        *self.shared.discovery_cb.lock().unwrap() = Some(callback);
    }

    fn device(&self) -> Option<DeviceHandle> {
        self.shared.state.lock().unwrap().device.clone()
    }

    fn connection_status(&self) -> ConnectionStatus {
        self.shared.state.lock().unwrap().status
    }
}
