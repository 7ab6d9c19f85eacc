//! Service-level tests for the transport contract, run over a scripted
//! in-memory adapter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use hm10_bridge::BluetoothService;
use hm10_bridge::core::bluetooth::{
    BluetoothAdapter, BluetoothError, ConnectionStatus, DataCallback, DeviceHandle,
    DiscoveredDevice, DiscoveryCallback, LineReassembler, StatusCallback,
};

/// In-memory adapter honoring the contract semantics: status transitions,
/// state revert before errors, single-slot callbacks, buffer reset on
/// disconnect. Tests drive the "peripheral side" with `feed`/`advertise`.
#[derive(Clone)]
struct MockAdapter {
    shared: Arc<MockShared>,
}

struct MockShared {
    status: Mutex<ConnectionStatus>,
    device: Mutex<Option<DeviceHandle>>,
    reassembler: Mutex<LineReassembler>,
    data_cb: Mutex<Option<DataCallback>>,
    status_cb: Mutex<Option<StatusCallback>>,
    discovery_cb: Mutex<Option<DiscoveryCallback>>,
    sent: Mutex<Vec<String>>,
    fail_next_connect: AtomicBool,
}

impl MockAdapter {
    fn new() -> Self {
        Self {
            shared: Arc::new(MockShared {
                status: Mutex::new(ConnectionStatus::Disconnected),
                device: Mutex::new(None),
                reassembler: Mutex::new(LineReassembler::new()),
                data_cb: Mutex::new(None),
                status_cb: Mutex::new(None),
                discovery_cb: Mutex::new(None),
                sent: Mutex::new(Vec::new()),
                fail_next_connect: AtomicBool::new(false),
            }),
        }
    }

    fn fail_next_connect(&self) {
        self.shared.fail_next_connect.store(true, Ordering::SeqCst);
    }

    /// Deliver a raw notification chunk from the fake peripheral.
    fn feed(&self, chunk: &[u8]) {
        let lines = self.shared.reassembler.lock().unwrap().push(chunk);
        let cb = self.shared.data_cb.lock().unwrap().clone();
        if let Some(cb) = cb {
            for line in &lines {
                cb(line);
            }
        }
    }

    /// Surface a scan sighting.
    fn advertise(&self, device: &DiscoveredDevice) {
        let cb = self.shared.discovery_cb.lock().unwrap().clone();
        if let Some(cb) = cb {
            cb(device);
        }
    }

    fn sent(&self) -> Vec<String> {
        self.shared.sent.lock().unwrap().clone()
    }

    fn emit_status(&self, status: ConnectionStatus) {
        let cb = self.shared.status_cb.lock().unwrap().clone();
        if let Some(cb) = cb {
            cb(status);
        }
    }

    fn revert_to_disconnected(&self) {
        *self.shared.status.lock().unwrap() = ConnectionStatus::Disconnected;
        *self.shared.device.lock().unwrap() = None;
        self.shared.reassembler.lock().unwrap().clear();
        self.emit_status(ConnectionStatus::Disconnected);
    }
}

#[async_trait]
impl BluetoothAdapter for MockAdapter {
    fn is_supported(&self) -> bool {
        true
    }

    async fn connect(&self) -> Result<DeviceHandle, BluetoothError> {
        self.connect_to_device("mock-device", Some("HM-10")).await
    }

    async fn connect_to_device(
        &self,
        id: &str,
        name: Option<&str>,
    ) -> Result<DeviceHandle, BluetoothError> {
        {
            let mut status = self.shared.status.lock().unwrap();
            if *status != ConnectionStatus::Disconnected {
                return Err(BluetoothError::ConnectionFailed(
                    "already connecting or connected".into(),
                ));
            }
            *status = ConnectionStatus::Connecting;
        }
        self.emit_status(ConnectionStatus::Connecting);

        if self.shared.fail_next_connect.swap(false, Ordering::SeqCst) {
            self.revert_to_disconnected();
            return Err(BluetoothError::ConnectionFailed("GATT connect failed".into()));
        }

        let handle = DeviceHandle {
            name: name.unwrap_or("Unknown Device").to_string(),
            id: id.to_string(),
            connected: true,
        };
        *self.shared.device.lock().unwrap() = Some(handle.clone());
        *self.shared.status.lock().unwrap() = ConnectionStatus::Connected;
        self.emit_status(ConnectionStatus::Connected);
        Ok(handle)
    }

    async fn disconnect(&self) {
        let was_connected = {
            let mut status = self.shared.status.lock().unwrap();
            let was = *status;
            *status = ConnectionStatus::Disconnected;
            was != ConnectionStatus::Disconnected
        };
        *self.shared.device.lock().unwrap() = None;
        self.shared.reassembler.lock().unwrap().clear();
        if was_connected {
            self.emit_status(ConnectionStatus::Disconnected);
        }
    }

    async fn send_data(&self, data: &str) -> Result<(), BluetoothError> {
        if *self.shared.status.lock().unwrap() != ConnectionStatus::Connected {
            return Err(BluetoothError::NotConnected);
        }
        self.shared.sent.lock().unwrap().push(data.to_string());
        Ok(())
    }

    async fn start_scan(&self) -> Result<(), BluetoothError> {
        Ok(())
    }

    async fn stop_scan(&self) {}

    fn discovered_devices(&self) -> Vec<DiscoveredDevice> {
        Vec::new()
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
        self.shared.device.lock().unwrap().clone()
    }

    fn connection_status(&self) -> ConnectionStatus {
        *self.shared.status.lock().unwrap()
    }
}

fn service_over_mock() -> (BluetoothService, MockAdapter) {
    let mock = MockAdapter::new();
    let service = BluetoothService::with_adapter(Box::new(mock.clone()));
    (service, mock)
}

fn record_lines(service: &BluetoothService) -> Arc<Mutex<Vec<String>>> {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    service.subscribe_data(Arc::new(move |line: &str| {
        sink.lock().unwrap().push(line.to_string());
    }));
    lines
}

fn record_statuses(service: &BluetoothService) -> Arc<Mutex<Vec<ConnectionStatus>>> {
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = statuses.clone();
    service.subscribe_status(Arc::new(move |status| {
        sink.lock().unwrap().push(status);
    }));
    statuses
}

#[tokio::test]
async fn every_mounted_surface_receives_lines() {
    let (service, mock) = service_over_mock();
    let first = record_lines(&service);
    let second = record_lines(&service);

    service.connect().await.unwrap();
    mock.feed(b"temp=21\nhum=");
    mock.feed(b"40\n");

    assert_eq!(*first.lock().unwrap(), ["temp=21", "hum=40"]);
    assert_eq!(*second.lock().unwrap(), ["temp=21", "hum=40"]);
}

#[tokio::test]
async fn unsubscribed_surface_stops_receiving() {
    let (service, mock) = service_over_mock();
    let kept = record_lines(&service);

    let dropped = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = dropped.clone();
    let token = service.subscribe_data(Arc::new(move |line: &str| {
        sink.lock().unwrap().push(line.to_string());
    }));

    service.connect().await.unwrap();
    mock.feed(b"one\n");
    service.unsubscribe(token);
    mock.feed(b"two\n");

    assert_eq!(*kept.lock().unwrap(), ["one", "two"]);
    assert_eq!(*dropped.lock().unwrap(), ["one"]);
}

#[tokio::test]
async fn successful_connect_steps_through_connecting() {
    let (service, _mock) = service_over_mock();
    let statuses = record_statuses(&service);

    let handle = service.connect().await.unwrap();
    assert_eq!(handle.name, "HM-10");
    assert!(handle.connected);
    assert_eq!(
        *statuses.lock().unwrap(),
        [ConnectionStatus::Connecting, ConnectionStatus::Connected]
    );
    assert_eq!(service.connection_status(), ConnectionStatus::Connected);
    assert!(service.is_connected());
    assert!(service.device().is_some());
}

#[tokio::test]
async fn failed_connect_reverts_before_the_error_surfaces() {
    let (service, mock) = service_over_mock();
    let statuses = record_statuses(&service);
    mock.fail_next_connect();

    let err = service.connect().await.unwrap_err();
    assert!(matches!(err, BluetoothError::ConnectionFailed(_)));
    assert_eq!(service.connection_status(), ConnectionStatus::Disconnected);
    assert!(service.device().is_none());
    assert_eq!(
        *statuses.lock().unwrap(),
        [ConnectionStatus::Connecting, ConnectionStatus::Disconnected]
    );
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let (service, _mock) = service_over_mock();

    // Never connected: both calls are quiet no-ops.
    service.disconnect().await;
    service.disconnect().await;
    assert_eq!(service.connection_status(), ConnectionStatus::Disconnected);

    service.connect().await.unwrap();
    service.disconnect().await;
    service.disconnect().await;
    assert_eq!(service.connection_status(), ConnectionStatus::Disconnected);
    assert!(service.device().is_none());
}

#[tokio::test]
async fn partial_line_never_leaks_across_connections() {
    let (service, mock) = service_over_mock();
    let lines = record_lines(&service);

    service.connect().await.unwrap();
    mock.feed(b"abc");
    service.disconnect().await;

    service.connect().await.unwrap();
    mock.feed(b"def\n");

    assert_eq!(*lines.lock().unwrap(), ["def"]);
}

#[tokio::test]
async fn send_without_connection_is_rejected() {
    let (service, mock) = service_over_mock();

    let err = service.send_data("X").await.unwrap_err();
    assert!(matches!(err, BluetoothError::NotConnected));
    assert!(mock.sent().is_empty());
}

#[tokio::test]
async fn at_commands_share_the_send_path() {
    let (service, mock) = service_over_mock();
    service.connect().await.unwrap();

    service.send_at_command("AT+NAME?\r\n").await.unwrap();
    service.send_data("L1\n").await.unwrap();

    // No extra framing in either direction.
    assert_eq!(mock.sent(), ["AT+NAME?\r\n", "L1\n"]);
}

#[tokio::test]
async fn overlapping_connect_does_not_disturb_the_link() {
    let (service, _mock) = service_over_mock();
    let handle = service.connect().await.unwrap();

    let err = service.connect().await.unwrap_err();
    assert!(matches!(err, BluetoothError::ConnectionFailed(_)));
    assert_eq!(service.connection_status(), ConnectionStatus::Connected);
    assert_eq!(service.device().unwrap().id, handle.id);
}

#[tokio::test]
async fn discoveries_fan_out_to_every_subscriber() {
    let (service, mock) = service_over_mock();

    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    for _ in 0..2 {
        let sink = seen.clone();
        service.subscribe_discovery(Arc::new(move |device: &DiscoveredDevice| {
            sink.lock().unwrap().push(device.id.clone());
        }));
    }

    mock.advertise(&DiscoveredDevice {
        id: "aa:bb".into(),
        name: Some("BT05".into()),
        rssi: Some(-60),
    });

    assert_eq!(*seen.lock().unwrap(), ["aa:bb", "aa:bb"]);
}
