//! The transport contract every Bluetooth stack adapter implements.

use async_trait::async_trait;

use super::error::BluetoothError;
use super::types::{
    ConnectionStatus, DataCallback, DeviceHandle, DiscoveredDevice, DiscoveryCallback,
    StatusCallback,
};

/// One Bluetooth link to a UART-profile peripheral, independent of which
/// native stack provides it.
///
/// Two concrete adapters exist, selected once at startup by
/// [`create_adapter`](super::create_adapter) and never swapped:
///
/// - [`WebBluetoothAdapter`](super::web::WebBluetoothAdapter) (wasm32) wraps
///   the browser stack, where pairing runs through the built-in device
///   chooser and there is no pre-connect scan. On this stack
///   [`connect_to_device`](Self::connect_to_device) degrades to
///   [`connect`](Self::connect) and [`start_scan`](Self::start_scan) fails
///   `Unsupported`: the chooser *is* the scan.
/// - [`NativeBluetoothAdapter`](super::native::NativeBluetoothAdapter)
///   (desktop) wraps an explicit scan → pick → connect-by-id stack with no
///   chooser UI of its own.
///
/// Callback registration is single-slot: re-registering replaces the
/// previous callback. [`BluetoothService`](crate::service::BluetoothService)
/// layers a multi-subscriber registry on top.
///
/// Calling `connect`/`connect_to_device` while the status is not
/// `Disconnected` is rejected with `ConnectionFailed` without disturbing the
/// live link; the one device handle stays exclusively owned by the adapter.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait BluetoothAdapter {
    /// Capability probe. No side effects; callable at any time, including
    /// before any connection attempt.
    fn is_supported(&self) -> bool;

    /// Implicit-selection connect: let the platform (or, on chooser-less
    /// stacks, a filtered scan) pick the peripheral, then bring the link up.
    ///
    /// On success the status has transitioned
    /// `disconnected → connecting → connected`. Any failure reverts to
    /// `disconnected` before the error is returned.
    async fn connect(&self) -> Result<DeviceHandle, BluetoothError>;

    /// Explicit-selection connect to a previously discovered identifier.
    ///
    /// Safe to call immediately after a scan stop; any stabilization delay
    /// the underlying stack needs is the adapter's responsibility.
    async fn connect_to_device(
        &self,
        id: &str,
        name: Option<&str>,
    ) -> Result<DeviceHandle, BluetoothError>;

    /// Tear the link down. Idempotent and infallible: always ends with
    /// status `disconnected` and no device handle, even if the platform
    /// disconnect call itself fails.
    async fn disconnect(&self);

    /// Write text to the peripheral's UART characteristic, preferring the
    /// unacknowledged write mode.
    async fn send_data(&self, data: &str) -> Result<(), BluetoothError>;

    /// Same wire behavior as [`send_data`](Self::send_data); kept so module
    /// command call sites read as such. No extra framing is added either
    /// way.
    async fn send_at_command(&self, command: &str) -> Result<(), BluetoothError> {
        self.send_data(command).await
    }

    /// Start a time-bounded device scan. `Unsupported` on the chooser stack.
    async fn start_scan(&self) -> Result<(), BluetoothError>;

    /// Stop an active scan. Idempotent; no-op when nothing is scanning.
    async fn stop_scan(&self);

    /// Devices collected by the current or most recent scan.
    fn discovered_devices(&self) -> Vec<DiscoveredDevice>;

    /// Register the line-received callback (single slot, last write wins).
    fn on_data_received(&self, callback: DataCallback);

    /// Register the status-change callback (single slot, last write wins).
    fn on_connection_status_change(&self, callback: StatusCallback);

    /// Register the device-discovered callback (single slot, last write
    /// wins). Fired the first time a scan sights each selectable device.
    fn on_device_discovered(&self, callback: DiscoveryCallback);

    /// The currently connected device, if any.
    fn device(&self) -> Option<DeviceHandle>;

    fn is_connected(&self) -> bool {
        self.connection_status() == ConnectionStatus::Connected
    }

    fn connection_status(&self) -> ConnectionStatus;
}

/// Boxed adapter trait object used throughout the crate.
///
/// On native stacks `async_trait` lowers the provided async methods (e.g.
/// [`send_at_command`](BluetoothAdapter::send_at_command)) to futures that
/// require the receiver be `Sync`, so the trait object must carry that bound.
/// The wasm stack is single-threaded (`async_trait(?Send)`) and omits it.
#[cfg(not(target_arch = "wasm32"))]
pub type BoxedAdapter = Box<dyn BluetoothAdapter + Sync>;
#[cfg(target_arch = "wasm32")]
pub type BoxedAdapter = Box<dyn BluetoothAdapter>;
