//! The chooser-based adapter for the browser Bluetooth stack.
//!
//! Web Bluetooth is an unstable web-sys API; building this module requires
//! RUSTFLAGS="--cfg=web_sys_unstable_apis".

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use js_sys::{Array, Uint8Array};
use log::warn;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    Bluetooth, BluetoothDevice, BluetoothLeScanFilterInit, BluetoothRemoteGattCharacteristic,
    BluetoothRemoteGattServer, BluetoothRemoteGattService, Event, RequestDeviceOptions,
};

use super::constants::{DEFAULT_DEVICE_NAME, MODULE_NAME_PREFIX, UART_CHARACTERISTIC_UUID,
    UART_SERVICE_UUID};
use super::error::BluetoothError;
use super::reassembler::LineReassembler;
use super::transport::BluetoothAdapter;
use super::types::{
    ConnectionStatus, DataCallback, DeviceHandle, DiscoveredDevice, DiscoveryCallback,
    StatusCallback,
};

/// Implicit-selection adapter: the browser's device chooser does the
/// picking, so there is no pre-connect scan and no connect-by-id.
/// `connect_to_device` falls back to `connect` and the scan surface reports
/// `Unsupported`: the chooser is the scan on this stack.
pub struct WebBluetoothAdapter {
    inner: Rc<Inner>,
}

struct Inner {
    state: RefCell<WebLinkState>,
    reassembler: RefCell<LineReassembler>,
    data_cb: RefCell<Option<DataCallback>>,
    status_cb: RefCell<Option<StatusCallback>>,
    discovery_cb: RefCell<Option<DiscoveryCallback>>,
}

struct WebLinkState {
    status: ConnectionStatus,
    device: Option<DeviceHandle>,
    native_device: Option<BluetoothDevice>,
    server: Option<BluetoothRemoteGattServer>,
    characteristic: Option<BluetoothRemoteGattCharacteristic>,
    // Listener closures are retained for the lifetime of the link; they are
    // detached on disconnect but only dropped once a later connect replaces
    // them, since a closure must not be freed from inside its own callback.
    on_value_changed: Option<Closure<dyn FnMut(Event)>>,
    on_disconnected: Option<Closure<dyn FnMut(Event)>>,
}

impl Default for WebLinkState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            device: None,
            native_device: None,
            server: None,
            characteristic: None,
            on_value_changed: None,
            on_disconnected: None,
        }
    }
}

impl Inner {
    fn emit_status(&self, status: ConnectionStatus) {
        let cb = self.status_cb.borrow().clone();
        if let Some(cb) = cb {
            cb(status);
        }
    }

    /// Shared terminal transition for requested disconnects, connect
    /// failures and `gattserverdisconnected` events. No-op when already
    /// disconnected.
    fn force_disconnected(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.status == ConnectionStatus::Disconnected {
                return;
            }
            state.status = ConnectionStatus::Disconnected;
            state.device = None;
            if let (Some(device), Some(closure)) = (&state.native_device, &state.on_disconnected)
            {
                let _ = device.remove_event_listener_with_callback(
                    "gattserverdisconnected",
                    closure.as_ref().unchecked_ref(),
                );
            }
            if let (Some(characteristic), Some(closure)) =
                (&state.characteristic, &state.on_value_changed)
            {
                let _ = characteristic.remove_event_listener_with_callback(
                    "characteristicvaluechanged",
                    closure.as_ref().unchecked_ref(),
                );
            }
            state.native_device = None;
            state.server = None;
            state.characteristic = None;
        }
        self.reassembler.borrow_mut().clear();
        self.emit_status(ConnectionStatus::Disconnected);
    }

    fn handle_value_changed(inner: &Rc<Inner>, event: &Event) {
        let Some(target) = event.target() else {
            return;
        };
        let Ok(characteristic) = target.dyn_into::<BluetoothRemoteGattCharacteristic>() else {
            return;
        };
        let Some(value) = characteristic.value() else {
            return;
        };

        let buffer = value.buffer();
        let bytes = Uint8Array::new_with_byte_offset_and_length(
            buffer.as_ref(),
            value.byte_offset() as u32,
            value.byte_length() as u32,
        )
        .to_vec();

        let lines = inner.reassembler.borrow_mut().push(&bytes);
        if lines.is_empty() {
            return;
        }
        let cb = inner.data_cb.borrow().clone();
        if let Some(cb) = cb {
            for line in &lines {
                cb(line);
            }
        }
    }
}

impl WebBluetoothAdapter {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                state: RefCell::new(WebLinkState::default()),
                reassembler: RefCell::new(LineReassembler::new()),
                data_cb: RefCell::new(None),
                status_cb: RefCell::new(None),
                discovery_cb: RefCell::new(None),
            }),
        }
    }

    /// `navigator.bluetooth`, if this browser exposes it. Fetched through
    /// `Reflect` so the probe mirrors `'bluetooth' in navigator` and stays
    /// safe on browsers without the API.
    fn bluetooth() -> Option<Bluetooth> {
        let window = web_sys::window()?;
        let navigator = window.navigator();
        let value =
            js_sys::Reflect::get(navigator.as_ref(), &JsValue::from_str("bluetooth")).ok()?;
        if value.is_undefined() {
            return None;
        }
        value.dyn_into::<Bluetooth>().ok()
    }

    fn begin_connecting(&self) -> Result<(), BluetoothError> {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.status != ConnectionStatus::Disconnected {
                return Err(BluetoothError::ConnectionFailed(
                    "already connecting or connected".into(),
                ));
            }
            state.status = ConnectionStatus::Connecting;
        }
        self.inner.emit_status(ConnectionStatus::Connecting);
        Ok(())
    }

    /// Chooser flow: request a device filtered by the UART service and the
    /// module name prefix, connect its GATT server, resolve the UART
    /// characteristic and wire up notifications.
    async fn request_and_connect(
        &self,
        bluetooth: Bluetooth,
    ) -> Result<DeviceHandle, BluetoothError> {
        let service_uuid = UART_SERVICE_UUID.to_string();

        let service_filter = BluetoothLeScanFilterInit::new();
        let services = Array::new();
        services.push(&JsValue::from_str(&service_uuid));
        service_filter.set_services(services.as_ref());

        let name_filter = BluetoothLeScanFilterInit::new();
        name_filter.set_name_prefix(MODULE_NAME_PREFIX);

        let filters = Array::new();
        filters.push(service_filter.as_ref());
        filters.push(name_filter.as_ref());

        let optional_services = Array::new();
        optional_services.push(&JsValue::from_str(&service_uuid));

        let options = RequestDeviceOptions::new();
        options.set_filters(filters.as_ref());
        options.set_optional_services(optional_services.as_ref());

        let device_value = JsFuture::from(bluetooth.request_device(&options))
            .await
            .map_err(|e| {
                BluetoothError::ConnectionFailed(format!(
                    "device chooser cancelled or failed: {e:?}"
                ))
            })?;
        let native_device: BluetoothDevice = device_value.unchecked_into();

        let server = native_device.gatt().ok_or_else(|| {
            BluetoothError::ConnectionFailed("GATT not supported by device".into())
        })?;
        JsFuture::from(server.connect()).await.map_err(|e| {
            BluetoothError::ConnectionFailed(format!("GATT connect failed: {e:?}"))
        })?;

        let service_value =
            JsFuture::from(server.get_primary_service_with_str(&service_uuid))
                .await
                .map_err(|e| {
                    BluetoothError::ConnectionFailed(format!(
                        "UART service {service_uuid} not found: {e:?}"
                    ))
                })?;
        let service: BluetoothRemoteGattService = service_value.unchecked_into();

        let characteristic_uuid = UART_CHARACTERISTIC_UUID.to_string();
        let characteristic_value =
            JsFuture::from(service.get_characteristic_with_str(&characteristic_uuid))
                .await
                .map_err(|e| {
                    BluetoothError::ConnectionFailed(format!(
                        "UART characteristic {characteristic_uuid} not found: {e:?}"
                    ))
                })?;
        let characteristic: BluetoothRemoteGattCharacteristic =
            characteristic_value.unchecked_into();

        JsFuture::from(characteristic.start_notifications())
            .await
            .map_err(|e| {
                BluetoothError::ConnectionFailed(format!(
                    "notification subscribe failed: {e:?}"
                ))
            })?;

        let weak = Rc::downgrade(&self.inner);
        let on_value_changed = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            if let Some(inner) = weak.upgrade() {
                Inner::handle_value_changed(&inner, &event);
            }
        });
        characteristic
            .add_event_listener_with_callback(
                "characteristicvaluechanged",
                on_value_changed.as_ref().unchecked_ref(),
            )
            .map_err(|e| {
                BluetoothError::ConnectionFailed(format!(
                    "failed to attach notification listener: {e:?}"
                ))
            })?;

        // Unsolicited disconnects land on the same terminal transition as
        // requested ones.
        let weak = Rc::downgrade(&self.inner);
        let on_disconnected = Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
            if let Some(inner) = weak.upgrade() {
                inner.force_disconnected();
            }
        });
        native_device
            .add_event_listener_with_callback(
                "gattserverdisconnected",
                on_disconnected.as_ref().unchecked_ref(),
            )
            .map_err(|e| {
                BluetoothError::ConnectionFailed(format!(
                    "failed to attach disconnect listener: {e:?}"
                ))
            })?;

        let handle = DeviceHandle {
            name: native_device
                .name()
                .unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string()),
            id: native_device.id(),
            connected: true,
        };

        {
            let mut state = self.inner.state.borrow_mut();
            state.device = Some(handle.clone());
            state.native_device = Some(native_device);
            state.server = Some(server);
            state.characteristic = Some(characteristic);
            state.on_value_changed = Some(on_value_changed);
            state.on_disconnected = Some(on_disconnected);
            state.status = ConnectionStatus::Connected;
        }
        self.inner.emit_status(ConnectionStatus::Connected);
        Ok(handle)
    }
}

impl Default for WebBluetoothAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl BluetoothAdapter for WebBluetoothAdapter {
    fn is_supported(&self) -> bool {
        Self::bluetooth().is_some()
    }

    async fn connect(&self) -> Result<DeviceHandle, BluetoothError> {
        let bluetooth = Self::bluetooth().ok_or(BluetoothError::Unsupported)?;
        self.begin_connecting()?;
        let result = self.request_and_connect(bluetooth).await;
        result.inspect_err(|_| self.inner.force_disconnected())
    }

    async fn connect_to_device(
        &self,
        id: &str,
        _name: Option<&str>,
    ) -> Result<DeviceHandle, BluetoothError> {
        // No connect-by-id without the chooser on this stack; degrade to the
        // chooser flow.
        warn!("connect_to_device({id}) is not supported here; showing the device chooser");
        self.connect().await
    }

    async fn disconnect(&self) {
        let server = self.inner.state.borrow().server.clone();
        if let Some(server) = server {
            if server.connected() {
                server.disconnect();
            }
        }
        self.inner.force_disconnected();
    }

    async fn send_data(&self, data: &str) -> Result<(), BluetoothError> {
        let characteristic = self
            .inner
            .state
            .borrow()
            .characteristic
            .clone()
            .ok_or(BluetoothError::NotConnected)?;

        let properties = characteristic.properties();
        let mut payload = data.as_bytes().to_vec();
        let promise = if properties.write_without_response() {
            characteristic.write_value_without_response_with_u8_array(&mut payload)
        } else if properties.write() {
            characteristic.write_value_with_response_with_u8_array(&mut payload)
        } else {
            return Err(BluetoothError::UnsupportedOperation);
        }
        .map_err(|e| BluetoothError::ConnectionFailed(format!("write failed: {e:?}")))?;

        JsFuture::from(promise)
            .await
            .map_err(|e| BluetoothError::ConnectionFailed(format!("write failed: {e:?}")))?;
        Ok(())
    }

    async fn start_scan(&self) -> Result<(), BluetoothError> {
        // The chooser is the scan on this stack.
        Err(BluetoothError::Unsupported)
    }

    async fn stop_scan(&self) {}

    fn discovered_devices(&self) -> Vec<DiscoveredDevice> {
        Vec::new()
    }

    fn on_data_received(&self, callback: DataCallback) {
        *self.inner.data_cb.borrow_mut() = Some(callback);
    }

    fn on_connection_status_change(&self, callback: StatusCallback) {
        *self.inner.status_cb.borrow_mut() = Some(callback);
    }

    fn on_device_discovered(&self, callback: DiscoveryCallback) {
        *self.inner.discovery_cb.borrow_mut() = Some(callback);
    }

    fn device(&self) -> Option<DeviceHandle> {
        self.inner.state.borrow().device.clone()
    }

    fn connection_status(&self) -> ConnectionStatus {
        self.inner.state.borrow().status
    }
}
