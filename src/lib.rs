//! HM-10/BT05 UART link core: one transport contract over two Bluetooth
//! stacks, newline framing, and a shared connection service.

// Module declarations
pub mod config;
pub mod core;
#[cfg(not(target_arch = "wasm32"))]
pub mod logging;
pub mod service;

pub use crate::config::LinkConfig;
pub use crate::core::bluetooth::{
    BluetoothAdapter, BluetoothError, ConnectionStatus, DeviceHandle, DiscoveredDevice,
    LineReassembler, create_adapter,
};
pub use crate::service::{BluetoothService, SubscriptionId};
