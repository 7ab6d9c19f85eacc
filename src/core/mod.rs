//! Core functionality for the UART link: everything below the service
//! facade lives here.

pub mod bluetooth;

// Re-export commonly used types
pub use bluetooth::{BluetoothAdapter, BluetoothError, ConnectionStatus, DeviceHandle};
