//! Bluetooth link layer: the transport contract, the line reassembler and
//! the two stack adapters behind it.

pub mod constants;
mod error;
mod filter;
#[cfg(not(target_arch = "wasm32"))]
mod native;
mod reassembler;
#[cfg(not(target_arch = "wasm32"))]
mod scanner;
mod transport;
mod types;
#[cfg(target_arch = "wasm32")]
mod web;

// Re-export types that should be publicly accessible
pub use error::BluetoothError;
pub use filter::{DiscoverySet, is_selectable, is_selectable_with};
#[cfg(not(target_arch = "wasm32"))]
pub use native::NativeBluetoothAdapter;
pub use reassembler::LineReassembler;
#[cfg(not(target_arch = "wasm32"))]
pub use scanner::BluetoothScanner;
pub use transport::{BluetoothAdapter, BoxedAdapter};
pub use types::{
    ConnectionStatus, DataCallback, DeviceHandle, DiscoveredDevice, DiscoveryCallback,
    StatusCallback,
};
#[cfg(target_arch = "wasm32")]
pub use web::WebBluetoothAdapter;

use crate::config::LinkConfig;

/// Pick the one adapter for this process: the chooser-based browser stack on
/// wasm32, the scan-then-connect stack everywhere else. The choice is fixed
/// for the process lifetime.
///
/// Never fails: a platform with no usable stack yields an adapter that
/// reports `is_supported() == false` and fails connects with `Unsupported`.
pub async fn create_adapter(config: LinkConfig) -> BoxedAdapter {
    #[cfg(target_arch = "wasm32")]
    {
        let _ = config;
        log::info!("Using Web Bluetooth adapter (browser platform)");
        Box::new(web::WebBluetoothAdapter::new())
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        log::info!("Using native Bluetooth adapter (scan-then-connect platform)");
        Box::new(native::NativeBluetoothAdapter::new(config).await)
    }
}
