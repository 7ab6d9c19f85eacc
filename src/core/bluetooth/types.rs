//! Shared data structures for the Bluetooth link.

#[cfg(target_arch = "wasm32")]
use std::rc::Rc;
#[cfg(not(target_arch = "wasm32"))]
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the one physical link.
///
/// Owned by the active adapter, mirrored by the service, observed by every
/// subscriber. Serialized with the wire spellings the control surfaces expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// The currently connected peripheral.
///
/// At most one live handle exists per process; it is created on a successful
/// connect and dropped on disconnect (requested or unsolicited).
#[derive(Debug, Clone, Serialize)]
pub struct DeviceHandle {
    /// Device name as reported by the platform, or a placeholder.
    pub name: String,
    /// Opaque platform identifier for the device.
    pub id: String,
    /// Whether the link was up when the handle was produced.
    pub connected: bool,
}

/// A device seen during an active scan.
///
/// Transient: produced while scanning, discarded when a connect attempt
/// begins or the next scan starts.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredDevice {
    /// Opaque platform identifier, the key for connect-by-id.
    pub id: String,
    /// Advertised name, if the advertisement carried one.
    pub name: Option<String>,
    /// Signal strength at the last sighting, if reported.
    pub rssi: Option<i16>,
}

/// Callback invoked with each complete received line (terminator stripped).
#[cfg(not(target_arch = "wasm32"))]
pub type DataCallback = Arc<dyn Fn(&str) + Send + Sync>;
#[cfg(target_arch = "wasm32")]
pub type DataCallback = Rc<dyn Fn(&str)>;

/// Callback invoked on every [`ConnectionStatus`] transition.
#[cfg(not(target_arch = "wasm32"))]
pub type StatusCallback = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;
#[cfg(target_arch = "wasm32")]
pub type StatusCallback = Rc<dyn Fn(ConnectionStatus)>;

/// Callback invoked when a scan first sights a selectable device.
#[cfg(not(target_arch = "wasm32"))]
pub type DiscoveryCallback = Arc<dyn Fn(&DiscoveredDevice) + Send + Sync>;
#[cfg(target_arch = "wasm32")]
pub type DiscoveryCallback = Rc<dyn Fn(&DiscoveredDevice)>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_with_wire_spelling() {
        assert_eq!(
            serde_json::to_string(&ConnectionStatus::Disconnected).unwrap(),
            "\"disconnected\""
        );
        assert_eq!(
            serde_json::to_string(&ConnectionStatus::Connecting).unwrap(),
            "\"connecting\""
        );
        assert_eq!(
            serde_json::to_string(&ConnectionStatus::Connected).unwrap(),
            "\"connected\""
        );
    }
}
