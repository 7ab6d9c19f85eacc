//! Error taxonomy for the Bluetooth link.

use thiserror::Error;

/// Failures surfaced by the transport contract.
///
/// Adapters revert their own state (status to disconnected, handle dropped)
/// before any of these reach the caller, so re-reading the status after a
/// failed call never observes a stale `connecting`/`connected`. Unsolicited
/// platform disconnects are not errors; they arrive only through the
/// status-change callback.
#[derive(Debug, Error)]
pub enum BluetoothError {
    /// The platform lacks the required Bluetooth stack or API.
    #[error("Bluetooth is not supported on this platform")]
    Unsupported,

    /// A connect attempt failed. The message names the cause (chooser
    /// cancelled, timeout, missing service/characteristic, no usable device)
    /// so control surfaces can render distinct guidance.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A send was attempted with no active write characteristic.
    #[error("no device connected")]
    NotConnected,

    /// The characteristic supports neither write mode.
    #[error("characteristic supports neither write mode")]
    UnsupportedOperation,
}
