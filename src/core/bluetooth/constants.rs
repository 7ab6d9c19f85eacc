//! Constants used throughout the Bluetooth link layer:
//! service/characteristic UUIDs, device-name heuristics and the timing
//! quirks of the scan-then-connect stack.

use uuid::Uuid;

/// The HM-10/BT05 "transparent UART" service.
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000ffe0_0000_1000_8000_00805f9b34fb);

/// The single UART characteristic, used for both write and notify.
pub const UART_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x0000ffe1_0000_1000_8000_00805f9b34fb);

/// Name prefix used by the chooser filter on implicit-selection connects
/// (standard HM-10 module naming).
pub const MODULE_NAME_PREFIX: &str = "HM";

/// Known module-name prefixes accepted outright by the scan filter.
pub const MODULE_NAME_PREFIXES: &[&str] =
    &["BT", "HM", "ESP", "Arduino", "HC-", "JDY", "MLT", "AT-"];

/// Substrings identifying host devices (phones, laptops) whose advertisements
/// are suppressed from scan results.
pub const HOST_DEVICE_MARKERS: &[&str] = &["iPhone", "iPad", "MacBook", "Apple", "Flipper"];

/// Placeholder name some stacks report for unnamed advertisements; rejected
/// by the scan filter.
pub const UNNAMED_DEVICE: &str = "Unknown";

/// Fallback name for a connected device that reports none.
pub const DEFAULT_DEVICE_NAME: &str = "Unknown Device";

/// How long a scan runs before stopping on its own.
pub const SCAN_DURATION_SECS: u64 = 10;

/// Delay between scan teardown and the connect call that follows it.
/// Overlapping scan and connect is unreliable on the scan-then-connect
/// stack; the scan must have fully stopped before a connect is issued.
pub const SCAN_STOP_SETTLE_MS: u64 = 300;

/// Delay between notification subscription and declaring the link usable.
/// The characteristic is not reliably ready for writes immediately after
/// subscribing on the scan-then-connect stack.
pub const WRITE_READY_DELAY_MS: u64 = 500;

/// Timeout for the low-level GATT connect call.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;
