//! Link configuration.

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::{
    CONNECT_TIMEOUT_SECS, HOST_DEVICE_MARKERS, MODULE_NAME_PREFIXES, SCAN_DURATION_SECS,
    SCAN_STOP_SETTLE_MS, WRITE_READY_DELAY_MS,
};

/// Tunables for the scan-then-connect stack: scan bounds, the empirically
/// required settle delays and the device-name heuristic. Defaults come from
/// the constants module; deployments with unusual module names can extend
/// the lists from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// How long a scan runs before stopping on its own, in seconds.
    pub scan_duration_secs: u64,

    /// Delay between scan teardown and a following connect, in milliseconds.
    pub scan_stop_settle_ms: u64,

    /// Delay between notification subscription and declaring the link
    /// usable, in milliseconds.
    pub write_ready_delay_ms: u64,

    /// Timeout for the low-level GATT connect call, in seconds.
    pub connect_timeout_secs: u64,

    /// Name prefixes accepted outright by the scan filter.
    pub module_name_prefixes: Vec<String>,

    /// Name substrings identifying host devices to suppress.
    pub host_device_markers: Vec<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            scan_duration_secs: SCAN_DURATION_SECS,
            scan_stop_settle_ms: SCAN_STOP_SETTLE_MS,
            write_ready_delay_ms: WRITE_READY_DELAY_MS,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            module_name_prefixes: MODULE_NAME_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            host_device_markers: HOST_DEVICE_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl LinkConfig {
    /// Load from a JSON file, falling back to defaults if it is missing.
    pub async fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Save as pretty-printed JSON.
    pub async fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;
        log::info!("Config saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = LinkConfig::default();
        assert_eq!(config.scan_duration_secs, 10);
        assert_eq!(config.scan_stop_settle_ms, 300);
        assert_eq!(config.write_ready_delay_ms, 500);
        assert!(config.module_name_prefixes.iter().any(|p| p == "HM"));
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: LinkConfig = serde_json::from_str(r#"{"scan_duration_secs": 5}"#).unwrap();
        assert_eq!(config.scan_duration_secs, 5);
        assert_eq!(config.scan_stop_settle_ms, 300);
    }
}
