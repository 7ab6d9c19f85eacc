//! Advertisement filtering and the scan-time discovery set.

use super::constants::{HOST_DEVICE_MARKERS, MODULE_NAME_PREFIXES, UNNAMED_DEVICE};
use super::types::DiscoveredDevice;

/// Decide whether a scanned advertisement belongs in the device list.
///
/// Accepts names starting with a known module prefix outright; otherwise
/// accepts any named advertisement that does not look like a host device
/// (phone, laptop). Unnamed and placeholder advertisements are BLE noise and
/// are rejected.
pub fn is_selectable(name: Option<&str>) -> bool {
    match name {
        Some(name) => is_selectable_with(name, MODULE_NAME_PREFIXES, HOST_DEVICE_MARKERS),
        None => false,
    }
}

/// [`is_selectable`] with caller-supplied prefix/marker lists (see
/// [`LinkConfig`](crate::config::LinkConfig)).
pub fn is_selectable_with<P, M>(name: &str, module_prefixes: &[P], host_markers: &[M]) -> bool
where
    P: AsRef<str>,
    M: AsRef<str>,
{
    if name.is_empty() || name == UNNAMED_DEVICE {
        return false;
    }
    if module_prefixes.iter().any(|p| name.starts_with(p.as_ref())) {
        return true;
    }
    !host_markers.iter().any(|m| name.contains(m.as_ref()))
}

/// Devices collected during one scan, keyed by platform id.
///
/// Repeated advertisement packets from the same device collapse to one
/// entry; the last-seen advertisement wins. Insertion order is preserved for
/// stable listing.
#[derive(Debug, Default)]
pub struct DiscoverySet {
    devices: Vec<DiscoveredDevice>,
}

impl DiscoverySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sighting. Returns `true` the first time this id is seen.
    pub fn insert(&mut self, device: DiscoveredDevice) -> bool {
        match self.devices.iter_mut().find(|d| d.id == device.id) {
            Some(existing) => {
                *existing = device;
                false
            }
            None => {
                self.devices.push(device);
                true
            }
        }
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Snapshot of the current set, in first-seen order.
    pub fn to_vec(&self) -> Vec<DiscoveredDevice> {
        self.devices.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovered(id: &str, name: Option<&str>, rssi: Option<i16>) -> DiscoveredDevice {
        DiscoveredDevice {
            id: id.to_string(),
            name: name.map(str::to_string),
            rssi,
        }
    }

    #[test]
    fn scan_filter_scenario() {
        // The canonical mixed-advertisement scan: module names pass, host
        // devices and noise do not.
        let names = [
            Some("HM-10"),
            Some("iPhone"),
            Some("BT05-Sensor"),
            Some("Unknown"),
            Some(""),
        ];
        let selectable: Vec<&str> = names
            .iter()
            .filter(|n| is_selectable(**n))
            .map(|n| n.unwrap())
            .collect();
        assert_eq!(selectable, ["HM-10", "BT05-Sensor"]);
    }

    #[test]
    fn known_prefixes_beat_the_denylist() {
        // A prefix match is accepted even if a host marker appears later in
        // the name.
        assert!(is_selectable(Some("ESP32-iPhone-Relay")));
    }

    #[test]
    fn named_non_host_devices_pass() {
        assert!(is_selectable(Some("MyRobot")));
        assert!(!is_selectable(Some("Olga's iPad")));
        assert!(!is_selectable(Some("MacBook Pro")));
        assert!(!is_selectable(None));
    }

    #[test]
    fn duplicate_advertisements_collapse_and_last_wins() {
        let mut set = DiscoverySet::new();
        assert!(set.insert(discovered("aa", Some("HM-10"), Some(-70))));
        assert!(!set.insert(discovered("aa", Some("HM-10"), Some(-55))));
        assert!(set.insert(discovered("bb", Some("BT05"), None)));

        let devices = set.to_vec();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].id, "aa");
        assert_eq!(devices[0].rssi, Some(-55));
        assert_eq!(devices[1].id, "bb");
    }
}
