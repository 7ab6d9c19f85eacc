//! Time-bounded device scanning for the scan-then-connect stack.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bluest::{Adapter, Device};
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::LinkConfig;

use super::filter::{DiscoverySet, is_selectable_with};
use super::types::{DiscoveredDevice, DiscoveryCallback};

/// Scans for UART-capable peripherals and keeps the platform device handles
/// needed for connect-by-id.
///
/// A scan runs until its deadline, until the caller stops it, or until the
/// platform ends the stream, whichever comes first; repeated stops are
/// no-ops. Advertisements are filtered through the module-name heuristic and
/// deduplicated by device id (last sighting wins). The collected
/// `bluest::Device` handles outlive the scan so a connect can be issued
/// after teardown.
#[derive(Clone)]
pub struct BluetoothScanner {
    adapter: Adapter,
    config: Arc<LinkConfig>,
    shared: Arc<ScannerShared>,
}

struct ScannerShared {
    /// Platform handles keyed by device id, for connect-by-id lookups.
    devices: Mutex<HashMap<String, Device>>,
    discovered: Mutex<DiscoverySet>,
    discovery_cb: Arc<Mutex<Option<DiscoveryCallback>>>,
    cancel: Mutex<CancellationToken>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    /// When the last scan finished tearing down; connects measure their
    /// settle window from here.
    last_stopped: Mutex<Option<Instant>>,
}

impl ScannerShared {
    fn record_scan_stopped(&self) {
        *self.last_stopped.lock().unwrap() = Some(Instant::now());
    }
}

impl BluetoothScanner {
    pub fn new(
        adapter: Adapter,
        config: Arc<LinkConfig>,
        discovery_cb: Arc<Mutex<Option<DiscoveryCallback>>>,
    ) -> Self {
        Self {
            adapter,
            config,
            shared: Arc::new(ScannerShared {
                devices: Mutex::new(HashMap::new()),
                discovered: Mutex::new(DiscoverySet::new()),
                discovery_cb,
                cancel: Mutex::new(CancellationToken::new()),
                task: tokio::sync::Mutex::new(None),
                last_stopped: Mutex::new(None),
            }),
        }
    }

    /// Start a background scan, replacing any scan already running.
    pub async fn start(&self) {
        self.stop().await;

        self.shared.devices.lock().unwrap().clear();
        self.shared.discovered.lock().unwrap().clear();

        let token = CancellationToken::new();
        *self.shared.cancel.lock().unwrap() = token.clone();

        let adapter = self.adapter.clone();
        let config = self.config.clone();
        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            Self::scan_task(adapter, config, shared, token).await;
        });

        *self.shared.task.lock().await = Some(handle);
        info!("Device scan started");
    }

    async fn scan_task(
        adapter: Adapter,
        config: Arc<LinkConfig>,
        shared: Arc<ScannerShared>,
        token: CancellationToken,
    ) {
        let mut stream = match adapter.scan(&[]).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to start scan: {}", e);
                return;
            }
        };

        let deadline = tokio::time::sleep(Duration::from_secs(config.scan_duration_secs));
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    info!("Scan deadline reached");
                    break;
                }
                _ = token.cancelled() => {
                    break;
                }
                item = stream.next() => match item {
                    Some(adv) => {
                        let name = adv
                            .adv_data
                            .local_name
                            .clone()
                            .or_else(|| adv.device.name().ok());
                        Self::record_sighting(&shared, &config, adv.device, name, adv.rssi);
                    }
                    None => {
                        info!("Scan stream ended");
                        break;
                    }
                },
            }
        }

        drop(stream);
        shared.record_scan_stopped();
    }

    /// Run the filter on one sighting and fold it into the discovery set,
    /// notifying the discovery callback on first sight.
    fn record_sighting(
        shared: &ScannerShared,
        config: &LinkConfig,
        device: Device,
        name: Option<String>,
        rssi: Option<i16>,
    ) {
        let selectable = name.as_deref().is_some_and(|name| {
            is_selectable_with(name, &config.module_name_prefixes, &config.host_device_markers)
        });
        if !selectable {
            debug!("Ignoring advertisement from {:?}", name);
            return;
        }

        let id = device.id().to_string();
        shared.devices.lock().unwrap().insert(id.clone(), device);

        let discovered = DiscoveredDevice { id, name, rssi };
        let newly_seen = shared.discovered.lock().unwrap().insert(discovered.clone());
        if newly_seen {
            info!(
                "Found device: {} ({})",
                discovered.name.as_deref().unwrap_or_default(),
                discovered.id
            );
            let cb = shared.discovery_cb.lock().unwrap().clone();
            if let Some(cb) = cb {
                cb(&discovered);
            }
        }
    }

    /// Stop the scan and wait for its task to wind down. Returns whether a
    /// scan was actually running, so the caller knows whether the stack
    /// still needs settle time.
    pub async fn stop(&self) -> bool {
        let handle = self.shared.task.lock().await.take();
        let Some(handle) = handle else {
            return false;
        };

        let was_running = !handle.is_finished();
        self.shared.cancel.lock().unwrap().cancel();
        if let Err(e) = handle.await {
            error!("Scan task ended abnormally: {}", e);
        }
        if was_running {
            self.shared.record_scan_stopped();
            info!("Scan stopped");
        }
        was_running
    }

    /// Time still to wait before the scan teardown has settled, if the last
    /// scan stopped less than `settle` ago.
    pub fn settle_remaining(&self, settle: Duration) -> Option<Duration> {
        let last_stopped = (*self.shared.last_stopped.lock().unwrap())?;
        let elapsed = last_stopped.elapsed();
        (elapsed < settle).then(|| settle - elapsed)
    }

    /// Scan inline until the first selectable device appears or the deadline
    /// expires. Used by the implicit-selection connect on this stack, which
    /// has no chooser to wait on.
    pub async fn scan_until_match(&self) -> Result<Option<DiscoveredDevice>, bluest::Error> {
        self.stop().await;
        self.shared.devices.lock().unwrap().clear();
        self.shared.discovered.lock().unwrap().clear();

        let mut stream = self.adapter.scan(&[]).await?;
        let deadline = tokio::time::sleep(Duration::from_secs(self.config.scan_duration_secs));
        tokio::pin!(deadline);

        let found = loop {
            tokio::select! {
                _ = &mut deadline => break None,
                item = stream.next() => match item {
                    Some(adv) => {
                        let name = adv
                            .adv_data
                            .local_name
                            .clone()
                            .or_else(|| adv.device.name().ok());
                        let id = adv.device.id().to_string();
                        Self::record_sighting(&self.shared, &self.config, adv.device, name, adv.rssi);
                        let found = self
                            .shared
                            .discovered
                            .lock()
                            .unwrap()
                            .to_vec()
                            .into_iter()
                            .find(|d| d.id == id);
                        if let Some(found) = found {
                            break Some(found);
                        }
                    }
                    None => break None,
                },
            }
        };

        drop(stream);
        self.shared.record_scan_stopped();
        Ok(found)
    }

    /// Register a device the platform already knows as connected, making it
    /// available for connect-by-id without a fresh scan.
    pub fn adopt(&self, device: Device, name: Option<String>) -> DiscoveredDevice {
        let id = device.id().to_string();
        self.shared.devices.lock().unwrap().insert(id.clone(), device);
        let discovered = DiscoveredDevice { id, name, rssi: None };
        self.shared.discovered.lock().unwrap().insert(discovered.clone());
        discovered
    }

    /// Platform handle for a previously discovered device id.
    pub fn device(&self, id: &str) -> Option<Device> {
        self.shared.devices.lock().unwrap().get(id).cloned()
    }

    /// Snapshot of the devices the current or last scan surfaced.
    pub fn discovered_devices(&self) -> Vec<DiscoveredDevice> {
        self.shared.discovered.lock().unwrap().to_vec()
    }
}
