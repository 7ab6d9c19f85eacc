#[cfg(not(target_arch = "wasm32"))]
mod cli {
    //! Minimal raw-terminal surface over the link: scan for modules, or
    //! connect and bridge stdin lines to the peripheral.

    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::Result;
    use log::error;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::sync::Notify;

    use hm10_bridge::{BluetoothService, ConnectionStatus, DiscoveredDevice, LinkConfig, logging};

    const CONFIG_FILE_NAME: &str = "hm10-bridge.json";

    pub async fn run() -> Result<()> {
        logging::setup_logging();

        let config = LinkConfig::load(Path::new(CONFIG_FILE_NAME)).await?;
        let scan_secs = config.scan_duration_secs;
        let service = BluetoothService::with_config(config).await;
        if !service.is_supported() {
            anyhow::bail!("Bluetooth is not supported on this platform");
        }

        let args: Vec<String> = std::env::args().skip(1).collect();
        match args.first().map(String::as_str) {
            Some("scan") => scan(&service, scan_secs).await,
            Some("connect") => terminal(&service, args.get(1).map(String::as_str)).await,
            _ => {
                eprintln!("usage: hm10-bridge <scan | connect [device-id]>");
                Ok(())
            }
        }
    }

    async fn scan(service: &BluetoothService, scan_secs: u64) -> Result<()> {
        eprintln!("Scanning for {scan_secs}s...");
        service.subscribe_discovery(Arc::new(|device: &DiscoveredDevice| {
            println!(
                "{}  {}  rssi={}",
                device.id,
                device.name.as_deref().unwrap_or("?"),
                device
                    .rssi
                    .map_or_else(|| "?".to_string(), |rssi| rssi.to_string()),
            );
        }));

        service.start_scan().await?;
        tokio::time::sleep(Duration::from_secs(scan_secs)).await;
        service.stop_scan().await;

        eprintln!("{} device(s) found", service.discovered_devices().len());
        Ok(())
    }

    async fn terminal(service: &BluetoothService, device_id: Option<&str>) -> Result<()> {
        let link_down = Arc::new(Notify::new());
        let notify = link_down.clone();
        service.subscribe_status(Arc::new(move |status: ConnectionStatus| {
            eprintln!("[status] {status:?}");
            if status == ConnectionStatus::Disconnected {
                notify.notify_one();
            }
        }));
        service.subscribe_data(Arc::new(|line: &str| println!("{line}")));

        let handle = match device_id {
            Some(id) => service.connect_to_device(id, None).await?,
            None => service.connect().await?,
        };
        eprintln!("Connected to {} ({}). Type lines; Ctrl-D exits.", handle.name, handle.id);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if let Err(e) = service.send_data(&format!("{line}\n")).await {
                            error!("Send failed: {e}");
                        }
                    }
                    None => break,
                },
                _ = link_down.notified() => {
                    eprintln!("Link closed by peripheral");
                    return Ok(());
                }
            }
        }

        service.disconnect().await;
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
