use btleplug::api::{Central, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter};
use btleplug::platform::{Adapter, Manager};
use log::{debug, info, warn};
use tokio::time::{sleep, Duration, Instant};

use crate::device::constants::{NUIMO_SERVICE, SCAN_POLL_DELAY};
use crate::device::transport::BtleplugTransport;
use crate::error::DeviceError;

/// Some environments ignore the scan filter, so peripherals are checked again by service and
/// advertised name.
pub fn is_nuimo(properties: &PeripheralProperties, name_prefix: &str) -> bool {
    if properties.services.contains(&NUIMO_SERVICE) {
        return true;
    }

    properties.local_name
        .as_deref()
        .map(|name| name.starts_with(name_prefix))
        .unwrap_or(false)
}

async fn start_scanning(manager: &Manager) -> Result<Vec<Adapter>, DeviceError> {
    let adapters = manager.adapters().await?;
    if adapters.is_empty() {
        return Err(DeviceError::NoAdapters);
    }

    // no service filter: older firmware does not advertise the vendor service
    let filter = ScanFilter::default();

    for adapter in &adapters {
        info!("Scanning using adapter {}...", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
        adapter.start_scan(filter.clone()).await?;
    }

    Ok(adapters)
}

async fn stop_scanning(adapters: &[Adapter]) {
    for adapter in adapters {
        if let Err(err) = adapter.stop_scan().await {
            debug!("Failed to stop scanning: {:?}", err);
        }
    }
}

async fn find_devices(adapters: &[Adapter], name_prefix: &str) -> Vec<BtleplugTransport> {
    let mut found = Vec::new();

    for adapter in adapters {
        let peripherals = match adapter.peripherals().await {
            Ok(v) => v,
            Err(err) => {
                warn!("Failed to query BLE adapter for peripherals: {}", err);
                continue;
            },
        };

        for peripheral in peripherals {
            match peripheral.properties().await {
                Err(err) => {
                    warn!("Could not query peripheral for properties: {:?}", err);
                },
                Ok(None) => {
                    debug!("Peripheral has no properties");
                },
                Ok(Some(properties)) => {
                    if is_nuimo(&properties, name_prefix) {
                        info!(
                            "Found device {} {}",
                            properties.address,
                            properties.local_name.unwrap_or(String::from("NONE")),
                        );
                        found.push(BtleplugTransport::new(adapter.clone(), peripheral));
                    }
                }
            }
        }
    }

    found
}

/// Scans all adapters for up to `duration` and returns every device found, ready to open a
/// [`crate::device::session::ConnectionSession`] against. Returns as soon as at least one device
/// has been seen.
pub async fn scan(manager: &Manager, name_prefix: &str, duration: Duration) -> Result<Vec<BtleplugTransport>, DeviceError> {
    let adapters = start_scanning(manager).await?;
    let deadline = Instant::now() + duration;

    let found = loop {
        let found = find_devices(&adapters, name_prefix).await;
        if !found.is_empty() || Instant::now() >= deadline {
            break found;
        }

        sleep(Duration::from_millis(SCAN_POLL_DELAY)).await;
    };

    stop_scanning(&adapters).await;
    if found.is_empty() {
        debug!("No peripherals matched");
    }
    Ok(found)
}
