//! Adapter discovery and peripheral lookup.

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::error::{Error, Result};

/// How often the adapter's peripheral list is re-checked while scanning.
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Get the first Bluetooth adapter on the system.
///
/// # Errors
///
/// Returns an error if Bluetooth is not available.
pub async fn first_adapter() -> Result<Adapter> {
    let manager = Manager::new()
        .await
        .map_err(|_e| Error::BluetoothUnavailable)?;

    let adapter = manager
        .adapters()
        .await
        .map_err(Error::Bluetooth)?
        .into_iter()
        .next()
        .ok_or(Error::BluetoothUnavailable)?;

    info!(
        "Using Bluetooth adapter: {:?}",
        adapter.adapter_info().await.ok()
    );

    Ok(adapter)
}

/// Compare a peripheral address with the configured one, ignoring case.
pub fn address_matches(found: &str, wanted: &str) -> bool {
    found.eq_ignore_ascii_case(wanted.trim())
}

/// Scan until a peripheral with `address` shows up or `wait` elapses.
pub async fn find_peripheral(
    adapter: &Adapter,
    address: &str,
    wait: Duration,
) -> Result<Option<Peripheral>> {
    adapter
        .start_scan(ScanFilter::default())
        .await
        .map_err(Error::Bluetooth)?;

    let deadline = Instant::now() + wait;
    let found = loop {
        let peripherals = adapter.peripherals().await.map_err(Error::Bluetooth)?;
        trace!("Adapter knows {} peripheral(s)", peripherals.len());

        if let Some(peripheral) = peripherals
            .into_iter()
            .find(|p| address_matches(&p.address().to_string(), address))
        {
            debug!("Found peripheral {}", address);
            break Some(peripheral);
        }

        if Instant::now() >= deadline {
            break None;
        }
        tokio::time::sleep(SCAN_POLL_INTERVAL).await;
    };

    if let Err(e) = adapter.stop_scan().await {
        debug!("Failed to stop scan: {}", e);
    }

    Ok(found)
}
