//! BLE scanning functionality.
//!
//! Discovers nearby peripherals so their addresses can be handed to a
//! session. Scanning is separate from the session core and does not take the
//! radio lock.

use btleplug::api::{
    AddressType as BtAddressType, Central, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager};
use std::time::Duration;
use tracing::{debug, info};

use crate::data::{AddressType, PeripheralAddress};
use crate::error::{Error, Result};

/// Default scan duration.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(10);

/// Get the system's first Bluetooth adapter.
///
/// # Errors
///
/// Returns [`Error::BluetoothUnavailable`] if there is no usable adapter.
pub async fn default_adapter() -> Result<Adapter> {
    let manager = Manager::new()
        .await
        .map_err(|_e| Error::BluetoothUnavailable)?;

    let adapters = manager
        .adapters()
        .await
        .map_err(|_e| Error::BluetoothUnavailable)?;

    let adapter = adapters
        .into_iter()
        .next()
        .ok_or(Error::BluetoothUnavailable)?;

    info!(
        "Using Bluetooth adapter: {:?}",
        adapter.adapter_info().await.ok()
    );

    Ok(adapter)
}

/// A peripheral seen during a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredDevice {
    /// Address to open a session with.
    pub address: PeripheralAddress,
    /// Advertised local name, if any.
    pub local_name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
}

/// Map btleplug's address type; unknown types are treated as public.
fn address_type(address_type: Option<BtAddressType>) -> AddressType {
    match address_type {
        Some(BtAddressType::Random) => AddressType::Random,
        _ => AddressType::Public,
    }
}

/// BLE scanner for discovering peripherals.
pub struct BleScanner {
    adapter: Adapter,
}

impl BleScanner {
    /// Create a new BLE scanner.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        Ok(Self::with_adapter(default_adapter().await?))
    }

    /// Create a new BLE scanner with a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Scan for `duration` and return every peripheral the adapter knows of.
    ///
    /// May require elevated privileges on Linux.
    pub async fn scan(&self, duration: Duration) -> Result<Vec<DiscoveredDevice>> {
        info!("Scanning for devices...");

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::io)?;

        tokio::time::sleep(duration).await;

        self.adapter.stop_scan().await.map_err(Error::io)?;

        let peripherals = self.adapter.peripherals().await.map_err(Error::io)?;
        let mut devices = Vec::with_capacity(peripherals.len());

        for peripheral in peripherals {
            let properties = match peripheral.properties().await {
                Ok(Some(p)) => p,
                Ok(None) => continue,
                Err(e) => {
                    debug!("Failed to get properties of {:?}: {}", peripheral.id(), e);
                    continue;
                }
            };

            let device = DiscoveredDevice {
                address: PeripheralAddress::with_type(
                    properties.address.to_string(),
                    address_type(properties.address_type),
                ),
                local_name: properties.local_name,
                rssi: properties.rssi,
            };

            info!(
                "Discovered device: {} (RSSI={} dB{})",
                device.address,
                device
                    .rssi
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "?".to_string()),
                device
                    .local_name
                    .as_deref()
                    .map(|n| format!(", {}", n))
                    .unwrap_or_default()
            );

            devices.push(device);
        }

        info!("Found {} devices.", devices.len());

        Ok(devices)
    }
}
