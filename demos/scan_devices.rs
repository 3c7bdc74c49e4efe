//! Scan for nearby BLE peripherals and print their addresses.
//!
//! Run with: `cargo run --example scan_devices -- [seconds]`

use mijia_ble_session::ble::scanner::DEFAULT_SCAN_DURATION;
use mijia_ble_session::{BleScanner, Result};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("mijia_ble_session=info".parse().unwrap()),
        )
        .init();

    let duration = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_SCAN_DURATION);

    let scanner = BleScanner::new().await?;
    let devices = scanner.scan(duration).await?;

    println!("\n{:<20} {:<8} {:>6}  Name", "Address", "Type", "RSSI");
    println!("{}", "-".repeat(50));

    for device in devices {
        println!(
            "{:<20} {:<8} {:>6}  {}",
            device.address.address(),
            device.address.address_type().to_string(),
            device
                .rssi
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string()),
            device.local_name.as_deref().unwrap_or("")
        );
    }

    Ok(())
}
