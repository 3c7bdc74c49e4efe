//! Take one reading from a Mijia temperature/humidity sensor.
//!
//! Run with: `cargo run --example read_sensor -- <MAC> [--random] [--fixed-offset]`

use mijia_ble_session::ble::scanner::DEFAULT_SCAN_DURATION;
use mijia_ble_session::{
    AttributeMap, BleHost, BleScanner, BtleplugHost, DeviceSession, ErrorKind,
    FixedOffsetPayloadParser, PayloadParser, PeripheralAddress, Result, SensorConfig,
    SensorReader, TextPayloadParser,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

async fn read<P: PayloadParser>(
    sessions: DeviceSession,
    parser: P,
    address: &PeripheralAddress,
) -> Result<()> {
    let reader = SensorReader::with_parser(sessions, parser)
        .with_config(SensorConfig::default().with_timeout(Duration::from_secs(30)));

    match reader.read_sensor(address).await {
        Ok(reading) => {
            println!("Sensor:      {}", address);
            println!(
                "Temperature: {:.1}°C ({:.1}°F)",
                reading.temperature(),
                reading.temperature_fahrenheit()
            );
            println!("Humidity:    {:.1}%", reading.humidity());
            println!("Battery:     {}%", reading.battery_percent());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::TimedOut => {
            println!("Sensor {} did not report data in time", address);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("mijia_ble_session=debug".parse().unwrap()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(mac) = args.iter().find(|a| !a.starts_with("--")) else {
        eprintln!("usage: read_sensor <MAC> [--random] [--fixed-offset]");
        std::process::exit(2);
    };

    let address = if args.iter().any(|a| a == "--random") {
        PeripheralAddress::random(mac.as_str())
    } else {
        PeripheralAddress::new(mac.as_str())
    };

    // The adapter only connects to peripherals it has seen advertising
    let scanner = BleScanner::new().await?;
    scanner.scan(DEFAULT_SCAN_DURATION).await?;

    let host: Arc<dyn BleHost> = Arc::new(BtleplugHost::with_adapter(
        scanner.adapter().clone(),
        AttributeMap::mj_ht_v1(),
    ));
    let sessions = DeviceSession::new(host);

    if args.iter().any(|a| a == "--fixed-offset") {
        read(sessions, FixedOffsetPayloadParser, &address).await
    } else {
        read(sessions, TextPayloadParser, &address).await
    }
}
