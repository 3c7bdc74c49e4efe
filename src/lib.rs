// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # mijia-ble-session
//!
//! A client-side session layer for Bluetooth Low Energy sensors, built for
//! the Xiaomi Mijia (MJ_HT_V1) temperature and humidity sensor.
//!
//! The crate owns the part between a BLE host stack and a typed reading:
//! one exclusive connection at a time on the shared radio, handle-addressed
//! reads and writes, and bounded waits for the notification the sensor pushes
//! after it is told to start reporting.
//!
//! ## Features
//!
//! - **Exclusive Sessions**: A process-wide radio lock hands out one
//!   connection at a time; every exit path disconnects before unlocking
//! - **Notification Waits**: A callback-driven notification becomes a single
//!   awaitable result with a deadline
//! - **Pluggable Parsers**: Payload formats are [`PayloadParser`]
//!   implementations chosen by the caller
//! - **Discovery**: Bounded scans for nearby peripherals
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mijia_ble_session::{BleScanner, PeripheralAddress, Result, SensorReader};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // The adapter has to have seen the sensor before it can connect
//!     let scanner = BleScanner::new().await?;
//!     scanner.scan(Duration::from_secs(5)).await?;
//!
//!     let reader = SensorReader::with_system_adapter().await?;
//!     let reading = reader
//!         .read_sensor(&PeripheralAddress::new("4C:65:A8:D0:12:34"))
//!         .await?;
//!
//!     println!(
//!         "{:.1}°C, {:.1}%, battery {}%",
//!         reading.temperature(),
//!         reading.humidity(),
//!         reading.battery_percent()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Errors
//!
//! Nothing is retried. Every failure surfaces as an [`Error`] whose
//! [`ErrorKind`] tells connection failures, link I/O failures, notification
//! timeouts and parse failures apart.
//!
//! ## Platform Notes
//!
//! ### Linux
//! Requires BlueZ. Scanning may need the `bluetooth` group or root.
//!
//! ### macOS
//! Peripheral addresses are not exposed by CoreBluetooth, so address-based
//! sessions only work on Linux and Windows.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data and config types

// Public modules
pub mod ble;
pub mod config;
pub mod data;
pub mod error;
pub mod protocol;
pub mod sensor;

// Re-exports for convenience
pub use error::{Error, ErrorKind, Result};
pub use sensor::SensorReader;

pub use ble::{
    AttributeHandle, AttributeMap, BleHost, BleScanner, BtleplugHost, ConnectionState,
    DeviceSession, DiscoveredDevice, LinkHandle, NotificationEvent, NotificationHandler,
    RadioLock, Session, SessionGuard, WaitOutcome,
};
pub use config::{SensorConfig, SessionConfig};
pub use data::{AddressType, PeripheralAddress, SensorReading};
pub use protocol::{FixedOffsetPayloadParser, FnPayloadParser, PayloadParser, TextPayloadParser};
