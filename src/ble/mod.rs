//! BLE communication module.
//!
//! This module provides the session layer over a BLE host stack: exclusive
//! sessions, handle-addressed reads and writes, bounded notification waits,
//! and the btleplug-backed host and scanner.

pub mod btleplug_host;
pub mod handles;
pub mod host;
pub mod notification;
pub mod scanner;
pub mod session;

pub use btleplug_host::BtleplugHost;
pub use handles::*;
pub use host::{BleHost, LinkHandle, NotificationEvent, NotificationHandler};
pub use notification::{wait_for_notification, WaitOutcome};
pub use scanner::{BleScanner, DiscoveredDevice};
pub use session::{ConnectionState, DeviceSession, RadioLock, Session, SessionGuard};
