//! Data structures for sensor sessions.
//!
//! This module contains the peripheral addressing types and the typed
//! reading produced by a sensor session.

pub mod address;
pub mod reading;

pub use address::{AddressType, PeripheralAddress};
pub use reading::SensorReading;
