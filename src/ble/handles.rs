//! Attribute handles and the characteristics they map to.
//!
//! Handles are fixed by the peripheral's GATT table. The values here are the
//! ones exposed by the Xiaomi Mijia (MJ_HT_V1) temperature/humidity sensor.

use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// A 16-bit ATT handle identifying an attribute on the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeHandle(pub u16);

impl AttributeHandle {
    /// Placeholder for notifications whose source handle the stack could not resolve.
    pub const UNKNOWN: AttributeHandle = AttributeHandle(0x0000);

    /// Raw handle value.
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for AttributeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

impl From<u16> for AttributeHandle {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

/// Battery level characteristic value handle.
pub const HANDLE_BATTERY_LEVEL: AttributeHandle = AttributeHandle(0x0018);

/// Sensor data client configuration handle (write here to enable notifications).
pub const HANDLE_SENSOR_DATA: AttributeHandle = AttributeHandle(0x0010);

/// Sensor data characteristic value handle (notifications arrive on this one).
pub const HANDLE_SENSOR_DATA_VALUE: AttributeHandle = AttributeHandle(0x000e);

/// Client configuration value enabling notifications (0x0001, little-endian).
pub const ENABLE_NOTIFICATIONS: [u8; 2] = [0x01, 0x00];

/// Client configuration value disabling notifications.
pub const DISABLE_NOTIFICATIONS: [u8; 2] = [0x00, 0x00];

/// Standard Battery Level characteristic UUID (0x2A19).
pub const BATTERY_LEVEL_UUID: Uuid = Uuid::from_u128(0x0000_2a19_0000_1000_8000_00805f9b34fb);

/// Mijia sensor data characteristic UUID (Notify).
pub const MJ_HT_DATA_UUID: Uuid = Uuid::from_u128(0x226c_aa55_6476_4566_7562_66734470666d);

/// What a handle refers to on the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeBinding {
    /// The value of a characteristic.
    Value(Uuid),
    /// The client characteristic configuration descriptor of a characteristic.
    ClientConfig(Uuid),
}

impl AttributeBinding {
    /// The characteristic this binding belongs to.
    pub fn characteristic(&self) -> Uuid {
        match self {
            Self::Value(uuid) | Self::ClientConfig(uuid) => *uuid,
        }
    }
}

/// Maps ATT handles to characteristics for stacks that address by UUID.
#[derive(Debug, Clone, Default)]
pub struct AttributeMap {
    bindings: HashMap<AttributeHandle, AttributeBinding>,
}

impl AttributeMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle layout of the Mijia MJ_HT_V1 sensor.
    pub fn mj_ht_v1() -> Self {
        Self::new()
            .with_binding(HANDLE_BATTERY_LEVEL, AttributeBinding::Value(BATTERY_LEVEL_UUID))
            .with_binding(HANDLE_SENSOR_DATA_VALUE, AttributeBinding::Value(MJ_HT_DATA_UUID))
            .with_binding(HANDLE_SENSOR_DATA, AttributeBinding::ClientConfig(MJ_HT_DATA_UUID))
    }

    /// Add or replace a binding.
    pub fn with_binding(mut self, handle: AttributeHandle, binding: AttributeBinding) -> Self {
        self.bindings.insert(handle, binding);
        self
    }

    /// Look up what a handle refers to.
    pub fn binding(&self, handle: AttributeHandle) -> Option<AttributeBinding> {
        self.bindings.get(&handle).copied()
    }

    /// Find the value handle of a characteristic.
    pub fn value_handle(&self, uuid: &Uuid) -> Option<AttributeHandle> {
        self.bindings
            .iter()
            .find(|(_, binding)| **binding == AttributeBinding::Value(*uuid))
            .map(|(handle, _)| *handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_display() {
        assert_eq!(HANDLE_BATTERY_LEVEL.to_string(), "0x0018");
        assert_eq!(HANDLE_SENSOR_DATA.to_string(), "0x0010");
    }

    #[test]
    fn test_uuid_format() {
        assert!(BATTERY_LEVEL_UUID.to_string().contains("2a19"));
        assert_eq!(
            MJ_HT_DATA_UUID.to_string(),
            "226caa55-6476-4566-7562-66734470666d"
        );
    }

    #[test]
    fn test_mj_ht_v1_map() {
        let map = AttributeMap::mj_ht_v1();
        assert_eq!(
            map.binding(HANDLE_BATTERY_LEVEL),
            Some(AttributeBinding::Value(BATTERY_LEVEL_UUID))
        );
        assert_eq!(
            map.binding(HANDLE_SENSOR_DATA),
            Some(AttributeBinding::ClientConfig(MJ_HT_DATA_UUID))
        );
        assert_eq!(map.value_handle(&MJ_HT_DATA_UUID), Some(HANDLE_SENSOR_DATA_VALUE));
        assert_eq!(map.binding(AttributeHandle(0x0042)), None);
    }

    #[test]
    fn test_enable_value_is_little_endian_one() {
        assert_eq!(u16::from_le_bytes(ENABLE_NOTIFICATIONS), 0x0001);
    }
}
