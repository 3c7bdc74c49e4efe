//! Session and sensor configuration.

use std::time::Duration;

use crate::ble::handles::{AttributeHandle, HANDLE_BATTERY_LEVEL, HANDLE_SENSOR_DATA};

/// Default timeout for connecting and for waiting on a notification.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for opening a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionConfig {
    /// Upper bound on link establishment.
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SessionConfig {
    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Settings for a [`SensorReader`](crate::SensorReader).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorConfig {
    /// Settings for the underlying session.
    pub session: SessionConfig,
    /// How long to wait for the sensor to push its data.
    pub notification_timeout: Duration,
    /// Handle holding the battery level.
    pub battery_handle: AttributeHandle,
    /// Handle that enables data notifications when written.
    pub enable_handle: AttributeHandle,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            notification_timeout: DEFAULT_TIMEOUT,
            battery_handle: HANDLE_BATTERY_LEVEL,
            enable_handle: HANDLE_SENSOR_DATA,
        }
    }
}

impl SensorConfig {
    /// Use the same timeout for connecting and for the notification wait.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.session.connect_timeout = timeout;
        self.notification_timeout = timeout;
        self
    }

    /// Set the notification wait timeout only.
    pub fn with_notification_timeout(mut self, timeout: Duration) -> Self {
        self.notification_timeout = timeout;
        self
    }

    /// Set the battery level handle.
    pub fn with_battery_handle(mut self, handle: AttributeHandle) -> Self {
        self.battery_handle = handle;
        self
    }

    /// Set the notification enable handle.
    pub fn with_enable_handle(mut self, handle: AttributeHandle) -> Self {
        self.enable_handle = handle;
        self
    }
}
