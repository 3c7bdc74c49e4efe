//! Sensor reading data structure.

/// One reading taken from a temperature/humidity sensor.
///
/// Produced once per session by [`SensorReader`](crate::SensorReader) and
/// never modified afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorReading {
    battery_percent: u8,
    temperature: f64,
    humidity: f64,
}

impl SensorReading {
    /// Create a new reading.
    pub fn new(battery_percent: u8, temperature: f64, humidity: f64) -> Self {
        Self {
            battery_percent,
            temperature,
            humidity,
        }
    }

    /// Battery level, 0-100.
    pub fn battery_percent(&self) -> u8 {
        self.battery_percent
    }

    /// Temperature in degrees Celsius.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Temperature in degrees Fahrenheit.
    pub fn temperature_fahrenheit(&self) -> f64 {
        self.temperature * 9.0 / 5.0 + 32.0
    }

    /// Relative humidity in percent.
    pub fn humidity(&self) -> f64 {
        self.humidity
    }
}
