//! Temperature/humidity sensor reader.
//!
//! Takes one [`SensorReading`] per call: open an exclusive session, read the
//! battery level, wait for the sensor to push its measurement, parse it and
//! disconnect.

use std::sync::Arc;
use tracing::{debug, info};

use crate::ble::handles::AttributeMap;
use crate::ble::host::BleHost;
use crate::ble::notification::WaitOutcome;
use crate::ble::session::{DeviceSession, Session};
use crate::ble::BtleplugHost;
use crate::config::SensorConfig;
use crate::data::{PeripheralAddress, SensorReading};
use crate::error::{Error, Result};
use crate::protocol::{decode_battery_level, PayloadParser, TextPayloadParser};

/// Reads temperature, humidity and battery level from a sensor.
pub struct SensorReader<P = TextPayloadParser> {
    sessions: DeviceSession,
    parser: P,
    config: SensorConfig,
}

impl SensorReader<TextPayloadParser> {
    /// Create a reader over `host` with the default parser and settings.
    pub fn new(host: Arc<dyn BleHost>) -> Self {
        Self::with_parser(DeviceSession::new(host), TextPayloadParser)
    }

    /// Create a reader on the system's first Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn with_system_adapter() -> Result<Self> {
        let host = BtleplugHost::new(AttributeMap::mj_ht_v1()).await?;
        Ok(Self::new(Arc::new(host)))
    }
}

impl<P: PayloadParser> SensorReader<P> {
    /// Create a reader with a specific payload parser.
    pub fn with_parser(sessions: DeviceSession, parser: P) -> Self {
        Self {
            sessions,
            parser,
            config: SensorConfig::default(),
        }
    }

    /// Replace the settings.
    pub fn with_config(mut self, config: SensorConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the settings.
    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    /// Get the payload parser.
    pub fn parser(&self) -> &P {
        &self.parser
    }

    /// Take one reading from the sensor at `address`.
    ///
    /// Waits for the radio if another session holds it. Nothing is retried;
    /// any failure ends the reading and the session is disconnected before
    /// the error is returned. A missing notification fails with
    /// [`Error::Timeout`].
    pub async fn read_sensor(&self, address: &PeripheralAddress) -> Result<SensorReading> {
        let session = self
            .sessions
            .acquire(address.clone(), &self.config.session)
            .await?;

        let outcome = self.take_reading(&session).await;
        let reading = session.finish(outcome).await?;

        info!(
            "Read {}: {:.1}°C, {:.1}% humidity, battery {}%",
            address,
            reading.temperature(),
            reading.humidity(),
            reading.battery_percent()
        );

        Ok(reading)
    }

    async fn take_reading(&self, session: &Session) -> Result<SensorReading> {
        let battery = decode_battery_level(&session.read_handle(self.config.battery_handle).await?)?;
        debug!("Battery level of {}: {}%", session.address(), battery);

        let event = match session
            .wait_for_notification(self.config.enable_handle, self.config.notification_timeout)
            .await?
        {
            WaitOutcome::Notification(event) => event,
            WaitOutcome::TimedOut => return Err(Error::Timeout(self.config.notification_timeout)),
        };

        let (temperature, humidity) = self.parser.parse(&event.payload)?;

        Ok(SensorReading::new(battery, temperature, humidity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::handles::AttributeHandle;
    use crate::ble::host::{LinkHandle, MockBleHost, NotificationEvent};
    use crate::ble::session::RadioLock;
    use crate::error::ErrorKind;
    use crate::protocol::FixedOffsetPayloadParser;
    use std::time::Duration;

    fn notifying_host(battery: Vec<u8>, payload: &'static [u8]) -> MockBleHost {
        let mut host = MockBleHost::new();
        host.expect_connect().returning(|_| Ok(LinkHandle(9)));
        host.expect_disconnect().times(1).returning(|_| Ok(()));
        host.expect_read_attribute()
            .returning(move |_, _| Ok(battery.clone()));
        host.expect_write_attribute()
            .returning(|_, _, _, _| Ok(()));
        host.expect_set_notification_handler()
            .returning(move |_, handler| {
                if let Some(handler) = handler {
                    handler(Ok(NotificationEvent::new(AttributeHandle(0x000e), payload)));
                }
                Ok(())
            });
        host
    }

    fn reader<P: PayloadParser>(host: MockBleHost, parser: P) -> SensorReader<P> {
        SensorReader::with_parser(
            DeviceSession::with_radio_lock(Arc::new(host), RadioLock::new()),
            parser,
        )
        .with_config(SensorConfig::default().with_timeout(Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn test_read_sensor_with_fixed_offset_parser() {
        let host = notifying_host(vec![77], b"T=19.8 H=62.5\0");
        let reading = reader(host, FixedOffsetPayloadParser)
            .read_sensor(&PeripheralAddress::new("4C:65:A8:D0:12:34"))
            .await
            .unwrap();

        assert_eq!(reading, SensorReading::new(77, 19.8, 62.5));
    }

    #[tokio::test]
    async fn test_parse_failure_propagates_as_parse_error() {
        let host = notifying_host(vec![50], b"garbage");
        let err = reader(host, TextPayloadParser)
            .read_sensor(&PeripheralAddress::new("4C:65:A8:D0:12:34"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[tokio::test]
    async fn test_out_of_range_battery_aborts_reading() {
        let host = notifying_host(vec![200], b"T=19.8 H=62.5");
        let err = reader(host, TextPayloadParser)
            .read_sensor(&PeripheralAddress::new("4C:65:A8:D0:12:34"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
