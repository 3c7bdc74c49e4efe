//! [`BleHost`] implementation on top of btleplug.
//!
//! btleplug addresses characteristics by UUID rather than by ATT handle, so
//! handles are resolved through an [`AttributeMap`]. Writing the enable value
//! to a client configuration handle subscribes to the characteristic.

use async_trait::async_trait;
use btleplug::api::{
    AddressType as BtAddressType, BDAddr, Central, Characteristic, Peripheral as _, WriteType,
};
use btleplug::platform::{Adapter, Peripheral};
use futures::stream::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::ble::handles::{
    AttributeBinding, AttributeHandle, AttributeMap, DISABLE_NOTIFICATIONS, ENABLE_NOTIFICATIONS,
};
use crate::ble::host::{BleHost, LinkHandle, NotificationEvent, NotificationHandler};
use crate::ble::scanner::default_adapter;
use crate::data::{AddressType, PeripheralAddress};
use crate::error::{Error, Result};

/// An open link.
struct Link {
    peripheral: Peripheral,
    listener: Option<JoinHandle<()>>,
}

impl Link {
    fn stop_listener(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

fn matches_address_type(expected: AddressType, actual: BtAddressType) -> bool {
    matches!(
        (expected, actual),
        (AddressType::Public, BtAddressType::Public) | (AddressType::Random, BtAddressType::Random)
    )
}

/// BLE host backed by a btleplug adapter.
///
/// Peripherals must have been seen by the adapter (see
/// [`BleScanner`](crate::ble::BleScanner)) before they can be connected.
/// [`connect`](BleHost::connect) is not cancel-safe on its own: dropping it
/// during service discovery leaves the peripheral connected without a link
/// handle. [`Session`](crate::ble::Session) runs it as a separate task for
/// that reason.
pub struct BtleplugHost {
    adapter: Adapter,
    attributes: AttributeMap,
    links: Mutex<HashMap<LinkHandle, Link>>,
    next_link: AtomicU64,
}

impl BtleplugHost {
    /// Create a host on the system's first Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new(attributes: AttributeMap) -> Result<Self> {
        Ok(Self::with_adapter(default_adapter().await?, attributes))
    }

    /// Create a host on a specific adapter.
    pub fn with_adapter(adapter: Adapter, attributes: AttributeMap) -> Self {
        Self {
            adapter,
            attributes,
            links: Mutex::new(HashMap::new()),
            next_link: AtomicU64::new(1),
        }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Get the handle map.
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    fn peripheral(&self, link: LinkHandle) -> Result<Peripheral> {
        self.links
            .lock()
            .get(&link)
            .map(|l| l.peripheral.clone())
            .ok_or(Error::NotConnected)
    }

    fn binding(&self, handle: AttributeHandle) -> Result<AttributeBinding> {
        self.attributes
            .binding(handle)
            .ok_or_else(|| Error::io(format!("handle {} is not mapped", handle)))
    }

    fn characteristic(peripheral: &Peripheral, uuid: Uuid) -> Result<Characteristic> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| Error::io(format!("characteristic {} not found", uuid)))
    }

    async fn find_peripheral(&self, address: &PeripheralAddress) -> Result<Peripheral> {
        let target: BDAddr = address
            .address()
            .parse()
            .map_err(|e| Error::connection(address.address(), format!("invalid address: {}", e)))?;

        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| Error::connection(address.address(), e))?;

        for peripheral in peripherals {
            let Ok(Some(properties)) = peripheral.properties().await else {
                continue;
            };

            if properties.address != target {
                continue;
            }

            if let Some(actual) = properties.address_type {
                if !matches_address_type(address.address_type(), actual) {
                    return Err(Error::connection(
                        address.address(),
                        format!(
                            "invalid address type {}, device advertises {:?}",
                            address.address_type(),
                            actual
                        ),
                    ));
                }
            }

            return Ok(peripheral);
        }

        Err(Error::connection(
            address.address(),
            "device not found, scan for it first",
        ))
    }
}

#[async_trait]
impl BleHost for BtleplugHost {
    async fn connect(&self, address: &PeripheralAddress) -> Result<LinkHandle> {
        let peripheral = self.find_peripheral(address).await?;

        peripheral
            .connect()
            .await
            .map_err(|e| Error::connection(address.address(), e))?;

        if let Err(e) = peripheral.discover_services().await {
            if let Err(disconnect_err) = peripheral.disconnect().await {
                warn!(
                    "Failed to disconnect from {} after discovery failure: {}",
                    address, disconnect_err
                );
            }
            return Err(Error::connection(
                address.address(),
                format!("service discovery failed: {}", e),
            ));
        }

        let link = LinkHandle(self.next_link.fetch_add(1, Ordering::SeqCst));
        info!("Connected to {} as {}", address, link);

        self.links.lock().insert(
            link,
            Link {
                peripheral,
                listener: None,
            },
        );

        Ok(link)
    }

    async fn disconnect(&self, link: LinkHandle) -> Result<()> {
        // The entry stays until the peripheral answers so that a disconnect
        // cancelled halfway can be issued again.
        let peripheral = {
            let mut links = self.links.lock();
            let Some(entry) = links.get_mut(&link) else {
                return Ok(());
            };
            entry.stop_listener();
            entry.peripheral.clone()
        };

        let result = peripheral.disconnect().await.map_err(Error::io);
        self.links.lock().remove(&link);
        result?;

        info!("Disconnected {}", link);

        Ok(())
    }

    async fn read_attribute(&self, link: LinkHandle, handle: AttributeHandle) -> Result<Vec<u8>> {
        let peripheral = self.peripheral(link)?;

        let uuid = match self.binding(handle)? {
            AttributeBinding::Value(uuid) => uuid,
            AttributeBinding::ClientConfig(uuid) => {
                return Err(Error::io(format!(
                    "handle {} is the client configuration of {} and cannot be read",
                    handle, uuid
                )))
            }
        };

        let characteristic = Self::characteristic(&peripheral, uuid)?;
        let data = peripheral.read(&characteristic).await.map_err(Error::io)?;

        trace!("Read {} bytes from characteristic {}", data.len(), uuid);

        Ok(data)
    }

    async fn write_attribute(
        &self,
        link: LinkHandle,
        handle: AttributeHandle,
        value: &[u8],
        require_response: bool,
    ) -> Result<()> {
        let peripheral = self.peripheral(link)?;

        match self.binding(handle)? {
            AttributeBinding::Value(uuid) => {
                let characteristic = Self::characteristic(&peripheral, uuid)?;
                let write_type = if require_response {
                    WriteType::WithResponse
                } else {
                    WriteType::WithoutResponse
                };

                peripheral
                    .write(&characteristic, value, write_type)
                    .await
                    .map_err(Error::io)?;

                trace!("Wrote {} bytes to characteristic {}", value.len(), uuid);
            }
            AttributeBinding::ClientConfig(uuid) => {
                let characteristic = Self::characteristic(&peripheral, uuid)?;

                if value == ENABLE_NOTIFICATIONS {
                    peripheral.subscribe(&characteristic).await.map_err(Error::io)?;
                    debug!("Subscribed to notifications from {}", uuid);
                } else if value == DISABLE_NOTIFICATIONS {
                    peripheral
                        .unsubscribe(&characteristic)
                        .await
                        .map_err(Error::io)?;
                    debug!("Unsubscribed from notifications from {}", uuid);
                } else {
                    return Err(Error::io(format!(
                        "unsupported client configuration value {:02X?} for handle {}",
                        value, handle
                    )));
                }
            }
        }

        Ok(())
    }

    async fn set_notification_handler(
        &self,
        link: LinkHandle,
        handler: Option<NotificationHandler>,
    ) -> Result<()> {
        let Some(handler) = handler else {
            if let Some(entry) = self.links.lock().get_mut(&link) {
                entry.stop_listener();
            }
            return Ok(());
        };

        let peripheral = self.peripheral(link)?;
        let mut notifications = peripheral.notifications().await.map_err(Error::io)?;
        let attributes = self.attributes.clone();

        let listener = tokio::spawn(async move {
            debug!("Notification listener started for {}", link);

            while let Some(notification) = notifications.next().await {
                let handle = attributes
                    .value_handle(&notification.uuid)
                    .unwrap_or(AttributeHandle::UNKNOWN);

                trace!(
                    "Notification from {} on handle {}: {:02X?}",
                    notification.uuid,
                    handle,
                    notification.value
                );

                handler(Ok(NotificationEvent::new(handle, notification.value)));
            }

            debug!("Notification stream for {} closed", link);
            handler(Err(Error::io("notification stream closed")));
        });

        let mut links = self.links.lock();
        match links.get_mut(&link) {
            Some(entry) => {
                entry.stop_listener();
                entry.listener = Some(listener);
                Ok(())
            }
            None => {
                listener.abort();
                Err(Error::NotConnected)
            }
        }
    }
}

impl Drop for BtleplugHost {
    fn drop(&mut self) {
        for entry in self.links.lock().values_mut() {
            entry.stop_listener();
        }
    }
}
