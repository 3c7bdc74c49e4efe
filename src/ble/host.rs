//! Contract of the BLE host stack a session runs on.
//!
//! The session layer never talks to a radio directly. It drives a
//! [`BleHost`], which owns link establishment, the attribute protocol and
//! event dispatch. [`BtleplugHost`](crate::ble::BtleplugHost) is the
//! production implementation.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

use crate::ble::handles::AttributeHandle;
use crate::data::PeripheralAddress;
use crate::error::Result;

/// Opaque identifier of an open link, minted by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkHandle(pub u64);

impl fmt::Display for LinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// Notification pushed by the peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    /// Handle the notification arrived on.
    pub handle: AttributeHandle,
    /// The notification payload, exactly as received.
    pub payload: Bytes,
}

impl NotificationEvent {
    /// Create a new notification event.
    pub fn new(handle: AttributeHandle, payload: impl Into<Bytes>) -> Self {
        Self {
            handle,
            payload: payload.into(),
        }
    }
}

/// Callback the host invokes from its event dispatch.
///
/// `Err` reports a transport failure on the link while notifications are armed.
pub type NotificationHandler = Box<dyn Fn(Result<NotificationEvent>) + Send + Sync>;

/// A BLE host stack able to serve one link at a time per address.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BleHost: Send + Sync {
    /// Open a link-layer connection.
    ///
    /// Fails with [`Error::ConnectionFailed`](crate::Error::ConnectionFailed)
    /// when the device is unreachable or the address type is invalid.
    async fn connect(&self, address: &PeripheralAddress) -> Result<LinkHandle>;

    /// Close a link. The handle is invalid afterwards whatever the outcome.
    ///
    /// Closing a link that is already closed succeeds. A close that was
    /// cancelled before it finished may be issued again.
    async fn disconnect(&self, link: LinkHandle) -> Result<()>;

    /// Read an attribute value.
    async fn read_attribute(&self, link: LinkHandle, handle: AttributeHandle) -> Result<Vec<u8>>;

    /// Write an attribute value.
    async fn write_attribute(
        &self,
        link: LinkHandle,
        handle: AttributeHandle,
        value: &[u8],
        require_response: bool,
    ) -> Result<()>;

    /// Install (`Some`) or remove (`None`) the notification callback for a link.
    async fn set_notification_handler(
        &self,
        link: LinkHandle,
        handler: Option<NotificationHandler>,
    ) -> Result<()>;
}
