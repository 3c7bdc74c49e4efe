//! Scripted in-memory host stack shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use mijia_ble_session::{
    AttributeHandle, BleHost, Error, LinkHandle, NotificationEvent, NotificationHandler,
    PeripheralAddress, Result,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// What the fake peripheral does once notifications are enabled.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Never notify.
    Never,
    /// Notify once after a delay.
    After(Duration, AttributeHandle, Vec<u8>),
    /// Report a transport failure after a delay.
    LinkLost(Duration),
}

#[derive(Default)]
struct State {
    next_link: u64,
    open: HashSet<LinkHandle>,
    max_open: usize,
    connects: usize,
    disconnects: usize,
    reads: Vec<AttributeHandle>,
    writes: Vec<(AttributeHandle, Vec<u8>)>,
    handlers: HashMap<LinkHandle, Arc<NotificationHandler>>,
}

/// In-memory [`BleHost`] that records every call.
pub struct FakeHost {
    state: Mutex<State>,
    attributes: HashMap<AttributeHandle, Vec<u8>>,
    delivery: Delivery,
    connect_error: Option<String>,
    connect_delay: Duration,
    setup_delay: Duration,
    disconnect_delay: Duration,
}

impl FakeHost {
    pub fn new(delivery: Delivery) -> Self {
        Self {
            state: Mutex::new(State::default()),
            attributes: HashMap::new(),
            delivery,
            connect_error: None,
            connect_delay: Duration::ZERO,
            setup_delay: Duration::ZERO,
            disconnect_delay: Duration::ZERO,
        }
    }

    /// A sensor with the given battery read response that notifies `payload`.
    pub fn sensor(battery: &[u8], payload: &[u8]) -> Self {
        Self::new(Delivery::After(
            Duration::from_millis(10),
            AttributeHandle(0x000e),
            payload.to_vec(),
        ))
        .with_attribute(AttributeHandle(0x0018), battery)
    }

    pub fn with_attribute(mut self, handle: AttributeHandle, value: &[u8]) -> Self {
        self.attributes.insert(handle, value.to_vec());
        self
    }

    pub fn unreachable(mut self, reason: &str) -> Self {
        self.connect_error = Some(reason.to_string());
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Open the link at once, then take `delay` before reporting it.
    pub fn with_setup_delay(mut self, delay: Duration) -> Self {
        self.setup_delay = delay;
        self
    }

    /// Take `delay` before a disconnect closes the link.
    pub fn with_disconnect_delay(mut self, delay: Duration) -> Self {
        self.disconnect_delay = delay;
        self
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().disconnects
    }

    pub fn open_links(&self) -> usize {
        self.state.lock().open.len()
    }

    pub fn max_open_links(&self) -> usize {
        self.state.lock().max_open
    }

    pub fn reads(&self) -> Vec<AttributeHandle> {
        self.state.lock().reads.clone()
    }

    pub fn writes(&self) -> Vec<(AttributeHandle, Vec<u8>)> {
        self.state.lock().writes.clone()
    }

    fn check_open(&self, link: LinkHandle) -> Result<()> {
        if self.state.lock().open.contains(&link) {
            Ok(())
        } else {
            Err(Error::io(format!("{} is not open", link)))
        }
    }

    fn schedule_delivery(&self, link: LinkHandle) {
        let Some(handler) = self.state.lock().handlers.get(&link).cloned() else {
            return;
        };

        let (delay, event) = match &self.delivery {
            Delivery::Never => return,
            Delivery::After(delay, handle, payload) => (
                *delay,
                Ok(NotificationEvent::new(*handle, payload.clone())),
            ),
            Delivery::LinkLost(delay) => (*delay, Err(Error::io("link lost"))),
        };

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            handler(event);
        });
    }
}

#[async_trait]
impl BleHost for FakeHost {
    async fn connect(&self, address: &PeripheralAddress) -> Result<LinkHandle> {
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }

        if let Some(reason) = &self.connect_error {
            return Err(Error::connection(address.address(), reason));
        }

        let link = {
            let mut state = self.state.lock();
            state.connects += 1;
            state.next_link += 1;
            let link = LinkHandle(state.next_link);
            state.open.insert(link);
            state.max_open = state.max_open.max(state.open.len());
            link
        };

        if !self.setup_delay.is_zero() {
            tokio::time::sleep(self.setup_delay).await;
        }

        Ok(link)
    }

    async fn disconnect(&self, link: LinkHandle) -> Result<()> {
        if !self.disconnect_delay.is_zero() {
            tokio::time::sleep(self.disconnect_delay).await;
        }

        let mut state = self.state.lock();
        state.disconnects += 1;
        state.handlers.remove(&link);
        state.open.remove(&link);
        Ok(())
    }

    async fn read_attribute(&self, link: LinkHandle, handle: AttributeHandle) -> Result<Vec<u8>> {
        self.check_open(link)?;
        self.state.lock().reads.push(handle);

        self.attributes
            .get(&handle)
            .cloned()
            .ok_or_else(|| Error::io(format!("attribute {} not found", handle)))
    }

    async fn write_attribute(
        &self,
        link: LinkHandle,
        handle: AttributeHandle,
        value: &[u8],
        _require_response: bool,
    ) -> Result<()> {
        self.check_open(link)?;
        self.state.lock().writes.push((handle, value.to_vec()));

        if value == [0x01, 0x00] {
            self.schedule_delivery(link);
        }

        Ok(())
    }

    async fn set_notification_handler(
        &self,
        link: LinkHandle,
        handler: Option<NotificationHandler>,
    ) -> Result<()> {
        self.check_open(link)?;

        let mut state = self.state.lock();
        match handler {
            Some(handler) => {
                state.handlers.insert(link, Arc::new(handler));
            }
            None => {
                state.handlers.remove(&link);
            }
        }

        Ok(())
    }
}
