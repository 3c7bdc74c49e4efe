//! Bounded waits for a single notification.
//!
//! The host delivers notifications through a callback from its own event
//! dispatch. A wait turns that into one awaitable result: the callback fills
//! a one-shot slot, and the waiting task takes whatever lands there first or
//! gives up at the deadline.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, trace, warn};

use crate::ble::handles::{AttributeHandle, ENABLE_NOTIFICATIONS};
use crate::ble::host::{NotificationEvent, NotificationHandler};
use crate::ble::session::{link_error, Session};
use crate::error::{Error, Result};

/// Result of a notification wait that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The first notification received during the wait.
    Notification(NotificationEvent),
    /// The deadline passed without a notification.
    TimedOut,
}

impl WaitOutcome {
    /// Get the event, if one arrived.
    pub fn notification(self) -> Option<NotificationEvent> {
        match self {
            Self::Notification(event) => Some(event),
            Self::TimedOut => None,
        }
    }

    /// Check if the wait timed out.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

type Slot = Arc<Mutex<Option<oneshot::Sender<Result<NotificationEvent>>>>>;

/// Build a callback that forwards only the first thing it is called with.
///
/// The waiter keeps its own clone of `slot`, so a host that drops the
/// callback without calling it leaves the receiver pending until the deadline.
fn one_shot_handler(slot: Slot) -> NotificationHandler {
    Box::new(move |event| {
        if let Some(tx) = slot.lock().take() {
            let _ = tx.send(event);
        }
    })
}

/// Enable notifications on `enable_handle` and wait up to `timeout` for one.
///
/// The first notification on any handle of the link ends the wait; callers
/// that care about a particular handle check [`NotificationEvent::handle`].
/// A transport error reported during the wait fails it with
/// [`Error::Io`]. The handler is removed again before returning.
pub async fn wait_for_notification(
    session: &Session,
    enable_handle: AttributeHandle,
    timeout: Duration,
) -> Result<WaitOutcome> {
    let link = session.link()?;
    let host = session.host();

    let (tx, rx) = oneshot::channel();
    let slot: Slot = Arc::new(Mutex::new(Some(tx)));

    debug!(
        "Will wait {:?} for data from {}...",
        timeout,
        session.address()
    );

    host.set_notification_handler(link, Some(one_shot_handler(slot.clone())))
        .await
        .map_err(link_error)?;

    let outcome = arm_and_wait(session, enable_handle, timeout, rx).await;

    if let Err(e) = host.set_notification_handler(link, None).await {
        warn!("Failed to remove notification handler on {}: {}", link, e);
    }
    drop(slot);

    outcome
}

async fn arm_and_wait(
    session: &Session,
    enable_handle: AttributeHandle,
    timeout: Duration,
    rx: oneshot::Receiver<Result<NotificationEvent>>,
) -> Result<WaitOutcome> {
    session
        .write_handle(enable_handle, &ENABLE_NOTIFICATIONS, true)
        .await?;

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(Ok(event))) => {
            trace!(
                "Notification on handle {}: {} bytes",
                event.handle,
                event.payload.len()
            );
            Ok(WaitOutcome::Notification(event))
        }
        Ok(Ok(Err(e))) => {
            error!("Couldn't receive data: {}", e);
            Err(link_error(e))
        }
        Ok(Err(_)) => Err(Error::io("notification channel closed")),
        Err(_) => {
            debug!("No notification within {:?}", timeout);
            Ok(WaitOutcome::TimedOut)
        }
    }
}

impl Session {
    /// Enable notifications on `enable_handle` and wait up to `timeout` for one.
    ///
    /// See [`wait_for_notification`].
    pub async fn wait_for_notification(
        &self,
        enable_handle: AttributeHandle,
        timeout: Duration,
    ) -> Result<WaitOutcome> {
        wait_for_notification(self, enable_handle, timeout).await
    }
}
