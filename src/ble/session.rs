//! Exclusive device sessions.
//!
//! A [`Session`] owns at most one open link to one peripheral. All sessions
//! in a process share a single physical radio, so [`DeviceSession`] hands
//! them out one at a time behind a [`RadioLock`]. The returned
//! [`SessionGuard`] disconnects before it gives the radio back, on every exit
//! path.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::ble::handles::AttributeHandle;
use crate::ble::host::{BleHost, LinkHandle};
use crate::config::SessionConfig;
use crate::data::PeripheralAddress;
use crate::error::{Error, ErrorKind, Result};

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No link is open.
    #[default]
    Disconnected,
    /// A link is open and owned by the session.
    Connected,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Errors after a link is up are I/O failures, whatever the stack called them.
pub(crate) fn link_error(err: Error) -> Error {
    match err.kind() {
        ErrorKind::Connection => Error::io(err),
        _ => err,
    }
}

/// A connection to one peripheral.
///
/// Invariant: the session holds a [`LinkHandle`] iff it is
/// [`ConnectionState::Connected`].
pub struct Session {
    host: Arc<dyn BleHost>,
    address: PeripheralAddress,
    timeout: Duration,
    link: Option<LinkHandle>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address)
            .field("timeout", &self.timeout)
            .field("link", &self.link)
            .finish()
    }
}

impl Session {
    /// Create a disconnected session.
    pub fn new(host: Arc<dyn BleHost>, address: PeripheralAddress, timeout: Duration) -> Self {
        Self {
            host,
            address,
            timeout,
            link: None,
        }
    }

    /// The peripheral this session talks to.
    pub fn address(&self) -> &PeripheralAddress {
        &self.address
    }

    /// Connect timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        if self.link.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub(crate) fn host(&self) -> &Arc<dyn BleHost> {
        &self.host
    }

    pub(crate) fn link(&self) -> Result<LinkHandle> {
        self.link.ok_or(Error::NotConnected)
    }

    /// Open the link.
    ///
    /// A failed or timed out attempt leaves the session disconnected. If the
    /// host opens the link after the timeout, it is closed in the background.
    /// Calling this on a connected session is a no-op.
    pub async fn connect(&mut self) -> Result<()> {
        self.connect_holding(()).await
    }

    /// [`connect`](Self::connect), keeping `hold` alive until the attempt has
    /// settled.
    ///
    /// On success `hold` is handed back. On a timeout it moves into the
    /// cleanup task and is dropped only after a late link has been closed.
    pub(crate) async fn connect_holding<T>(&mut self, hold: T) -> Result<T>
    where
        T: Send + 'static,
    {
        if self.link.is_some() {
            debug!("Already connected to {}", self.address);
            return Ok(hold);
        }

        debug!("Connecting to {}...", self.address);

        // The attempt runs as its own task so a timeout never drops a
        // half-finished connect inside the host.
        let host = self.host.clone();
        let address = self.address.clone();
        let mut attempt = tokio::spawn(async move { host.connect(&address).await });

        let link = match tokio::time::timeout(self.timeout, &mut attempt).await {
            Ok(Ok(Ok(link))) => link,
            Ok(Ok(Err(e))) => {
                warn!("Connection to {} failed: {}", self.address, e);
                return Err(match e.kind() {
                    ErrorKind::Connection => e,
                    _ => Error::connection(self.address.address(), e),
                });
            }
            Ok(Err(e)) => {
                error!("Connection task for {} failed: {}", self.address, e);
                return Err(Error::connection(self.address.address(), e));
            }
            Err(_) => {
                warn!(
                    "Connection to {} timed out after {:?}",
                    self.address, self.timeout
                );
                self.abandon(attempt, hold);
                return Err(Error::connection(
                    self.address.address(),
                    format!("no response within {:?}", self.timeout),
                ));
            }
        };

        self.link = Some(link);
        debug!(
            "Connection state changed: {} -> {} ({})",
            ConnectionState::Disconnected,
            ConnectionState::Connected,
            link
        );

        Ok(hold)
    }

    /// Close a link that shows up after its connect attempt timed out.
    fn abandon<T>(&self, attempt: JoinHandle<Result<LinkHandle>>, hold: T)
    where
        T: Send + 'static,
    {
        let host = self.host.clone();
        let address = self.address.clone();

        tokio::spawn(async move {
            if let Ok(Ok(link)) = attempt.await {
                debug!("Late {} to {} opened, closing it", link, address);
                if let Err(e) = host.disconnect(link).await {
                    warn!("Failed to close late {} to {}: {}", link, address, e);
                }
            }
            drop(hold);
        });
    }

    /// Close the link.
    ///
    /// Idempotent: a disconnected session returns `Ok(())` without touching
    /// the host. The link handle is released even when the host reports a
    /// failure. The session stays connected until the host has answered, so
    /// a cancelled disconnect is retried when the owning guard is dropped.
    pub async fn disconnect(&mut self) -> Result<()> {
        let Some(link) = self.link else {
            return Ok(());
        };

        debug!("Disconnecting from {}...", self.address);

        let result = self.host.disconnect(link).await.map_err(link_error);
        self.link = None;
        debug!(
            "Connection state changed: {} -> {} ({})",
            ConnectionState::Connected,
            ConnectionState::Disconnected,
            link
        );

        if let Err(ref e) = result {
            error!("Failed to disconnect from {}: {}", self.address, e);
        }

        result
    }

    /// Read the attribute behind `handle`.
    pub async fn read_handle(&self, handle: AttributeHandle) -> Result<Vec<u8>> {
        let link = self.link()?;

        let data = self
            .host
            .read_attribute(link, handle)
            .await
            .map_err(link_error)?;

        trace!("Read {} bytes from handle {}", data.len(), handle);

        Ok(data)
    }

    /// Write `value` to the attribute behind `handle`.
    pub async fn write_handle(
        &self,
        handle: AttributeHandle,
        value: &[u8],
        require_response: bool,
    ) -> Result<()> {
        let link = self.link()?;

        self.host
            .write_attribute(link, handle, value, require_response)
            .await
            .map_err(link_error)?;

        trace!("Wrote {} bytes to handle {}", value.len(), handle);

        Ok(())
    }
}

static GLOBAL_RADIO: OnceLock<RadioLock> = OnceLock::new();

/// Mutual exclusion over the physical radio.
///
/// Not re-entrant: a task holding a session that tries to acquire another
/// one through the same lock waits forever.
#[derive(Debug, Clone, Default)]
pub struct RadioLock {
    inner: Arc<Mutex<()>>,
}

impl RadioLock {
    /// Create an independent lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock shared by every session in this process.
    pub fn global() -> Self {
        GLOBAL_RADIO.get_or_init(RadioLock::new).clone()
    }

    /// Check if some session currently holds the radio.
    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }

    async fn acquire(&self) -> OwnedMutexGuard<()> {
        self.inner.clone().lock_owned().await
    }
}

/// Hands out exclusive sessions on a shared radio.
#[derive(Clone)]
pub struct DeviceSession {
    host: Arc<dyn BleHost>,
    radio: RadioLock,
}

impl DeviceSession {
    /// Create a session factory guarded by the process-wide radio lock.
    pub fn new(host: Arc<dyn BleHost>) -> Self {
        Self::with_radio_lock(host, RadioLock::global())
    }

    /// Create a session factory guarded by a specific lock.
    pub fn with_radio_lock(host: Arc<dyn BleHost>, radio: RadioLock) -> Self {
        Self { host, radio }
    }

    /// Get the host stack.
    pub fn host(&self) -> &Arc<dyn BleHost> {
        &self.host
    }

    /// Get the radio lock.
    pub fn radio_lock(&self) -> &RadioLock {
        &self.radio
    }

    /// Wait for the radio, then connect to `address`.
    ///
    /// Waits without bound while another session holds the radio. If the
    /// connect fails the radio is released before the error is returned; if
    /// it timed out, only once the abandoned attempt has been cleaned up.
    pub async fn acquire(
        &self,
        address: PeripheralAddress,
        config: &SessionConfig,
    ) -> Result<SessionGuard> {
        debug!("Waiting for radio to open a session with {}", address);
        let permit = self.radio.acquire().await;

        let mut session = Session::new(self.host.clone(), address, config.connect_timeout);
        let permit = session.connect_holding(permit).await?;

        Ok(SessionGuard {
            session,
            permit: Some(permit),
        })
    }
}

/// A connected [`Session`] holding the radio.
///
/// Call [`release`](Self::release) or [`finish`](Self::finish) to disconnect
/// and give the radio back. If the guard is dropped instead (early return,
/// panic, cancelled task) the disconnect is spawned on the current tokio
/// runtime and the radio stays held until it completes.
pub struct SessionGuard {
    session: Session,
    permit: Option<OwnedMutexGuard<()>>,
}

impl fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard")
            .field("session", &self.session)
            .finish()
    }
}

impl SessionGuard {
    /// Disconnect, then release the radio.
    ///
    /// If this future is cancelled before the host answers, the guard's
    /// drop takes over the disconnect and keeps the radio until it is done.
    pub async fn release(mut self) -> Result<()> {
        let result = self.session.disconnect().await;
        self.permit.take();
        result
    }

    /// Release the session and return `outcome`.
    ///
    /// The operation's error wins over a disconnect error. A disconnect error
    /// after a successful operation is logged and dropped, since the link
    /// handle is released either way.
    pub async fn finish<T>(self, outcome: Result<T>) -> Result<T> {
        let address = self.session.address().clone();

        match (outcome, self.release().await) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(value), Err(e)) => {
                warn!("Ignoring disconnect failure for {}: {}", address, e);
                Ok(value)
            }
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(disconnect_err)) => {
                warn!(
                    "Disconnect from {} also failed: {}",
                    address, disconnect_err
                );
                Err(e)
            }
        }
    }
}

impl Deref for SessionGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let permit = self.permit.take();

        let Some(link) = self.session.link.take() else {
            return;
        };

        let host = self.session.host.clone();
        let address = self.session.address.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(
                    "Session with {} dropped while connected, disconnecting in background",
                    address
                );
                runtime.spawn(async move {
                    if let Err(e) = host.disconnect(link).await {
                        warn!("Background disconnect from {} failed: {}", address, e);
                    }
                    drop(permit);
                });
            }
            Err(_) => {
                error!(
                    "Session with {} dropped outside a tokio runtime, {} left open",
                    address, link
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::host::MockBleHost;
    use mockall::predicate::eq;

    fn address() -> PeripheralAddress {
        PeripheralAddress::new("4C:65:A8:D0:12:34")
    }

    #[test]
    fn test_connection_state() {
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(ConnectionState::Connected.is_connected());
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(format!("{}", ConnectionState::Connected), "Connected");
        assert_eq!(format!("{}", ConnectionState::Disconnected), "Disconnected");
    }

    #[test]
    fn test_link_error_reclassifies_connection_errors() {
        let err = link_error(Error::connection("AA", "dropped"));
        assert_eq!(err.kind(), ErrorKind::Io);

        let err = link_error(Error::parse("bad"));
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_session_disconnected() {
        let mut host = MockBleHost::new();
        host.expect_connect()
            .times(1)
            .returning(|addr| Err(Error::connection(addr.address(), "unreachable")));
        host.expect_disconnect().times(0);

        let mut session = Session::new(Arc::new(host), address(), Duration::from_secs(1));
        let err = session.connect().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_non_connection_error_from_connect_is_reclassified() {
        let mut host = MockBleHost::new();
        host.expect_connect()
            .returning(|_| Err(Error::io("invalid address type")));

        let mut session = Session::new(Arc::new(host), address(), Duration::from_secs(1));
        let err = session.connect().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_read_failure_is_io_error() {
        let mut host = MockBleHost::new();
        host.expect_connect().returning(|_| Ok(LinkHandle(1)));
        host.expect_read_attribute()
            .with(eq(LinkHandle(1)), eq(AttributeHandle(0x0042)))
            .returning(|_, handle| Err(Error::io(format!("handle {} not found", handle))));

        let mut session = Session::new(Arc::new(host), address(), Duration::from_secs(1));
        session.connect().await.unwrap();

        let err = session.read_handle(AttributeHandle(0x0042)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let host = MockBleHost::new();
        let session = Session::new(Arc::new(host), address(), Duration::from_secs(1));

        assert!(matches!(
            session.read_handle(AttributeHandle(0x0018)).await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            session
                .write_handle(AttributeHandle(0x0010), &[0x01, 0x00], true)
                .await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_failure_still_releases_link() {
        let mut host = MockBleHost::new();
        host.expect_connect().returning(|_| Ok(LinkHandle(3)));
        host.expect_disconnect()
            .times(1)
            .returning(|_| Err(Error::io("link already gone")));

        let mut session = Session::new(Arc::new(host), address(), Duration::from_secs(1));
        session.connect().await.unwrap();

        assert!(session.disconnect().await.is_err());
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_acquire_releases_radio() {
        let mut host = MockBleHost::new();
        host.expect_connect()
            .returning(|addr| Err(Error::connection(addr.address(), "unreachable")));

        let sessions = DeviceSession::with_radio_lock(Arc::new(host), RadioLock::new());
        let result = sessions.acquire(address(), &SessionConfig::default()).await;

        assert!(result.is_err());
        assert!(!sessions.radio_lock().is_held());
    }

    #[tokio::test]
    async fn test_finish_prefers_operation_error() {
        let mut host = MockBleHost::new();
        host.expect_connect().returning(|_| Ok(LinkHandle(1)));
        host.expect_disconnect()
            .times(1)
            .returning(|_| Err(Error::io("disconnect failed")));

        let sessions = DeviceSession::with_radio_lock(Arc::new(host), RadioLock::new());
        let guard = sessions
            .acquire(address(), &SessionConfig::default())
            .await
            .unwrap();

        let result: Result<()> = guard.finish(Err(Error::parse("bad payload"))).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Parse);
        assert!(!sessions.radio_lock().is_held());
    }

    #[test]
    fn test_global_radio_lock_is_shared() {
        let a = RadioLock::global();
        let b = RadioLock::global();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
    }
}
