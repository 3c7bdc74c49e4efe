//! Error types for the mijia-ble-session crate.

use std::time::Duration;

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to establish a connection to the peripheral.
    #[error("Connection to {address} failed: {reason}")]
    ConnectionFailed {
        /// The address that was being connected to.
        address: String,
        /// Description of why the connection failed.
        reason: String,
    },

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// Operation requires a connection but the session is not connected.
    #[error("Session not connected")]
    NotConnected,

    /// An established link failed during a read, write or notification wait.
    #[error("I/O error: {reason}")]
    Io {
        /// Description of the failure reported by the stack.
        reason: String,
    },

    /// No notification arrived before the deadline.
    #[error("No notification received within {0:?}")]
    Timeout(Duration),

    /// The notification payload did not match the expected format.
    #[error("Invalid payload: {context}")]
    Parse {
        /// Description of what was invalid about the payload.
        context: String,
    },
}

/// The four outcome classes callers need to distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Link establishment failed.
    Connection,
    /// A previously established link failed.
    Io,
    /// A notification wait elapsed with no event.
    TimedOut,
    /// A payload could not be parsed.
    Parse,
}

impl Error {
    /// Build a [`Error::ConnectionFailed`] for `address`.
    pub fn connection(address: impl Into<String>, reason: impl ToString) -> Self {
        Self::ConnectionFailed {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    /// Build an [`Error::Io`].
    pub fn io(reason: impl ToString) -> Self {
        Self::Io {
            reason: reason.to_string(),
        }
    }

    /// Build an [`Error::Parse`].
    pub fn parse(context: impl Into<String>) -> Self {
        Self::Parse {
            context: context.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionFailed { .. } | Self::BluetoothUnavailable => ErrorKind::Connection,
            Self::NotConnected | Self::Io { .. } => ErrorKind::Io,
            Self::Timeout(_) => ErrorKind::TimedOut,
            Self::Parse { .. } => ErrorKind::Parse,
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
