//! Error types for rwc5020x.

use std::io;
use thiserror::Error;

/// Result type for rwc5020x operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for rwc5020x operations.
///
/// Expected conditions of an exchange (no reply, negative acknowledgement,
/// unexpected payload) are never reported through this type; they are
/// values of [`Response`](crate::Response).
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (socket, audit file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The channel is already open.
    #[error("Channel already open: {0}")]
    AlreadyOpen(String),

    /// The channel is not open (never opened, or already closed).
    #[error("Channel not open: {0}")]
    NotOpen(String),

    /// A command argument is out of range or not one of the accepted values.
    #[error("Invalid argument for {name}: {reason}")]
    InvalidArgument {
        /// Parameter name.
        name: &'static str,
        /// What was wrong with the value.
        reason: String,
    },

    /// The command is not available on the tester's firmware version.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Invalid static configuration (address, version string, ...).
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }
}
