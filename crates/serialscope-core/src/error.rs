//! Monitor errors

use thiserror::Error;

/// Errors raised by the lower layers of the monitor.
///
/// The operations exposed on [`crate::SerialMonitor`] never return these;
/// they log them and leave the state unchanged instead.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The OS refused to open the port
    #[error("Failed to open {device}: {reason}")]
    PortOpen {
        /// Port that was being opened
        device: String,
        /// OS error text
        reason: String,
    },

    /// No such device
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Other serial driver failure
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Operation needs an open connection
    #[error("Not connected")]
    NotConnected,

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Transport or file I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration file
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<serialport::Error> for MonitorError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::NoDevice => MonitorError::PortNotFound(e.description),
            _ => MonitorError::Serial(e.to_string()),
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, MonitorError>;
