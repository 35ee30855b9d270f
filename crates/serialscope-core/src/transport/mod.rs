//! Serial transport abstraction
//!
//! The monitor talks to the OS through two seams: a [`PortBackend`] that
//! enumerates and opens devices, and the [`SerialTransport`] it hands back
//! for an open port. [`serial::SystemBackend`] implements both on top of the
//! `serialport` crate; tests substitute in-memory versions.

pub mod serial;

use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::error::Result;

pub use serial::{list_ports, SerialChannel, SystemBackend};

/// Baud rates offered for selection
pub const BAUD_RATES: [u32; 10] = [
    300, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 74880, 115200,
];

/// A discoverable serial device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// OS-level port name, e.g. "/dev/ttyUSB0" or "COM3"
    pub identifier: String,

    /// Human readable description
    pub description: String,
}

impl DeviceDescriptor {
    /// Descriptor from an identifier and description
    pub fn new(identifier: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            description: description.into(),
        }
    }

    /// Label shown in device pickers: "description (identifier)"
    pub fn label(&self) -> String {
        format!("{} ({})", self.description, self.identifier)
    }
}

/// Parameters for opening a port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSettings {
    /// Port to open
    pub identifier: String,
    /// Line speed
    pub baud_rate: u32,
    /// Assert the DTR line after opening
    pub assert_dtr: bool,
    /// Read timeout applied to the port
    pub read_timeout: Duration,
}

/// An open, bidirectional serial channel
pub trait SerialTransport: Read + Write + Send {
    /// Number of bytes waiting in the input buffer
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Release the underlying handle. Further I/O is an error.
    fn close(&mut self) -> io::Result<()>;
}

/// Source of serial devices and connections
pub trait PortBackend: Send + Sync {
    /// Snapshot of the devices currently present
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Open a device
    fn open(&self, settings: &OpenSettings) -> Result<Box<dyn SerialTransport>>;
}

/// Read everything currently buffered on `transport` in one pass.
///
/// Returns an empty vector when nothing is waiting.
pub fn read_available(transport: &mut dyn SerialTransport) -> io::Result<Vec<u8>> {
    let pending = transport.bytes_to_read()? as usize;
    if pending == 0 {
        return Ok(Vec::new());
    }

    let mut buf = vec![0u8; pending];
    let mut filled = 0;
    while filled < pending {
        match transport.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut && filled > 0 => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buf.truncate(filled);
    Ok(buf)
}
