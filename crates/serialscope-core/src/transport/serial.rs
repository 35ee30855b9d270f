//! Serial port handling
//!
//! OS-backed device enumeration and port access via the `serialport` crate.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::io::{self, Read, Write};

use super::{DeviceDescriptor, OpenSettings, PortBackend, SerialTransport};
use crate::error::{MonitorError, Result};

impl From<SerialPortInfo> for DeviceDescriptor {
    fn from(info: SerialPortInfo) -> Self {
        let description = match info.port_type {
            SerialPortType::UsbPort(usb_info) => usb_info
                .product
                .or(usb_info.manufacturer)
                .unwrap_or_else(|| format!("USB Serial ({:04x}:{:04x})", usb_info.vid, usb_info.pid)),
            SerialPortType::PciPort => "PCI Serial Port".to_string(),
            SerialPortType::BluetoothPort => "Bluetooth Serial Port".to_string(),
            SerialPortType::Unknown => "Serial Port".to_string(),
        };

        Self {
            identifier: info.port_name,
            description,
        }
    }
}

/// Sort key so that:
///  - ttyACM* ports come first (sorted numerically by suffix)
///  - then ttyUSB* ports (sorted numerically)
///  - then other ports (sorted by name)
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    (2, 0, basename.to_string())
}

/// List all available serial ports, with /dev fallbacks and deterministic ordering
pub fn list_ports() -> Result<Vec<DeviceDescriptor>> {
    let mut map: HashMap<String, DeviceDescriptor> = HashMap::new();
    for info in serialport::available_ports()? {
        let d = DeviceDescriptor::from(info);
        map.entry(d.identifier.clone()).or_insert(d);
    }

    // Linux: udev may miss CDC/FTDI nodes inside containers
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone())
                        .or_insert_with(|| DeviceDescriptor::new(full, "Serial Port"));
                }
            }
        }
    }

    let mut v: Vec<DeviceDescriptor> = map.into_values().collect();
    v.sort_by_key(|d| port_sort_key(&d.identifier));
    Ok(v)
}

/// Open a serial port, asserting DTR if requested
pub fn open_port(settings: &OpenSettings) -> Result<Box<dyn SerialPort>> {
    let mut port = serialport::new(&settings.identifier, settings.baud_rate)
        .timeout(settings.read_timeout)
        .open()
        .map_err(|e| MonitorError::PortOpen {
            device: settings.identifier.clone(),
            reason: e.to_string(),
        })?;

    if settings.assert_dtr {
        port.write_data_terminal_ready(true)?;
    }

    Ok(port)
}

/// Serial port wrapper implementing [`SerialTransport`]
pub struct SerialChannel {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialChannel {
    /// Wrap an open port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port: Some(port) }
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port closed"))
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port()?.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port()?.flush()
    }
}

impl SerialTransport for SerialChannel {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port()?.bytes_to_read().map_err(io::Error::other)
    }

    fn close(&mut self) -> io::Result<()> {
        match self.port.take() {
            Some(mut port) => port.flush(),
            None => Ok(()),
        }
    }
}

/// [`PortBackend`] for the host's serial ports
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBackend;

impl PortBackend for SystemBackend {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        list_ports()
    }

    fn open(&self, settings: &OpenSettings) -> Result<Box<dyn SerialTransport>> {
        let port = open_port(settings)?;
        Ok(Box::new(SerialChannel::new(port)))
    }
}
