//! # SerialScope Core Library
//!
//! Backend of a desktop serial-port monitor.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Serial device enumeration with background refresh
//! - A single managed connection with a polling receive loop
//! - A bounded receive buffer
//! - An outgoing message built from text, byte tokens or typed numbers
//! - Change notifications for UI bindings
//!
//! ## Example
//!
//! ```rust,ignore
//! use serialscope_core::prelude::*;
//!
//! let monitor = SerialMonitor::new(MonitorConfig::default())?;
//! monitor.subscribe(StateEvent::ReceiveBufferChanged, |_| { /* redraw */ });
//!
//! if monitor.connect("/dev/ttyUSB0", 115200).await {
//!     monitor.append_typed("1000", NumericType::UInt16, Endianness::Big);
//!     monitor.send_message().await;
//! }
//! ```

pub mod config;
pub mod connection;
pub mod devices;
pub mod encoding;
pub mod error;
pub mod events;
pub mod message;
pub mod monitor;
pub mod receive;
pub mod transport;

pub use config::MonitorConfig;
pub use error::{MonitorError, Result};
pub use events::{EventBus, StateEvent, SubscriptionId};
pub use monitor::SerialMonitor;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::MonitorConfig;
    pub use crate::connection::{ConnectionInfo, ConnectionState};
    pub use crate::encoding::{Decimal128, Endianness, NumericType, TypedValue};
    pub use crate::error::{MonitorError, Result};
    pub use crate::events::{StateEvent, SubscriptionId};
    pub use crate::message::MessageSnapshot;
    pub use crate::monitor::SerialMonitor;
    pub use crate::transport::{DeviceDescriptor, PortBackend, SerialTransport, BAUD_RATES};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
