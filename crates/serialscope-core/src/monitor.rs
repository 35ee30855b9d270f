//! Monitor context
//!
//! [`SerialMonitor`] wires the components together around one shared
//! [`EventBus`] and exposes the operations the UI calls. Construct one per
//! process and hand it to whatever needs it.

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::MonitorConfig;
use crate::connection::{ConnectionInfo, ConnectionManager, ConnectionState};
use crate::devices::DeviceEnumerator;
use crate::encoding::{Endianness, NumericType};
use crate::error::Result;
use crate::events::{EventBus, StateEvent, SubscriptionId};
use crate::message::{MessageSnapshot, OutgoingMessage};
use crate::receive::ReceiveBuffer;
use crate::transport::{DeviceDescriptor, PortBackend, SystemBackend, BAUD_RATES};

/// The serial monitor: device list, connection, outgoing message and
/// receive buffer
pub struct SerialMonitor {
    config: MonitorConfig,
    events: Arc<EventBus>,
    devices: DeviceEnumerator,
    message: OutgoingMessage,
    receive: Arc<ReceiveBuffer>,
    connection: ConnectionManager,
}

impl SerialMonitor {
    /// Monitor over the host's serial ports. Starts an initial device
    /// refresh when called inside a Tokio runtime.
    pub fn new(config: MonitorConfig) -> Result<Self> {
        let monitor = Self::with_backend(config, Arc::new(SystemBackend))?;
        monitor.refresh_devices();
        Ok(monitor)
    }

    /// Monitor over a custom backend. No refresh is started.
    pub fn with_backend(config: MonitorConfig, backend: Arc<dyn PortBackend>) -> Result<Self> {
        config.validate()?;

        let events = Arc::new(EventBus::new());
        let receive = Arc::new(ReceiveBuffer::new(config.max_receive_len));
        let devices = DeviceEnumerator::new(Arc::clone(&backend), Arc::clone(&events));
        let message = OutgoingMessage::new(Arc::clone(&events));
        let connection = ConnectionManager::new(
            backend,
            Arc::clone(&receive),
            Arc::clone(&events),
            config.clone(),
        );

        Ok(Self {
            config,
            events,
            devices,
            message,
            receive,
            connection,
        })
    }

    /// Configuration the monitor was built with
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Shared event bus
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Register `callback` for `event`
    pub fn subscribe<F>(&self, event: StateEvent, callback: F) -> SubscriptionId
    where
        F: Fn(StateEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(event, callback)
    }

    /// Drop a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    // Devices

    /// Re-enumerate devices in the background. `None` if one is in flight.
    pub fn refresh_devices(&self) -> Option<JoinHandle<()>> {
        self.devices.refresh()
    }

    /// Device list from the last completed refresh
    pub fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.devices()
    }

    /// Selectable baud rates, ascending
    pub fn list_baud_rates(&self) -> &'static [u32] {
        &BAUD_RATES
    }

    // Connection

    /// Open a connection. Returns whether the monitor is connected afterwards.
    pub async fn connect(&self, identifier: &str, baud_rate: u32) -> bool {
        self.connection.connect(identifier, baud_rate).await
    }

    /// Close the connection, if any
    pub async fn disconnect(&self) {
        self.connection.disconnect().await
    }

    /// Whether a connection is open
    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    /// Connected or disconnected
    pub async fn connection_state(&self) -> ConnectionState {
        self.connection.state().await
    }

    /// Port and baud rate of the open connection
    pub async fn connection_info(&self) -> Option<ConnectionInfo> {
        self.connection.connection_info().await
    }

    /// Whether the receive loop is running
    pub async fn is_receiving(&self) -> bool {
        self.connection.is_receiving().await
    }

    // Outgoing message

    /// Append ASCII text to the outgoing message
    pub fn append_text(&self, text: &str) {
        self.message.append_text(text)
    }

    /// Append space separated byte tokens. Returns how many parsed.
    pub fn append_tokens(&self, text: &str) -> usize {
        self.message.append_tokens(text)
    }

    /// Append a typed value. Returns false if `text` did not parse.
    pub fn append_typed(&self, text: &str, ty: NumericType, endianness: Endianness) -> bool {
        self.message.append_typed(text, ty, endianness)
    }

    /// Empty the outgoing message
    pub fn clear_message(&self) {
        self.message.clear()
    }

    /// Outgoing message bytes with ASCII and hex views
    pub fn message_snapshot(&self) -> MessageSnapshot {
        self.message.snapshot()
    }

    /// Send and clear the outgoing message
    pub async fn send_message(&self) -> bool {
        self.connection.send_buffer(&self.message).await
    }

    /// Send `text` immediately, leaving the outgoing message untouched
    pub async fn send_raw(&self, text: &str) -> bool {
        self.connection.write_raw(text).await
    }

    // Receive buffer

    /// Empty the receive buffer and notify subscribers
    pub fn clear_receive_buffer(&self) {
        self.receive.clear();
        self.events.publish(StateEvent::ReceiveBufferChanged);
    }

    /// Copy of the received text
    pub fn receive_buffer_snapshot(&self) -> String {
        self.receive.snapshot()
    }
}
