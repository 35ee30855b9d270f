//! Connection management
//!
//! Owns the single open serial link and the receive loop that polls it.
//!
//! All I/O on the link (receive polls, raw writes, message sends, close)
//! happens under one async mutex, so reads and writes never interleave.
//! Lifecycle operations (connect/disconnect) are additionally serialized by
//! the mutex guarding the receive task, and always wait for the previous
//! loop to exit before opening or returning.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::events::{EventBus, StateEvent};
use crate::message::{ascii_encode, OutgoingMessage};
use crate::receive::ReceiveBuffer;
use crate::transport::{read_available, OpenSettings, PortBackend, SerialTransport};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No port open
    Disconnected,
    /// Port open and receive loop running
    Connected,
}

/// Details of the open connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Port the connection was opened on
    pub identifier: String,
    /// Line speed
    pub baud_rate: u32,
}

struct Link {
    info: ConnectionInfo,
    transport: Box<dyn SerialTransport>,
}

impl Link {
    fn close(mut self) {
        if let Err(e) = self.transport.close() {
            tracing::warn!(port = %self.info.identifier, "error closing port (ignored): {e}");
        }
    }
}

type SharedLink = Arc<Mutex<Option<Link>>>;

struct ReceiveTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owner of the (at most one) serial connection
pub struct ConnectionManager {
    backend: Arc<dyn PortBackend>,
    link: SharedLink,
    receive_task: Mutex<Option<ReceiveTask>>,
    receive: Arc<ReceiveBuffer>,
    events: Arc<EventBus>,
    config: MonitorConfig,
}

impl ConnectionManager {
    /// Manager for `backend` feeding `receive` and publishing on `events`
    pub fn new(
        backend: Arc<dyn PortBackend>,
        receive: Arc<ReceiveBuffer>,
        events: Arc<EventBus>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            backend,
            link: Arc::new(Mutex::new(None)),
            receive_task: Mutex::new(None),
            receive,
            events,
            config,
        }
    }

    /// Open `identifier` at `baud_rate` and start the receive loop.
    ///
    /// Does nothing if already connected. Failures are logged, leave the
    /// manager disconnected and still publish
    /// [`StateEvent::ConnectionChanged`]. Returns whether the manager is
    /// connected afterwards.
    pub async fn connect(&self, identifier: &str, baud_rate: u32) -> bool {
        match self.try_connect(identifier, baud_rate).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(port = identifier, baud_rate, "connect failed: {e}");
                false
            }
        }
    }

    /// Like [`ConnectionManager::connect`] but hands back the open error
    pub async fn try_connect(&self, identifier: &str, baud_rate: u32) -> Result<()> {
        let mut task = self.receive_task.lock().await;

        if self.link.lock().await.is_some() {
            tracing::debug!(port = identifier, "connect ignored, already connected");
            return Ok(());
        }

        // A loop that ended on a read failure may still be parked here
        if let Some(old) = task.take() {
            self.stop_receive_task(old).await;
        }

        let settings = OpenSettings {
            identifier: identifier.to_string(),
            baud_rate,
            assert_dtr: self.config.assert_dtr,
            read_timeout: Duration::from_millis(self.config.read_timeout_ms),
        };

        tracing::info!(port = identifier, baud_rate, "opening serial port");
        let backend = Arc::clone(&self.backend);
        let opened = tokio::task::spawn_blocking(move || backend.open(&settings))
            .await
            .unwrap_or_else(|e| {
                Err(MonitorError::PortOpen {
                    device: identifier.to_string(),
                    reason: e.to_string(),
                })
            });

        let transport = match opened {
            Ok(transport) => transport,
            Err(e) => {
                self.events.publish(StateEvent::ConnectionChanged);
                return Err(e);
            }
        };

        *self.link.lock().await = Some(Link {
            info: ConnectionInfo {
                identifier: identifier.to_string(),
                baud_rate,
            },
            transport,
        });
        *task = Some(self.spawn_receive_loop());

        tracing::info!(port = identifier, baud_rate, "connected");
        self.events.publish(StateEvent::ConnectionChanged);
        Ok(())
    }

    /// Close the connection and stop the receive loop.
    ///
    /// Does nothing (and publishes nothing) if not connected. Close errors
    /// are logged and ignored.
    pub async fn disconnect(&self) {
        let mut task = self.receive_task.lock().await;

        let link = self.link.lock().await.take();
        let Some(link) = link else {
            if let Some(old) = task.take() {
                self.stop_receive_task(old).await;
            }
            return;
        };

        let port = link.info.identifier.clone();
        link.close();

        if let Some(old) = task.take() {
            self.stop_receive_task(old).await;
        }

        if self.config.clear_receive_on_disconnect {
            self.receive.clear();
            self.events.publish(StateEvent::ReceiveBufferChanged);
        }

        tracing::info!(%port, "disconnected");
        self.events.publish(StateEvent::ConnectionChanged);
    }

    /// Whether a connection is open
    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.is_some()
    }

    /// Current state of the connection state machine
    pub async fn state(&self) -> ConnectionState {
        if self.is_connected().await {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Port and baud rate of the open connection
    pub async fn connection_info(&self) -> Option<ConnectionInfo> {
        self.link.lock().await.as_ref().map(|l| l.info.clone())
    }

    /// Whether a receive loop task is alive
    pub async fn is_receiving(&self) -> bool {
        self.receive_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Write `text` straight to the port, bypassing the outgoing message.
    /// Returns whether anything was transmitted.
    pub async fn write_raw(&self, text: &str) -> bool {
        match self.try_write_raw(text).await {
            Ok(()) => true,
            Err(MonitorError::NotConnected) => false,
            Err(e) => {
                tracing::warn!("write failed: {e}");
                false
            }
        }
    }

    /// Like [`ConnectionManager::write_raw`] but hands back the failure
    pub async fn try_write_raw(&self, text: &str) -> Result<()> {
        let mut guard = self.link.lock().await;
        let link = guard.as_mut().ok_or(MonitorError::NotConnected)?;
        write_to(link, &ascii_encode(text))
    }

    /// Send the whole outgoing message in one write, then clear it.
    ///
    /// The message is cleared and [`StateEvent::MessageChanged`] published
    /// even when nothing could be sent. Returns whether anything was
    /// transmitted.
    pub async fn send_buffer(&self, message: &OutgoingMessage) -> bool {
        let sent = {
            let mut guard = self.link.lock().await;
            let bytes = message.drain();
            match guard.as_mut() {
                Some(link) if !bytes.is_empty() => match write_to(link, &bytes) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!("send failed: {e}");
                        false
                    }
                },
                _ => false,
            }
        };
        message.notify_changed();
        sent
    }

    fn spawn_receive_loop(&self) -> ReceiveTask {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(receive_loop(
            Arc::clone(&self.link),
            Arc::clone(&self.receive),
            Arc::clone(&self.events),
            cancel.clone(),
            Duration::from_millis(self.config.poll_interval_ms),
            self.config.clear_receive_on_disconnect,
        ));
        ReceiveTask { cancel, handle }
    }

    /// Cancel the loop and wait for it to exit, aborting it past the
    /// configured timeout.
    async fn stop_receive_task(&self, task: ReceiveTask) {
        task.cancel.cancel();
        let mut handle = task.handle;
        let limit = Duration::from_millis(self.config.stop_timeout_ms);
        if tokio::time::timeout(limit, &mut handle).await.is_err() {
            tracing::warn!(?limit, "receive loop did not stop in time, aborting");
            handle.abort();
        }
    }
}

fn write_to(link: &mut Link, bytes: &[u8]) -> Result<()> {
    link.transport.write_all(bytes)?;
    link.transport.flush()?;
    tracing::debug!(port = %link.info.identifier, len = bytes.len(), "sent");
    Ok(())
}

/// Poll the link until cancelled.
///
/// Each iteration drains whatever input is waiting into the receive buffer
/// and publishes [`StateEvent::ReceiveBufferChanged`]. A read failure closes
/// the link, publishes [`StateEvent::ConnectionChanged`] and ends the loop.
async fn receive_loop(
    link: SharedLink,
    receive: Arc<ReceiveBuffer>,
    events: Arc<EventBus>,
    cancel: CancellationToken,
    poll_interval: Duration,
    clear_on_disconnect: bool,
) {
    tracing::debug!(?poll_interval, "receive loop started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let failed = {
            let mut guard = link.lock().await;
            let result = guard
                .as_mut()
                .map(|l| read_available(l.transport.as_mut()));
            match result {
                Some(Ok(data)) => {
                    if !data.is_empty() {
                        tracing::trace!(len = data.len(), "received");
                    }
                    receive.append_bytes(&data);
                    false
                }
                Some(Err(e)) => {
                    tracing::warn!("read failed, closing connection: {e}");
                    if let Some(dead) = guard.take() {
                        dead.close();
                    }
                    true
                }
                None => false,
            }
        };

        if failed {
            if clear_on_disconnect {
                receive.clear();
            }
            events.publish(StateEvent::ReceiveBufferChanged);
            events.publish(StateEvent::ConnectionChanged);
            break;
        }

        events.publish(StateEvent::ReceiveBufferChanged);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    tracing::debug!("receive loop stopped");
}
