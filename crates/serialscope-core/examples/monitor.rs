//! Terminal serial monitor
//!
//! Lists the available ports, connects to one, optionally sends a message
//! and prints whatever arrives for a while.
//!
//! Usage:
//!   cargo run --example monitor -- [OPTIONS]
//!
//! Options:
//!   --port PORT       Serial port (default: first listed device)
//!   --baud RATE       Baud rate (default: from config, 115200)
//!   --config FILE     JSON monitor config
//!   --send TEXT       Text to send after connecting
//!   --hex TOKENS      Byte tokens to send, e.g. "0x01 0x03 200"
//!   --seconds N       How long to listen (default: 10)
//!
//! Set RUST_LOG=serialscope_core=debug for connection logging.

use anyhow::{bail, Context};
use serialscope_core::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut port_name: Option<String> = None;
    let mut baud_rate: Option<u32> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut send_text: Option<String> = None;
    let mut send_tokens: Option<String> = None;
    let mut seconds = 10u64;

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match args[i].as_str() {
            "--port" | "-p" => port_name = value,
            "--baud" | "-b" => baud_rate = value.and_then(|v| v.parse().ok()),
            "--config" | "-c" => config_path = value.map(PathBuf::from),
            "--send" | "-s" => send_text = value,
            "--hex" | "-x" => send_tokens = value,
            "--seconds" | "-n" => seconds = value.and_then(|v| v.parse().ok()).unwrap_or(10),
            "--help" | "-h" => {
                println!("usage: monitor [--port PORT] [--baud RATE] [--config FILE] [--send TEXT] [--hex TOKENS] [--seconds N]");
                return Ok(());
            }
            other => bail!("unknown argument: {other}"),
        }
        i += 2;
    }

    let config = match config_path {
        Some(path) => MonitorConfig::load(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => MonitorConfig::default(),
    };
    let baud_rate = baud_rate.unwrap_or(config.default_baud_rate);

    let monitor = SerialMonitor::new(config)?;
    if let Some(refresh) = monitor.refresh_devices() {
        refresh.await?;
    } else {
        // the constructor's refresh is still running
        let listed = Arc::new(Notify::new());
        let notify = Arc::clone(&listed);
        let id = monitor.subscribe(StateEvent::DeviceListChanged, move |_| notify.notify_one());
        listed.notified().await;
        monitor.unsubscribe(id);
    }

    let devices = monitor.list_devices();
    println!("=== Serial devices ===");
    if devices.is_empty() {
        println!("  (none)");
    }
    for device in &devices {
        println!("  {}", device.label());
    }

    let port_name = match port_name.or_else(|| devices.first().map(|d| d.identifier.clone())) {
        Some(name) => name,
        None => bail!("no serial port given and none found"),
    };

    println!("\nConnecting to {port_name} at {baud_rate} baud...");
    if !monitor.connect(&port_name, baud_rate).await {
        bail!("could not open {port_name}");
    }

    if let Some(text) = send_text {
        monitor.append_text(&text);
    }
    if let Some(tokens) = send_tokens {
        let count = monitor.append_tokens(&tokens);
        println!("Parsed {count} byte tokens");
    }
    let outgoing = monitor.message_snapshot();
    if outgoing.length > 0 {
        println!("Sending {} bytes: {}", outgoing.length, outgoing.hex_string);
        if !monitor.send_message().await {
            println!("  send failed");
        }
    }

    println!("Listening for {seconds}s...\n");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(seconds);
    let mut shown = String::new();
    while tokio::time::Instant::now() < deadline && monitor.is_connected().await {
        let current = monitor.receive_buffer_snapshot();
        if current != shown {
            print!("{}", new_tail(&shown, &current));
            shown = current;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    if !monitor.is_connected().await {
        println!("\nConnection lost");
    }
    monitor.disconnect().await;
    println!("\nDone");
    Ok(())
}

/// Portion of `current` not yet printed. The buffer drops its oldest
/// characters once full, so find the longest printed suffix it starts with.
fn new_tail<'a>(shown: &str, current: &'a str) -> &'a str {
    for start in 0..=shown.len() {
        let suffix = &shown[start..];
        if current.starts_with(suffix) {
            return &current[suffix.len()..];
        }
    }
    current
}
