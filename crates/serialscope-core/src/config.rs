//! Monitor configuration
//!
//! Tunables for the receive loop, the receive buffer and port opening.
//! Stored as JSON; every field has a default so partial files load.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{MonitorError, Result};

/// Default number of characters retained in the receive buffer
pub const DEFAULT_MAX_RECEIVE_LEN: usize = 1000;

/// Default sleep between receive loop iterations in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 150;

/// Default baud rate offered to the UI
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Runtime configuration for a [`crate::SerialMonitor`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Maximum characters kept in the receive buffer (oldest dropped first)
    pub max_receive_len: usize,

    /// Sleep between receive loop iterations in milliseconds
    pub poll_interval_ms: u64,

    /// Whether a disconnect also empties the receive buffer
    pub clear_receive_on_disconnect: bool,

    /// Baud rate preselected by the UI
    pub default_baud_rate: u32,

    /// Assert DTR when opening a port
    pub assert_dtr: bool,

    /// Transport read timeout in milliseconds
    pub read_timeout_ms: u64,

    /// How long to wait for the receive loop to stop before aborting it
    pub stop_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_receive_len: DEFAULT_MAX_RECEIVE_LEN,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            clear_receive_on_disconnect: false,
            default_baud_rate: DEFAULT_BAUD_RATE,
            assert_dtr: true,
            read_timeout_ms: 100,
            stop_timeout_ms: 2000,
        }
    }
}

impl MonitorConfig {
    /// Parse a configuration from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: MonitorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Save the configuration as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the receive loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_receive_len == 0 {
            return Err(MonitorError::Config(
                "max_receive_len must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(MonitorError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.default_baud_rate == 0 {
            return Err(MonitorError::Config(
                "default_baud_rate must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
