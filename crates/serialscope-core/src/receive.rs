//! Receive buffer
//!
//! Holds the tail of everything read from the connection, bounded to a
//! maximum number of characters. Oldest data is dropped first.

use std::sync::{Mutex, PoisonError};

/// Render bytes as ASCII text, substituting `?` for anything above 0x7F
pub fn ascii_lossy(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect()
}

/// Bounded text accumulator fed by the receive loop
#[derive(Debug)]
pub struct ReceiveBuffer {
    text: Mutex<String>,
    max_len: usize,
}

impl ReceiveBuffer {
    /// Create an empty buffer retaining at most `max_len` characters
    pub fn new(max_len: usize) -> Self {
        Self {
            text: Mutex::new(String::with_capacity(max_len)),
            max_len,
        }
    }

    /// Configured bound
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Append raw bytes as ASCII text, trimming from the front past the bound
    pub fn append_bytes(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let incoming = ascii_lossy(bytes);
        let mut text = self.text.lock().unwrap_or_else(PoisonError::into_inner);
        text.push_str(&incoming);
        if text.len() > self.max_len {
            // ASCII only, so byte offsets are char boundaries
            let excess = text.len() - self.max_len;
            text.drain(..excess);
        }
    }

    /// Empty the buffer
    pub fn clear(&self) {
        self.text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> String {
        self.text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current length in characters
    pub fn len(&self) -> usize {
        self.text.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing has been retained
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
