//! Outgoing message buffer
//!
//! The bytes being assembled for the next send. Bytes come from raw text,
//! space separated byte tokens, or typed values run through
//! [`crate::encoding`]. Every change publishes
//! [`StateEvent::MessageChanged`].

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

use crate::encoding::{self, Endianness, NumericType, TypedValue};
use crate::events::{EventBus, StateEvent};
use crate::receive::ascii_lossy;

/// Derived views of the outgoing message, computed on demand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSnapshot {
    /// Raw bytes
    pub bytes: Vec<u8>,
    /// ASCII rendering, `?` for bytes above 0x7F
    pub ascii: String,
    /// Upper-case hex pairs joined by `-`, e.g. "1F-03-E8"
    pub hex_string: String,
    /// Byte count
    pub length: usize,
}

impl MessageSnapshot {
    fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            ascii: ascii_lossy(&bytes),
            hex_string: hex_string(&bytes),
            length: bytes.len(),
            bytes,
        }
    }
}

/// Render bytes as dash separated upper-case hex pairs
pub fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join("-")
}

/// ASCII encoding of `text`; characters outside ASCII become `?`
pub fn ascii_encode(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect()
}

/// Parse one byte token: `0x`/`0X` prefixed tokens are hexadecimal,
/// everything else decimal.
pub fn parse_byte_token(token: &str) -> Option<u8> {
    let prefixed = token
        .get(..2)
        .is_some_and(|p| p.eq_ignore_ascii_case("0x"));
    if prefixed {
        let digits = token[2..].trim();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        return u8::from_str_radix(digits, 16).ok();
    }

    match encoding::parse(token, NumericType::Byte)? {
        TypedValue::Byte(b) => Some(b),
        _ => None,
    }
}

/// Parse a space separated token list, skipping tokens that do not parse
pub fn parse_byte_tokens(text: &str) -> Vec<u8> {
    text.split(' ').filter_map(parse_byte_token).collect()
}

/// The message being built for the next send
#[derive(Debug)]
pub struct OutgoingMessage {
    bytes: Mutex<Vec<u8>>,
    events: Arc<EventBus>,
}

impl OutgoingMessage {
    /// Empty message publishing on `events`
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            bytes: Mutex::new(Vec::new()),
            events,
        }
    }

    fn extend(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        self.events.publish(StateEvent::MessageChanged);
    }

    /// Append the ASCII encoding of `text`. Non-ASCII characters become `?`.
    pub fn append_text(&self, text: &str) {
        self.extend(&ascii_encode(text));
    }

    /// Append every parsable byte token in `text`. Returns how many bytes
    /// were appended.
    pub fn append_tokens(&self, text: &str) -> usize {
        let data = parse_byte_tokens(text);
        self.extend(&data);
        data.len()
    }

    /// Append `text` encoded as `ty`. Returns false if it did not parse.
    pub fn append_typed(&self, text: &str, ty: NumericType, endianness: Endianness) -> bool {
        match encoding::encode(text, ty, endianness) {
            Some(data) => {
                self.extend(&data);
                true
            }
            None => {
                tracing::debug!(%ty, text, "typed value did not parse, nothing appended");
                false
            }
        }
    }

    /// Empty the message
    pub fn clear(&self) {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.events.publish(StateEvent::MessageChanged);
    }

    /// Current contents and derived views
    pub fn snapshot(&self) -> MessageSnapshot {
        let bytes = self
            .bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        MessageSnapshot::from_bytes(bytes)
    }

    /// Byte count
    pub fn len(&self) -> usize {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the message holds no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the contents, leaving the message empty. The caller publishes
    /// the change once the send attempt is over.
    pub(crate) fn drain(&self) -> Vec<u8> {
        std::mem::take(&mut *self.bytes.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn notify_changed(&self) {
        self.events.publish(StateEvent::MessageChanged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn message_with_counter() -> (OutgoingMessage, Arc<AtomicUsize>) {
        let events = Arc::new(EventBus::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        events.subscribe(StateEvent::MessageChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (OutgoingMessage::new(events), hits)
    }

    #[test]
    fn test_token_list_skips_malformed() {
        let (message, _) = message_with_counter();
        assert_eq!(message.append_tokens("0x1F 31 0xGG 7"), 3);
        assert_eq!(message.snapshot().bytes, vec![0x1F, 31, 7]);
    }

    #[test]
    fn test_token_forms() {
        assert_eq!(parse_byte_token("0XfF"), Some(0xFF));
        assert_eq!(parse_byte_token("0x"), None);
        assert_eq!(parse_byte_token("0x+1"), None);
        assert_eq!(parse_byte_token("0x100"), None);
        assert_eq!(parse_byte_token("255"), Some(255));
        assert_eq!(parse_byte_token("256"), None);
        assert_eq!(parse_byte_token(""), None);
        assert_eq!(parse_byte_token("+7"), Some(7));
        // double spaces produce empty tokens which are skipped
        assert_eq!(parse_byte_tokens("1  2"), vec![1, 2]);
    }

    #[test]
    fn test_append_text_and_views() {
        let (message, hits) = message_with_counter();
        message.append_text("Hi");
        message.append_tokens("0x0D 10");

        let snap = message.snapshot();
        assert_eq!(snap.bytes, b"Hi\r\n".to_vec());
        assert_eq!(snap.ascii, "Hi\r\n");
        assert_eq!(snap.hex_string, "48-69-0D-0A");
        assert_eq!(snap.length, 4);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_empty_inputs_do_not_notify() {
        let (message, hits) = message_with_counter();
        message.append_text("");
        message.append_tokens("zz 0xQQ");
        assert!(!message.append_typed("abc", NumericType::Int32, Endianness::Little));
        assert!(message.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_append_typed() {
        let (message, _) = message_with_counter();
        assert!(message.append_typed("1000", NumericType::UInt16, Endianness::Big));
        assert!(message.append_typed("1000", NumericType::UInt16, Endianness::Little));
        assert_eq!(message.snapshot().bytes, vec![0x03, 0xE8, 0xE8, 0x03]);
    }

    #[test]
    fn test_non_ascii_text_and_high_bytes() {
        let (message, _) = message_with_counter();
        message.append_text("é");
        message.append_tokens("200");
        let snap = message.snapshot();
        assert_eq!(snap.bytes, vec![b'?', 200]);
        assert_eq!(snap.ascii, "??");
        assert_eq!(snap.hex_string, "3F-C8");
    }

    #[test]
    fn test_snapshot_field_names() {
        let (message, _) = message_with_counter();
        message.append_tokens("0x1F");
        let json = serde_json::to_value(message.snapshot()).unwrap();
        assert_eq!(json["hex_string"], "1F");
        assert_eq!(json["ascii"], "\u{1f}");
        assert_eq!(json["length"], 1);
    }

    #[test]
    fn test_clear_notifies() {
        let (message, hits) = message_with_counter();
        message.append_text("x");
        message.clear();
        assert!(message.is_empty());
        assert_eq!(message.snapshot().hex_string, "");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
