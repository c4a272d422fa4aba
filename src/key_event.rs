//! Key event records sent down the structured and legacy delivery paths

use std::{sync::OnceLock, time::Instant};

use serde::{Deserialize, Serialize};

use crate::error::{EmbedderError, Result};

/// Kind of transition reported to the framework
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyEventType {
    /// Key pressed
    Down = 1,
    /// Key released
    Up = 2,
    /// Key held down and auto-repeating
    Repeat = 3,
}

/// A key event for the structured (embedder API) path
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEvent {
    /// Microseconds on a monotonic clock
    pub timestamp: f64,
    /// Transition kind
    pub event_type: KeyEventType,
    /// Flutter physical key code
    pub physical: u64,
    /// Flutter logical key code
    pub logical: u64,
    /// Text produced by the key, only set on down and repeat
    pub character: Option<String>,
    /// Whether the embedder made this event up rather than observing it
    pub synthesized: bool,
}

impl KeyEvent {
    /// Neutral event sent in place of an "up" that nothing recorded as pressed.
    pub fn empty() -> Self {
        Self {
            timestamp: timestamp_micros(),
            event_type: KeyEventType::Down,
            physical: 0,
            logical: 0,
            character: Some(String::new()),
            synthesized: false,
        }
    }

    /// Whether this is the neutral event produced by [`KeyEvent::empty`].
    pub fn is_empty(&self) -> bool {
        self.physical == 0 && self.logical == 0
    }
}

/// Microseconds elapsed on a monotonic clock anchored at first use.
pub fn timestamp_micros() -> f64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_micros() as f64
}

/// `type` field values of the legacy message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegacyKeyType {
    /// Key pressed or repeated
    #[serde(rename = "keydown")]
    KeyDown,
    /// Key released
    #[serde(rename = "keyup")]
    KeyUp,
}

/// The RawKeyEvent message sent on the `flutter/keyevent` channel.
///
/// The framework decodes it with its GTK key helper, hence the fixed keymap
/// and toolkit values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyKeyMessage {
    /// Always "linux"
    pub keymap: String,
    /// Always "gtk"
    pub toolkit: String,
    /// First unicode scalar of the input text, or 0
    pub unicode_scalar_values: u32,
    /// GTK key code
    pub key_code: u32,
    /// XKB scan code
    pub scan_code: u32,
    /// GTK modifier mask
    pub modifiers: i32,
    /// Down or up
    #[serde(rename = "type")]
    pub event_type: LegacyKeyType,
}

impl LegacyKeyMessage {
    /// Keymap reported to the framework
    pub const KEYMAP: &'static str = "linux";
    /// Toolkit reported to the framework
    pub const TOOLKIT: &'static str = "gtk";

    /// Builds a message from already translated codes.
    pub fn new(
        text: Option<&str>,
        key_code: u32,
        scan_code: u32,
        modifiers: i32,
        is_down: bool,
    ) -> Self {
        Self {
            keymap: Self::KEYMAP.to_string(),
            toolkit: Self::TOOLKIT.to_string(),
            unicode_scalar_values: text
                .and_then(|text| text.chars().next())
                .map(u32::from)
                .unwrap_or(0),
            key_code,
            scan_code,
            modifiers,
            event_type: if is_down {
                LegacyKeyType::KeyDown
            } else {
                LegacyKeyType::KeyUp
            },
        }
    }

    /// Encodes the message with the JSON message codec.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(EmbedderError::MessageEncode)
    }
}

/// The framework's answer to a legacy message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LegacyKeyReply {
    /// Whether any framework handler consumed the event
    pub handled: bool,
}

impl LegacyKeyReply {
    /// Decodes a reply produced by the JSON message codec.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(EmbedderError::MessageDecode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_message_uses_framework_field_names() {
        let message = LegacyKeyMessage::new(Some("a"), 0x61, 0x26, 1, true);
        let value: serde_json::Value = serde_json::from_slice(&message.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "keymap": "linux",
                "toolkit": "gtk",
                "unicodeScalarValues": 0x61,
                "keyCode": 0x61,
                "scanCode": 0x26,
                "modifiers": 1,
                "type": "keydown",
            })
        );
    }

    #[test]
    fn legacy_message_without_text() {
        let message = LegacyKeyMessage::new(None, 0, 0, 0, false);
        assert_eq!(message.unicode_scalar_values, 0);
        assert_eq!(message.event_type, LegacyKeyType::KeyUp);

        let message = LegacyKeyMessage::new(Some("é"), 0, 0, 0, true);
        assert_eq!(message.unicode_scalar_values, 0xe9);
    }

    #[test]
    fn reply_decoding() {
        assert!(LegacyKeyReply::decode(br#"{"handled":true}"#).unwrap().handled);
        assert!(!LegacyKeyReply::decode(br#"{"handled":false}"#).unwrap().handled);
        assert!(matches!(
            LegacyKeyReply::decode(b"not json"),
            Err(EmbedderError::MessageDecode(_))
        ));
    }

    #[test]
    fn empty_event_is_neutral() {
        let event = KeyEvent::empty();
        assert!(event.is_empty());
        assert_eq!(event.event_type, KeyEventType::Down);
        assert_eq!(event.character.as_deref(), Some(""));
        assert!(!event.synthesized);
    }
}
