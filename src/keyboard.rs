//! Keyboard channel: reports every key transition down two delivery paths
//! and hands the caller a single verdict once both have answered.
//!
//! Each event is sent through the embedder API as a structured [`KeyEvent`]
//! and through the `flutter/keyevent` message channel as a legacy RawKeyEvent.
//! The caller's callback runs exactly once, after both paths replied, with
//! `true` if either of them handled the event.
//!
//! The pending table is not synchronized. A [`KeyboardChannel`] lives on the
//! platform's UI thread; replies produced on other threads travel through the
//! [`ReplyQueue`] and are applied by [`KeyboardChannel::process_replies`].

use std::collections::BTreeMap;

use log::{debug, error, warn};
use serde_json::{Map, Value};

use crate::{
    channel::{ChannelReply, DeliveryPath, KeyReply, ReplyQueue},
    config::KeyboardConfig,
    error::{EmbedderError, Result},
    key_event::{KeyEvent, KeyEventType, LegacyKeyMessage, timestamp_micros},
    key_mapping::{
        fallback_scan_code, gtk_key_code_for_scan_code, gtk_modifiers_for_ecore,
        logical_key_for_symbol, physical_key_for_scan_code,
    },
    press_state::{KeyTransition, PressStateTracker},
};

/// Method channel name for keyboard state queries
pub const KEYBOARD_CHANNEL_NAME: &str = "flutter/keyboard";

/// Message channel name for legacy key events
pub const KEY_EVENT_CHANNEL_NAME: &str = "flutter/keyevent";

/// Method returning the currently pressed keys
pub const GET_KEYBOARD_STATE_METHOD: &str = "getKeyboardState";

/// Structured delivery path (the engine's key event API)
pub trait KeyEventSink {
    /// Delivers `event`. `reply` is `None` for events that expect no answer.
    fn send_key_event(&self, event: KeyEvent, reply: Option<KeyReply>);
}

/// Legacy delivery path (the `flutter/keyevent` message channel)
pub trait KeyMessageChannel {
    /// Sends an encoded message on `flutter/keyevent`
    fn send(&self, message: Vec<u8>, reply: ChannelReply);
}

/// Receives the consolidated verdict for one key event
pub type KeyEventCallback = Box<dyn FnOnce(bool)>;

/// A key event waiting for its delivery paths to answer
struct PendingKeyEvent {
    /// Number of paths that have not replied yet
    unreplied: usize,
    /// Whether any replied path handled the event
    any_handled: bool,
    callback: KeyEventCallback,
}

/// A native key transition as reported by the windowing layer
#[derive(Debug, Clone, Copy)]
pub struct RawKey<'a> {
    /// Tizen key symbol, e.g. "a" or "BackSpace"
    pub key: &'a str,
    /// Text produced by the key
    pub string: Option<&'a str>,
    /// Composed text from the input method
    pub compose: Option<&'a str>,
    /// Ecore modifier mask
    pub modifiers: u32,
    /// XKB scan code, 0 when unknown
    pub scan_code: u32,
    /// Press or release
    pub is_down: bool,
}

/// Dispatches key events and reconciles the replies of both delivery paths
pub struct KeyboardChannel {
    event_sink: Box<dyn KeyEventSink>,
    message_channel: Box<dyn KeyMessageChannel>,
    config: KeyboardConfig,
    /// Key events sent but not answered by both paths, by sequence id
    pending_events: BTreeMap<u64, PendingKeyEvent>,
    /// Sequence id for the next event
    next_sequence_id: u64,
    press_state: PressStateTracker,
    replies: ReplyQueue,
}

impl KeyboardChannel {
    /// Creates a channel with the default configuration
    pub fn new(
        event_sink: Box<dyn KeyEventSink>,
        message_channel: Box<dyn KeyMessageChannel>,
    ) -> Self {
        Self::with_config(event_sink, message_channel, KeyboardConfig::default())
    }

    /// Creates a channel with an explicit configuration
    pub fn with_config(
        event_sink: Box<dyn KeyEventSink>,
        message_channel: Box<dyn KeyMessageChannel>,
        config: KeyboardConfig,
    ) -> Self {
        Self {
            event_sink,
            message_channel,
            config,
            pending_events: BTreeMap::new(),
            next_sequence_id: 0,
            press_state: PressStateTracker::new(),
            replies: ReplyQueue::default(),
        }
    }

    /// Sends one key transition down both delivery paths.
    ///
    /// `callback` runs once both paths replied. Replies given synchronously
    /// by the paths are applied before this returns; later ones are applied
    /// by [`KeyboardChannel::process_replies`]. Returns the event's sequence id.
    pub fn send_key(&mut self, raw: RawKey<'_>, callback: KeyEventCallback) -> u64 {
        let sequence_id = self.next_sequence_id;
        self.next_sequence_id += 1;

        if self.pending_events.len() > self.config.max_pending_events {
            warn!(
                "There are {} keyboard events that have not yet received a response \
                 from the framework. Are responses being sent?",
                self.pending_events.len()
            );
        }
        self.pending_events.insert(
            sequence_id,
            PendingKeyEvent {
                unreplied: 2,
                any_handled: false,
                callback,
            },
        );

        let scan_code = match raw.scan_code {
            0 => fallback_scan_code(raw.key),
            scan_code => scan_code,
        };
        if raw.is_down {
            debug!("Key symbol: {}, code: 0x{:08x}", raw.key, scan_code);
        }

        if self.send_embedder_event(&raw, scan_code, sequence_id) {
            self.send_channel_event(&raw, scan_code, sequence_id);
        } else {
            // The legacy path never saw this event; answer in its place.
            self.resolve_pending_event(sequence_id, false);
        }

        self.process_replies();
        sequence_id
    }

    /// Sends the structured event. Returns false when the event was an
    /// orphaned release, which has already been resolved as handled.
    fn send_embedder_event(&mut self, raw: &RawKey<'_>, scan_code: u32, sequence_id: u64) -> bool {
        let physical = physical_key_for_scan_code(scan_code);
        let logical = logical_key_for_symbol(raw.key);

        let (event_type, logical) = match self.press_state.classify(physical, logical, raw.is_down) {
            KeyTransition::Down => (KeyEventType::Down, logical),
            KeyTransition::Repeat { recorded_logical } => (KeyEventType::Repeat, recorded_logical),
            KeyTransition::Up { recorded_logical } => (KeyEventType::Up, recorded_logical),
            KeyTransition::OrphanUp => {
                // Released before, or pressed on another keyboard with the same
                // physical key. Send a neutral event and swallow the release.
                self.event_sink.send_key_event(KeyEvent::empty(), None);
                self.resolve_pending_event(sequence_id, true);
                return false;
            }
        };

        let event = KeyEvent {
            timestamp: timestamp_micros(),
            event_type,
            physical,
            logical,
            character: raw
                .string
                .filter(|_| raw.is_down)
                .map(str::to_string),
            synthesized: false,
        };
        let reply = self.replies.handle(sequence_id, DeliveryPath::Embedder);
        self.event_sink.send_key_event(event, Some(reply));
        true
    }

    fn send_channel_event(&mut self, raw: &RawKey<'_>, scan_code: u32, sequence_id: u64) {
        let message = LegacyKeyMessage::new(
            raw.string,
            gtk_key_code_for_scan_code(scan_code),
            scan_code,
            gtk_modifiers_for_ecore(raw.modifiers),
            raw.is_down,
        );
        match message.encode() {
            Ok(bytes) => {
                let reply = self.replies.channel_handle(sequence_id);
                self.message_channel.send(bytes, reply);
            }
            Err(err) => {
                error!("Could not send key event {sequence_id} on {KEY_EVENT_CHANNEL_NAME}: {err}");
                self.resolve_pending_event(sequence_id, false);
            }
        }
    }

    /// Applies one path's answer to a pending event.
    ///
    /// # Panics
    ///
    /// Panics if `sequence_id` is not pending. A reply for an unknown event
    /// means a path answered twice or answered an event it was never sent,
    /// and the two paths can no longer be reconciled.
    pub fn resolve_pending_event(&mut self, sequence_id: u64, handled: bool) {
        let Some(event) = self.pending_events.get_mut(&sequence_id) else {
            panic!("Received a reply for key event {sequence_id}, which is not pending");
        };
        event.any_handled |= handled;
        event.unreplied -= 1;
        if event.unreplied == 0 {
            if let Some(event) = self.pending_events.remove(&sequence_id) {
                (event.callback)(event.any_handled);
            }
        }
    }

    /// Applies every reply posted so far. Returns how many were applied.
    pub fn process_replies(&mut self) -> usize {
        let mut processed = 0;
        while let Some(message) = self.replies.receive() {
            if !self.is_pending(message.sequence_id) {
                panic!(
                    "Received a {:?} reply for key event {}, which is not pending",
                    message.path, message.sequence_id
                );
            }
            self.resolve_pending_event(message.sequence_id, message.handled);
            processed += 1;
        }
        processed
    }

    /// Number of events still waiting for at least one reply
    pub fn pending_count(&self) -> usize {
        self.pending_events.len()
    }

    /// Whether `sequence_id` is still waiting for a reply
    pub fn is_pending(&self, sequence_id: u64) -> bool {
        self.pending_events.contains_key(&sequence_id)
    }

    /// Currently pressed keys, physical to logical
    pub fn pressed_keys(&self) -> BTreeMap<u64, u64> {
        self.press_state.snapshot()
    }

    /// Forgets every pressed key, e.g. after the view lost focus.
    pub fn clear_pressed_keys(&mut self) {
        self.press_state.clear();
    }

    /// Handles a method call on the `flutter/keyboard` channel.
    pub fn handle_method_call(&self, method: &str) -> Result<Value> {
        match method {
            GET_KEYBOARD_STATE_METHOD => {
                let state: Map<String, Value> = self
                    .press_state
                    .snapshot()
                    .into_iter()
                    .map(|(physical, logical)| (physical.to_string(), Value::from(logical)))
                    .collect();
                Ok(Value::Object(state))
            }
            _ => Err(EmbedderError::NotImplemented(method.to_string())),
        }
    }
}
