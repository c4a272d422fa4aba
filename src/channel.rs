//! Reply plumbing between the delivery paths and the keyboard channel
//!
//! Each delivery path gets a one-shot reply handle per key event. Replying
//! posts a message on a crossbeam channel, which the keyboard channel drains
//! on the thread that owns it. A path may therefore answer synchronously,
//! later on the same thread, or from another thread entirely.

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{error, warn};

use crate::key_event::LegacyKeyReply;

/// Which of the two delivery paths a reply belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPath {
    /// Structured key event through the embedder API
    Embedder,
    /// Legacy RawKeyEvent message on `flutter/keyevent`
    Channel,
}

/// A reply posted by one delivery path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyMessage {
    /// Key event the reply resolves
    pub sequence_id: u64,
    /// Path that replied
    pub path: DeliveryPath,
    /// Whether the path handled the event
    pub handled: bool,
}

/// One-shot reply handle for a single key event on a single path
#[derive(Debug)]
#[must_use = "an unanswered key event is never reported back to its caller"]
pub struct KeyReply {
    sequence_id: u64,
    path: DeliveryPath,
    sender: Sender<ReplyMessage>,
}

impl KeyReply {
    /// Key event this handle answers for
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    /// Reports whether the event was handled. Consumes the handle.
    pub fn reply(self, handled: bool) {
        let message = ReplyMessage {
            sequence_id: self.sequence_id,
            path: self.path,
            handled,
        };
        if self.sender.send(message).is_err() {
            // The keyboard channel is gone; nobody is waiting for this answer.
            warn!(
                "Dropping key event reply {} after the keyboard channel was destroyed",
                self.sequence_id
            );
        }
    }
}

/// Reply handle for the legacy message channel.
///
/// Takes the raw reply bytes from the framework and decodes them.
#[derive(Debug)]
#[must_use = "an unanswered key event is never reported back to its caller"]
pub struct ChannelReply {
    inner: KeyReply,
}

impl ChannelReply {
    /// Key event this handle answers for
    pub fn sequence_id(&self) -> u64 {
        self.inner.sequence_id
    }

    /// Resolves the event from the framework's encoded reply.
    ///
    /// A missing reply leaves the event pending, like any other unanswered
    /// message. A malformed one counts as not handled.
    pub fn reply(self, response: Option<&[u8]>) {
        let Some(bytes) = response else {
            warn!(
                "No reply from the framework for key event {}",
                self.inner.sequence_id
            );
            return;
        };
        let handled = match LegacyKeyReply::decode(bytes) {
            Ok(reply) => reply.handled,
            Err(err) => {
                error!("Invalid reply for key event {}: {err}", self.inner.sequence_id);
                false
            }
        };
        self.inner.reply(handled);
    }

    /// Resolves the event directly from a decoded verdict.
    pub fn reply_handled(self, handled: bool) {
        self.inner.reply(handled);
    }
}

/// Queue of replies waiting to be applied by the keyboard channel
#[derive(Debug)]
pub struct ReplyQueue {
    sender: Sender<ReplyMessage>,
    receiver: Receiver<ReplyMessage>,
}

impl Default for ReplyQueue {
    fn default() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }
}

impl ReplyQueue {
    /// Creates a reply handle for `sequence_id` on `path`
    pub fn handle(&self, sequence_id: u64, path: DeliveryPath) -> KeyReply {
        KeyReply {
            sequence_id,
            path,
            sender: self.sender.clone(),
        }
    }

    /// Creates a reply handle for the legacy message channel
    pub fn channel_handle(&self, sequence_id: u64) -> ChannelReply {
        ChannelReply {
            inner: self.handle(sequence_id, DeliveryPath::Channel),
        }
    }

    /// Receive a posted reply (non-blocking)
    pub fn receive(&self) -> Option<ReplyMessage> {
        self.receiver.try_recv().ok()
    }

    /// Number of replies posted but not yet received
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Whether no reply is waiting
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
