//! Key event reconciliation and vsync scheduling for the Flutter embedder on Tizen
//!
//! This crate sits between Tizen's native input and display services and the
//! Flutter engine. The host forwards native key transitions and vsync
//! requests; the crate talks to the engine through the callbacks the host
//! provides.
//!
//! # Architecture
//!
//! - **KeyboardChannel**: sends every key transition through the structured
//!   embedder path and the legacy `flutter/keyevent` channel, and reports one
//!   "handled" verdict once both replied
//! - **PressStateTracker**: tells down, repeat and up apart per physical key
//! - **VsyncWaiter**: runs vblank waits on a dedicated thread and reports frame
//!   timings to the engine
//! - **ffi**: C entry points for native hosts

#![warn(missing_docs)]

mod channel;
mod config;
mod error;
mod key_event;
mod keyboard;
mod press_state;
mod vblank;
mod vsync;

pub mod ffi;
pub mod key_mapping;

pub use channel::*;
pub use config::*;
pub use error::*;
pub use key_event::*;
pub use keyboard::*;
pub use press_state::*;
pub use vblank::*;
pub use vsync::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        channel::{ChannelReply, KeyReply},
        config::{KeyboardConfig, VsyncConfig},
        error::{EmbedderError, Result},
        key_event::{KeyEvent, KeyEventType},
        keyboard::{KeyEventSink, KeyMessageChannel, KeyboardChannel, RawKey},
        vblank::{TimerVblankSource, VblankSource, VblankTimestamp},
        vsync::{VsyncEngine, VsyncWaiter},
    };
}
