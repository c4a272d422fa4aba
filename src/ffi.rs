//! C entry points for native hosts
//!
//! The host owns the returned handles and must destroy them with the
//! matching `*_destroy` function. Functions reporting failure store a
//! message retrievable with [`flutter_tizen_get_last_error`].

use std::{
    ffi::{CStr, CString, c_char, c_void},
    ptr,
    sync::{Arc, Mutex},
};

use log::error;

use crate::{
    channel::{ChannelReply, KeyReply},
    config::VsyncConfig,
    error::EmbedderError,
    key_event::KeyEvent,
    keyboard::{KeyEventSink, KeyMessageChannel, KeyboardChannel, RawKey},
    vblank::TimerVblankSource,
    vsync::{VsyncEngine, VsyncWaiter},
};

/// Stores the last error that occurred in an entry point
static LAST_ERROR: Mutex<Option<String>> = Mutex::new(None);

/// Store an error message for the host
#[doc(hidden)]
pub fn store_error(message: String) {
    error!("{message}");
    if let Ok(mut last_error) = LAST_ERROR.lock() {
        *last_error = Some(message);
    }
}

/// Retrieve and clear the last error message
#[doc(hidden)]
pub fn take_last_error() -> Option<String> {
    LAST_ERROR.lock().ok().and_then(|mut e| e.take())
}

/// Structured key event as seen by the host
#[repr(C)]
pub struct FlutterTizenKeyEvent {
    /// Microseconds on a monotonic clock
    pub timestamp: f64,
    /// 1 = down, 2 = up, 3 = repeat
    pub event_type: u8,
    /// Flutter physical key code
    pub physical: u64,
    /// Flutter logical key code
    pub logical: u64,
    /// NUL-terminated UTF-8 text, or null
    pub character: *const c_char,
    /// Whether the embedder made this event up
    pub synthesized: bool,
}

/// Delivers a structured key event. `reply` is null when no answer is expected.
pub type FlutterTizenKeyEventHandler =
    extern "C" fn(event: *const FlutterTizenKeyEvent, reply: *mut KeyReply, user_data: *mut c_void);

/// Delivers an encoded `flutter/keyevent` message.
pub type FlutterTizenKeyMessageHandler = extern "C" fn(
    message: *const u8,
    message_size: usize,
    reply: *mut ChannelReply,
    user_data: *mut c_void,
);

/// Receives the consolidated verdict of a key event.
pub type FlutterTizenKeyCallback = extern "C" fn(handled: bool, user_data: *mut c_void);

/// Receives a vsync for a baton. Runs on the vblank thread with the waiter's
/// engine lock held.
pub type FlutterTizenVsyncCallback = extern "C" fn(
    user_data: *mut c_void,
    baton: isize,
    frame_start_time_nanos: u64,
    frame_target_time_nanos: u64,
);

struct HostKeyEventSink {
    handler: FlutterTizenKeyEventHandler,
    user_data: *mut c_void,
}

impl KeyEventSink for HostKeyEventSink {
    fn send_key_event(&self, event: KeyEvent, reply: Option<KeyReply>) {
        let character = event
            .character
            .and_then(|character| CString::new(character).ok());
        let host_event = FlutterTizenKeyEvent {
            timestamp: event.timestamp,
            event_type: event.event_type as u8,
            physical: event.physical,
            logical: event.logical,
            character: character.as_ref().map_or(ptr::null(), |c| c.as_ptr()),
            synthesized: event.synthesized,
        };
        let reply = reply.map_or(ptr::null_mut(), |reply| Box::into_raw(Box::new(reply)));
        (self.handler)(&host_event, reply, self.user_data);
    }
}

struct HostKeyMessageChannel {
    handler: FlutterTizenKeyMessageHandler,
    user_data: *mut c_void,
}

impl KeyMessageChannel for HostKeyMessageChannel {
    fn send(&self, message: Vec<u8>, reply: ChannelReply) {
        let reply = Box::into_raw(Box::new(reply));
        (self.handler)(message.as_ptr(), message.len(), reply, self.user_data);
    }
}

struct HostVsyncEngine {
    callback: FlutterTizenVsyncCallback,
    user_data: *mut c_void,
}

// SAFETY: The host guarantees that `user_data` may be used from the vblank
// thread for as long as the waiter exists.
unsafe impl Send for HostVsyncEngine {}
unsafe impl Sync for HostVsyncEngine {}

impl VsyncEngine for HostVsyncEngine {
    fn on_vsync(&self, baton: isize, frame_start_time_nanos: u64, frame_target_time_nanos: u64) {
        (self.callback)(
            self.user_data,
            baton,
            frame_start_time_nanos,
            frame_target_time_nanos,
        );
    }
}

/// Reads an optional C string, storing an error for invalid UTF-8.
unsafe fn optional_str<'a>(value: *const c_char, what: &str) -> Result<Option<&'a str>, ()> {
    if value.is_null() {
        return Ok(None);
    }
    match unsafe { CStr::from_ptr(value) }.to_str() {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            store_error(format!("{what} is not valid UTF-8: {err}"));
            Err(())
        }
    }
}

/// Creates a keyboard channel bound to the host's delivery paths.
///
/// Returns null if a handler is missing.
#[unsafe(no_mangle)]
pub extern "C" fn flutter_tizen_keyboard_channel_create(
    event_handler: Option<FlutterTizenKeyEventHandler>,
    message_handler: Option<FlutterTizenKeyMessageHandler>,
    user_data: *mut c_void,
) -> *mut KeyboardChannel {
    let (Some(event_handler), Some(message_handler)) = (event_handler, message_handler) else {
        store_error(EmbedderError::NullPointer("key event handler").to_string());
        return ptr::null_mut();
    };
    let channel = KeyboardChannel::new(
        Box::new(HostKeyEventSink {
            handler: event_handler,
            user_data,
        }),
        Box::new(HostKeyMessageChannel {
            handler: message_handler,
            user_data,
        }),
    );
    Box::into_raw(Box::new(channel))
}

/// Sends a native key transition. Returns false if the arguments were invalid.
///
/// # Safety
/// `channel` must come from [`flutter_tizen_keyboard_channel_create`], and the
/// string arguments must be null or valid NUL-terminated strings.
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn flutter_tizen_keyboard_channel_send_key(
    channel: *mut KeyboardChannel,
    key: *const c_char,
    string: *const c_char,
    compose: *const c_char,
    modifiers: u32,
    scan_code: u32,
    is_down: bool,
    callback: Option<FlutterTizenKeyCallback>,
    callback_user_data: *mut c_void,
) -> bool {
    if channel.is_null() {
        store_error(EmbedderError::NullPointer("keyboard channel").to_string());
        return false;
    }
    let key = match unsafe { optional_str(key, "key") } {
        Ok(Some(key)) => key,
        Ok(None) => {
            store_error(EmbedderError::NullPointer("key").to_string());
            return false;
        }
        Err(()) => return false,
    };
    let (Ok(string), Ok(compose)) = (unsafe {
        (
            optional_str(string, "string"),
            optional_str(compose, "compose"),
        )
    }) else {
        return false;
    };

    let channel = unsafe { &mut *channel };
    channel.send_key(
        RawKey {
            key,
            string,
            compose,
            modifiers,
            scan_code,
            is_down,
        },
        Box::new(move |handled| {
            if let Some(callback) = callback {
                callback(handled, callback_user_data);
            }
        }),
    );
    true
}

/// Applies replies given since the last call. Returns how many were applied.
///
/// # Safety
/// `channel` must come from [`flutter_tizen_keyboard_channel_create`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn flutter_tizen_keyboard_channel_process_replies(
    channel: *mut KeyboardChannel,
) -> usize {
    if channel.is_null() {
        return 0;
    }
    unsafe { &mut *channel }.process_replies()
}

/// Destroys a keyboard channel.
///
/// # Safety
/// `channel` must come from [`flutter_tizen_keyboard_channel_create`] and not
/// be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn flutter_tizen_keyboard_channel_destroy(channel: *mut KeyboardChannel) {
    if !channel.is_null() {
        unsafe {
            let _ = Box::from_raw(channel);
        }
    }
}

/// Answers a structured key event. Consumes `reply`.
///
/// # Safety
/// `reply` must be a handle passed to the key event handler, answered once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn flutter_tizen_key_reply(reply: *mut KeyReply, handled: bool) {
    if reply.is_null() {
        return;
    }
    let reply = unsafe { Box::from_raw(reply) };
    reply.reply(handled);
}

/// Answers a `flutter/keyevent` message with the framework's encoded reply,
/// or null if the framework sent none. Consumes `reply`.
///
/// # Safety
/// `reply` must be a handle passed to the message handler, answered once, and
/// `data` must be null or point to `size` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn flutter_tizen_channel_reply(
    reply: *mut ChannelReply,
    data: *const u8,
    size: usize,
) {
    if reply.is_null() {
        return;
    }
    let reply = unsafe { Box::from_raw(reply) };
    let response = (!data.is_null()).then(|| unsafe { std::slice::from_raw_parts(data, size) });
    reply.reply(response);
}

/// Starts a vsync waiter on the software vblank source.
///
/// A `refresh_rate` of zero or less selects the default frame interval.
/// Returns null if `callback` is missing.
#[unsafe(no_mangle)]
pub extern "C" fn flutter_tizen_vsync_waiter_create(
    callback: Option<FlutterTizenVsyncCallback>,
    user_data: *mut c_void,
    refresh_rate: f64,
) -> *mut VsyncWaiter {
    let Some(callback) = callback else {
        store_error(EmbedderError::NullPointer("vsync callback").to_string());
        return ptr::null_mut();
    };
    let refresh_rate = (refresh_rate > 0.0).then_some(refresh_rate);
    let config = VsyncConfig {
        refresh_rate,
        ..VsyncConfig::default()
    };
    let waiter = VsyncWaiter::new(
        Arc::new(HostVsyncEngine {
            callback,
            user_data,
        }),
        Box::new(TimerVblankSource::new(refresh_rate)),
        config,
    );
    if !waiter.is_valid() {
        store_error(EmbedderError::VblankUnavailable.to_string());
    }
    Box::into_raw(Box::new(waiter))
}

/// Requests a vsync for `baton`.
///
/// # Safety
/// `waiter` must come from [`flutter_tizen_vsync_waiter_create`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn flutter_tizen_vsync_waiter_request(waiter: *const VsyncWaiter, baton: isize) {
    if let Some(waiter) = unsafe { waiter.as_ref() } {
        waiter.async_wait_for_vsync(baton);
    }
}

/// Stops and destroys a vsync waiter. No vsync is delivered after this returns.
///
/// # Safety
/// `waiter` must come from [`flutter_tizen_vsync_waiter_create`] and not be
/// used afterwards. The vsync callback may destroy its own waiter; it is
/// not called again once it returns. From any other thread, the waiter must
/// not be destroyed while a request on it is being made.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn flutter_tizen_vsync_waiter_destroy(waiter: *mut VsyncWaiter) {
    if !waiter.is_null() {
        unsafe {
            let _ = Box::from_raw(waiter);
        }
    }
}

/// Get the last error message (if any) and clear it
/// Returns a pointer to a C string, or null if no error
/// The caller is responsible for freeing the returned string with flutter_tizen_free_error
#[unsafe(no_mangle)]
pub extern "C" fn flutter_tizen_get_last_error() -> *mut c_char {
    if let Some(error) = take_last_error() {
        if let Ok(c_string) = CString::new(error) {
            return c_string.into_raw();
        }
    }
    ptr::null_mut()
}

/// Free an error string returned by flutter_tizen_get_last_error
///
/// # Safety
/// `error` must come from [`flutter_tizen_get_last_error`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn flutter_tizen_free_error(error: *mut c_char) {
    if !error.is_null() {
        unsafe {
            let _ = CString::from_raw(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicIsize, AtomicUsize, Ordering},
        time::{Duration, Instant},
    };

    use super::*;
    use crate::key_event::KeyEventType;

    #[derive(Default)]
    struct Host {
        events: Vec<(u8, u64, Option<String>, *mut KeyReply)>,
        messages: Vec<(Vec<u8>, *mut ChannelReply)>,
        verdicts: Vec<bool>,
    }

    extern "C" fn on_event(
        event: *const FlutterTizenKeyEvent,
        reply: *mut KeyReply,
        user_data: *mut c_void,
    ) {
        let host = unsafe { &mut *(user_data as *mut Host) };
        let event = unsafe { &*event };
        let character = (!event.character.is_null()).then(|| {
            unsafe { CStr::from_ptr(event.character) }
                .to_string_lossy()
                .into_owned()
        });
        host.events
            .push((event.event_type, event.physical, character, reply));
    }

    extern "C" fn on_message(
        message: *const u8,
        message_size: usize,
        reply: *mut ChannelReply,
        user_data: *mut c_void,
    ) {
        let host = unsafe { &mut *(user_data as *mut Host) };
        let message = unsafe { std::slice::from_raw_parts(message, message_size) }.to_vec();
        host.messages.push((message, reply));
    }

    extern "C" fn on_verdict(handled: bool, user_data: *mut c_void) {
        let host = unsafe { &mut *(user_data as *mut Host) };
        host.verdicts.push(handled);
    }

    #[test]
    fn key_round_trip_through_c_abi() {
        let host = Box::into_raw(Box::new(Host::default()));
        let user_data = host as *mut c_void;
        let channel =
            flutter_tizen_keyboard_channel_create(Some(on_event), Some(on_message), user_data);
        assert!(!channel.is_null());

        let key = CString::new("a").unwrap();
        unsafe {
            assert!(flutter_tizen_keyboard_channel_send_key(
                channel,
                key.as_ptr(),
                key.as_ptr(),
                ptr::null(),
                0,
                0x26,
                true,
                Some(on_verdict),
                user_data,
            ));
        }

        let ((event_type, physical, character, event_reply), (message, message_reply)) = unsafe {
            let host = &mut *host;
            (host.events.remove(0), host.messages.remove(0))
        };
        assert_eq!(event_type, KeyEventType::Down as u8);
        assert_eq!(physical, 0x00070004);
        assert_eq!(character.as_deref(), Some("a"));
        let message: serde_json::Value = serde_json::from_slice(&message).unwrap();
        assert_eq!(message["type"], "keydown");

        let answer = br#"{"handled":true}"#;
        unsafe {
            flutter_tizen_key_reply(event_reply, false);
            flutter_tizen_channel_reply(message_reply, answer.as_ptr(), answer.len());
            assert_eq!(flutter_tizen_keyboard_channel_process_replies(channel), 2);
            flutter_tizen_keyboard_channel_destroy(channel);
        }

        let host = unsafe { Box::from_raw(host) };
        assert_eq!(host.verdicts, vec![true]);
    }

    #[test]
    fn missing_handler_reports_error() {
        let channel =
            flutter_tizen_keyboard_channel_create(None, Some(on_message), ptr::null_mut());
        assert!(channel.is_null());

        let error = flutter_tizen_get_last_error();
        assert!(!error.is_null());
        let message = unsafe { CStr::from_ptr(error) }.to_string_lossy().into_owned();
        unsafe { flutter_tizen_free_error(error) };
        assert!(message.contains("null pointer"));
    }

    static VSYNC_COUNT: AtomicUsize = AtomicUsize::new(0);
    static VSYNC_BATON: AtomicIsize = AtomicIsize::new(0);

    extern "C" fn on_vsync(_user_data: *mut c_void, baton: isize, start: u64, target: u64) {
        if target > start {
            VSYNC_BATON.store(baton, Ordering::SeqCst);
            VSYNC_COUNT.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn vsync_round_trip_through_c_abi() {
        let waiter = flutter_tizen_vsync_waiter_create(Some(on_vsync), ptr::null_mut(), 240.0);
        assert!(!waiter.is_null());
        unsafe { flutter_tizen_vsync_waiter_request(waiter, 9) };

        let deadline = Instant::now() + Duration::from_secs(1);
        while VSYNC_COUNT.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        unsafe { flutter_tizen_vsync_waiter_destroy(waiter) };
        assert_eq!(VSYNC_COUNT.load(Ordering::SeqCst), 1);
        assert_eq!(VSYNC_BATON.load(Ordering::SeqCst), 9);
    }
}
