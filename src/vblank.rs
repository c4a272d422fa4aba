//! Platform vblank sources
//!
//! A [`VblankSource`] asks the display for the next vertical blank and calls
//! back with its timestamp. [`TimerVblankSource`] emulates one in software
//! for displays without vblank events.

use std::{
    sync::OnceLock,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, error};

use crate::{
    config::frame_interval_nanos,
    error::{EmbedderError, Result},
};

/// Time of a vblank on the monotonic clock, split like `struct timeval`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VblankTimestamp {
    /// Whole seconds
    pub tv_sec: u32,
    /// Microseconds within the second
    pub tv_usec: u32,
}

impl VblankTimestamp {
    /// Splits a duration since the clock's origin.
    pub fn from_duration(elapsed: Duration) -> Self {
        Self {
            tv_sec: elapsed.as_secs() as u32,
            tv_usec: elapsed.subsec_micros(),
        }
    }

    /// Timestamp in nanoseconds, the unit the engine expects.
    pub fn frame_start_nanos(&self) -> u64 {
        u64::from(self.tv_sec) * 1_000_000_000 + u64::from(self.tv_usec) * 1_000
    }
}

/// Called once when the requested vblank happened
pub type VblankCallback = Box<dyn FnOnce(VblankTimestamp) + Send>;

/// Source of vblank events for one display output
pub trait VblankSource: Send + Sync {
    /// Whether the source was initialized successfully
    fn is_valid(&self) -> bool;

    /// Requests the next vblank.
    ///
    /// `callback` runs on a thread of the source's choosing once the vblank
    /// occurs. An error means the request was rejected and `callback` will
    /// not run.
    fn wait_vblank(&self, callback: VblankCallback) -> Result<()>;
}

/// Time elapsed on the process monotonic clock.
pub fn monotonic_now() -> Duration {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    ORIGIN.get_or_init(Instant::now).elapsed()
}

/// Software vblank ticking at a fixed refresh rate.
///
/// Requests are served in order on a private timer thread, each at the next
/// interval boundary after it was picked up.
pub struct TimerVblankSource {
    interval: Duration,
    sender: Option<Sender<VblankCallback>>,
    timer: Option<JoinHandle<()>>,
}

impl TimerVblankSource {
    /// Creates a source ticking at `refresh_rate` Hz, or at ~60 Hz if unknown.
    pub fn new(refresh_rate: Option<f64>) -> Self {
        let interval = Duration::from_nanos(frame_interval_nanos(refresh_rate));
        let (sender, receiver) = unbounded();
        match thread::Builder::new()
            .name("flutter-vblank-timer".to_string())
            .spawn(move || run_timer(interval, receiver))
        {
            Ok(timer) => Self {
                interval,
                sender: Some(sender),
                timer: Some(timer),
            },
            Err(err) => {
                error!("Failed to start the vblank timer: {err}");
                Self {
                    interval,
                    sender: None,
                    timer: None,
                }
            }
        }
    }

    /// Interval between two vblanks
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl VblankSource for TimerVblankSource {
    fn is_valid(&self) -> bool {
        self.sender.is_some()
    }

    fn wait_vblank(&self, callback: VblankCallback) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(EmbedderError::VblankUnavailable)?;
        sender
            .send(callback)
            .map_err(|_| EmbedderError::VblankWait("vblank timer stopped".to_string()))
    }
}

impl Drop for TimerVblankSource {
    fn drop(&mut self) {
        // Disconnecting the queue ends the timer loop.
        self.sender = None;
        if let Some(timer) = self.timer.take() {
            if timer.thread().id() != thread::current().id() {
                let _ = timer.join();
            }
        }
    }
}

fn run_timer(interval: Duration, receiver: Receiver<VblankCallback>) {
    let interval_nanos = interval.as_nanos().max(1);
    while let Ok(callback) = receiver.recv() {
        let now = monotonic_now();
        let ticks = now.as_nanos() / interval_nanos + 1;
        let next = Duration::from_nanos((ticks * interval_nanos) as u64);
        thread::sleep(next.saturating_sub(now));
        callback(VblankTimestamp::from_duration(next));
    }
    debug!("Vblank timer stopped");
}
