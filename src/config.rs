//! Runtime configuration for the keyboard channel and the vsync waiter

use std::time::Duration;

use serde::Deserialize;

/// Number of unresolved key events above which a warning is logged.
pub const DEFAULT_MAX_PENDING_EVENTS: usize = 1000;

/// Frame interval used when the display refresh rate is unknown.
pub const DEFAULT_FRAME_INTERVAL_NANOS: u64 = 16_600_000;

/// Keyboard channel settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    /// Soft limit on in-flight key events. Exceeding it only logs a warning.
    pub max_pending_events: usize,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            max_pending_events: DEFAULT_MAX_PENDING_EVENTS,
        }
    }
}

/// Vsync waiter settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VsyncConfig {
    /// Display refresh rate in Hz, if the host knows it
    pub refresh_rate: Option<f64>,
    /// How long the worker waits for a vblank completion before warning again
    #[serde(with = "millis")]
    pub vblank_timeout: Duration,
    /// Name given to the worker thread
    pub thread_name: String,
}

impl Default for VsyncConfig {
    fn default() -> Self {
        Self {
            refresh_rate: None,
            vblank_timeout: Duration::from_millis(100),
            thread_name: "flutter-vsync".to_string(),
        }
    }
}

impl VsyncConfig {
    /// Time between two frames in nanoseconds.
    ///
    /// Falls back to the 16.6 ms approximation when no usable refresh rate
    /// was configured.
    pub fn frame_interval_nanos(&self) -> u64 {
        frame_interval_nanos(self.refresh_rate)
    }
}

/// Converts a refresh rate in Hz into a frame interval in nanoseconds.
pub fn frame_interval_nanos(refresh_rate: Option<f64>) -> u64 {
    match refresh_rate {
        Some(rate) if rate.is_finite() && rate > 0.0 => (1e9 / rate) as u64,
        _ => DEFAULT_FRAME_INTERVAL_NANOS,
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_interval_uses_refresh_rate() {
        assert_eq!(frame_interval_nanos(Some(120.0)), 8_333_333);
        assert_eq!(frame_interval_nanos(Some(50.0)), 20_000_000);
    }

    #[test]
    fn frame_interval_falls_back_without_refresh_rate() {
        assert_eq!(frame_interval_nanos(None), DEFAULT_FRAME_INTERVAL_NANOS);
        assert_eq!(frame_interval_nanos(Some(0.0)), DEFAULT_FRAME_INTERVAL_NANOS);
        assert_eq!(
            frame_interval_nanos(Some(f64::NAN)),
            DEFAULT_FRAME_INTERVAL_NANOS
        );
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: VsyncConfig =
            serde_json::from_str(r#"{ "refresh_rate": 60.0, "vblank_timeout": 250 }"#).unwrap();
        assert_eq!(config.refresh_rate, Some(60.0));
        assert_eq!(config.vblank_timeout, Duration::from_millis(250));
        assert_eq!(config.thread_name, "flutter-vsync");

        let keyboard: KeyboardConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(keyboard.max_pending_events, DEFAULT_MAX_PENDING_EVENTS);
    }
}
