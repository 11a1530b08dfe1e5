//! Configuration types for the device bridge.

use std::time::Duration;

/// Sample rates the bridge advertises and negotiates against.
///
/// The list is ascending; negotiation clamps the requested rate range to
/// its first and last entries. It is device-independent: endpoints do not
/// advertise rates through the registry, so this fixed list stands in for
/// every device.
pub const COMMON_SAMPLE_RATES: &[u32] = &[
    5512, 8000, 11025, 16000, 22050, 32000, 44100, 48000, 64000, 88200, 96000, 128000, 176400,
    192000, 352800, 384000,
];

/// Configuration for bridge behavior.
///
/// Use [`BridgeConfig::default()`] for sensible defaults, or customize as
/// needed.
///
/// # Example
///
/// ```
/// use audio_bridge::BridgeConfig;
/// use std::time::Duration;
///
/// let config = BridgeConfig {
///     latency: Duration::from_millis(50),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Target end-to-end latency.
    ///
    /// The exchange buffer's high-water mark is derived from this value and
    /// the negotiated format: playback writers block above the mark and
    /// capture keeps only the newest mark's worth of bytes.
    /// Default: 25ms
    pub latency: Duration,

    /// Node name the stream advertises to the media server for capture.
    pub capture_stream_name: String,

    /// Node name the stream advertises to the media server for playback.
    pub playback_stream_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(25),
            capture_stream_name: "Audio Bridge Capture".to_string(),
            playback_stream_name: "Audio Bridge Playback".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Returns the configured latency in whole milliseconds.
    pub fn latency_ms(&self) -> u64 {
        self.latency.as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_sample_rates_sorted() {
        assert!(COMMON_SAMPLE_RATES.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*COMMON_SAMPLE_RATES.first().unwrap(), 5512);
        assert_eq!(*COMMON_SAMPLE_RATES.last().unwrap(), 384000);
    }

    #[test]
    fn test_bridge_config_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.latency, Duration::from_millis(25));
        assert_eq!(config.latency_ms(), 25);
        assert_eq!(config.capture_stream_name, "Audio Bridge Capture");
    }
}
