//! Stream session lifetime and the state shared with the backend loop.
//!
//! A [`StreamSession`] owns exactly one connected backend stream. The
//! state the backend's real-time callbacks touch lives in
//! [`StreamShared`], reachable from both the session (caller side) and
//! the backend's processing loop without either holding a lock across
//! the hand-off.

use std::sync::{Arc, Mutex, PoisonError};

use crate::caps::{AudioCaps, AudioPacket, ChannelLayout};
use crate::config::{BridgeConfig, COMMON_SAMPLE_RATES};
use crate::error::BridgeError;
use crate::format::{self, AudioConverter, DeviceFormat};

use super::buffer::ExchangeBuffer;

/// Data flow direction of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Device to application.
    Capture,
    /// Application to device.
    Playback,
}

/// Everything a backend needs to connect a stream.
#[derive(Debug, Clone)]
pub struct StreamIntent {
    /// Data flow direction.
    pub direction: Direction,
    /// Device node the stream should attach to.
    pub target_device: String,
    /// Node name the stream advertises.
    pub stream_name: String,
    /// Preferred device-layer encoding, offered first during negotiation.
    pub requested_device_format: DeviceFormat,
    /// Preferred channel count.
    pub requested_channels: u32,
    /// Preferred sample rate, clamped to the common-rate range.
    pub requested_rate: u32,
}

/// Result of filling one playback buffer cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackFill {
    /// Bytes copied into the device buffer.
    pub copied: usize,
    /// Frame stride in bytes of the negotiated format, 0 if none.
    pub stride: usize,
}

/// State shared between the caller and the backend's processing loop.
///
/// The exchange buffer and the converter each carry their own lock; the
/// real-time callbacks only ever take one at a time.
pub struct StreamShared {
    buffer: ExchangeBuffer,
    converter: Mutex<AudioConverter>,
    negotiated: Mutex<Option<AudioCaps>>,
    direction: Direction,
    latency_ms: u64,
}

impl StreamShared {
    pub(crate) fn new(direction: Direction, latency_ms: u64) -> Self {
        Self {
            buffer: ExchangeBuffer::new(),
            converter: Mutex::new(AudioConverter::new()),
            negotiated: Mutex::new(None),
            direction,
            latency_ms,
        }
    }

    /// Data flow direction of the owning stream.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The format the device agreed to, once negotiation completed.
    pub fn negotiated(&self) -> Option<AudioCaps> {
        *self
            .negotiated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies a format the device negotiated.
    ///
    /// Derives the exchange buffer's high-water mark from the configured
    /// latency and the negotiated frame geometry, and retargets the
    /// converter. Returns `false` for formats outside the capability
    /// table, which leaves the previous state untouched.
    pub fn format_changed(&self, device_format: DeviceFormat, channels: u32, rate: u32) -> bool {
        let Some(entry) = format::by_device_format(device_format) else {
            tracing::warn!(?device_format, "negotiated format has no table entry");
            return false;
        };
        let Some(layout) = ChannelLayout::from_channels(channels) else {
            tracing::warn!(channels, "negotiated channel count has no layout");
            return false;
        };

        let caps = AudioCaps::new(entry.format, layout, rate);
        let high_water = self.latency_ms as usize
            * caps.bytes_per_sample()
            * channels as usize
            * rate as usize
            / 4000;

        self.buffer.set_high_water(high_water);

        {
            let mut converter = self
                .converter
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            converter.set_output_caps(caps);
            converter.reset();
        }

        *self
            .negotiated
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(caps);

        tracing::debug!(?caps, high_water, "stream format negotiated");
        true
    }

    /// Accepts one captured chunk from the device loop.
    pub fn capture_cycle(&self, chunk: &[u8]) {
        self.buffer.push_captured(chunk);
    }

    /// Fills one playback buffer from queued data.
    ///
    /// Copies whatever is queued, up to the buffer's capacity; the rest of
    /// the device buffer plays as silence only if the backend zeroed it.
    pub fn playback_cycle(&self, out: &mut [u8]) -> PlaybackFill {
        let stride = self.negotiated().map(|caps| caps.frame_size()).unwrap_or(0);
        let copied = self.buffer.drain_into(out);
        PlaybackFill { copied, stride }
    }

    /// Takes all captured bytes, blocking briefly when none are queued.
    pub fn read_all(&self) -> Vec<u8> {
        self.buffer.take_all()
    }

    /// Converts and queues a packet for playback.
    ///
    /// Returns `false` when the packet is empty, the buffer stayed at its
    /// high-water mark for the full wait, or no format has been negotiated
    /// yet. A `false` return means the data was dropped.
    pub fn write_packet(&self, packet: &AudioPacket) -> bool {
        if packet.is_empty() {
            return false;
        }

        if !self.buffer.wait_writable() {
            return false;
        }

        let converted = {
            let converter = self
                .converter
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            converter.convert(packet)
        };

        match converted {
            Some(converted) => {
                self.buffer.append(&converted.data);
                true
            }
            None => false,
        }
    }

    /// Drops all queued data and wakes blocked writers.
    pub fn clear(&self) {
        self.buffer.clear();
    }
}

/// A backend-specific connected stream.
///
/// Implementations own whatever resources the connection needs (threads,
/// server proxies) and release them in `disconnect`, which must be
/// idempotent.
pub trait StreamBackend: Send {
    /// Connects a stream described by `intent`, wiring its data callbacks
    /// to `shared`.
    fn connect(&mut self, intent: &StreamIntent, shared: Arc<StreamShared>)
        -> Result<(), BridgeError>;

    /// Tears the stream down.
    fn disconnect(&mut self);
}

/// Creates backend streams. One factory serves the whole bridge.
pub trait StreamBackendFactory: Send + Sync {
    /// Creates an unconnected backend stream.
    fn create(&self) -> Box<dyn StreamBackend>;
}

/// A live stream session: one connected backend plus its shared state.
pub struct StreamSession {
    backend: Box<dyn StreamBackend>,
    shared: Arc<StreamShared>,
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession").finish_non_exhaustive()
    }
}

impl StreamSession {
    /// Negotiates and connects a stream for `device`.
    ///
    /// The requested caps must have a capability-table entry; the rate is
    /// clamped into the common-rate range before it reaches the backend.
    pub fn start(
        factory: &dyn StreamBackendFactory,
        direction: Direction,
        device: &str,
        caps: &AudioCaps,
        config: &BridgeConfig,
    ) -> Result<Self, BridgeError> {
        let Some(entry) = format::by_format(caps.format, caps.planar) else {
            return Err(BridgeError::UnsupportedFormat {
                format: if caps.planar {
                    format!("{:?} (planar)", caps.format)
                } else {
                    format!("{:?}", caps.format)
                },
            });
        };

        let min_rate = *COMMON_SAMPLE_RATES.first().unwrap_or(&caps.rate);
        let max_rate = *COMMON_SAMPLE_RATES.last().unwrap_or(&caps.rate);

        let intent = StreamIntent {
            direction,
            target_device: device.to_string(),
            stream_name: match direction {
                Direction::Capture => config.capture_stream_name.clone(),
                Direction::Playback => config.playback_stream_name.clone(),
            },
            requested_device_format: entry.device_format,
            requested_channels: caps.channels(),
            requested_rate: caps.rate.clamp(min_rate, max_rate),
        };

        let shared = Arc::new(StreamShared::new(direction, config.latency_ms()));

        let mut backend = factory.create();
        backend.connect(&intent, shared.clone())?;

        tracing::info!(device, ?direction, "stream session started");

        Ok(Self { backend, shared })
    }

    /// The state shared with the backend loop.
    pub fn shared(&self) -> Arc<StreamShared> {
        self.shared.clone()
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.backend.disconnect();
        self.shared.clear();
    }
}
