//! # audio-bridge
//!
//! Real-time bridge to the system's audio devices.
//!
//! `audio-bridge` keeps a live view of the media server's audio endpoints
//! (hot-plug, defaults, advertised formats) and exchanges PCM with one
//! device at a time through a latency-bounded buffer.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use audio_bridge::{device_event_callback, AudioBridge, BridgeConfig};
//!
//! let bridge = AudioBridge::new(BridgeConfig::default());
//!
//! bridge.on_event(device_event_callback(|e| tracing::info!(?e, "device event")));
//!
//! let mic = bridge.default_input().expect("no capture device");
//! let caps = bridge.preferred_format(&mic).expect("no advertised formats");
//! bridge.init(&mic, &caps)?;
//!
//! loop {
//!     let pcm = bridge.read(); // blocks up to 1s, empty on timeout
//!     // feed pcm downstream
//! }
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **Registry worker**: Dedicated thread consuming server events and
//!   maintaining the device view
//! - **Processing loop**: Per-stream thread moving buffers between the
//!   device and the exchange buffer
//! - **Caller thread**: `read`/`write` block on the exchange buffer's
//!   condition variables, never on the server
//!
//! Registry state and the exchange buffer are guarded by separate locks;
//! neither is held while user callbacks run, so handlers may query the
//! bridge freely.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
#![allow(clippy::unwrap_used)]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod bridge;
mod caps;
mod config;
mod error;
mod event;
pub mod format;
pub mod registry;
pub mod stream;

pub use bridge::AudioBridge;
pub use caps::{AudioCaps, AudioPacket, ChannelLayout, SampleFormat};
pub use config::{BridgeConfig, COMMON_SAMPLE_RATES};
pub use error::BridgeError;
pub use event::{device_event_callback, DeviceEvent, DeviceEventCallback};
pub use registry::{DeviceRegistry, EndpointFormat};
pub use stream::{Direction, StreamBackend, StreamBackendFactory, StreamSession, WAIT_TIMEOUT};
