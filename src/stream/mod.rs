//! Stream sessions and the PCM exchange path.
//!
//! A session pairs a backend stream (the device side, running its own
//! processing loop) with the exchange buffer the caller reads and writes.
//! Backends are pluggable behind [`StreamBackend`]; the mock backend in
//! [`mock`] drives the same shared state without a media server.

mod buffer;
pub mod mock;
#[cfg(feature = "pipewire")]
pub mod pipewire;
mod session;

pub use buffer::{ExchangeBuffer, WAIT_TIMEOUT};
pub use session::{
    Direction, PlaybackFill, StreamBackend, StreamBackendFactory, StreamIntent, StreamSession,
    StreamShared,
};
