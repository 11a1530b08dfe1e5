//! Mock stream backend for tests.
//!
//! The factory records every connection and exposes the shared state it
//! was handed, so tests can stand in for the device loop: negotiate a
//! format, deliver capture chunks and drain playback data without a media
//! server.

use std::sync::{Arc, Mutex, PoisonError};

use crate::error::BridgeError;
use crate::format::DeviceFormat;

use super::session::{PlaybackFill, StreamBackend, StreamBackendFactory, StreamIntent, StreamShared};

#[derive(Default)]
struct MockState {
    intent: Option<StreamIntent>,
    shared: Option<Arc<StreamShared>>,
    connect_count: usize,
    disconnect_count: usize,
    fail_next: Option<String>,
}

/// Recording [`StreamBackendFactory`] whose streams never touch a server.
#[derive(Clone, Default)]
pub struct MockStreamFactory {
    state: Arc<Mutex<MockState>>,
}

impl MockStreamFactory {
    /// Creates a factory with no recorded connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `connect` fail with the given reason.
    pub fn fail_next_connect(&self, reason: &str) {
        self.lock().fail_next = Some(reason.to_string());
    }

    /// The intent of the most recent successful connection.
    pub fn connected_intent(&self) -> Option<StreamIntent> {
        self.lock().intent.clone()
    }

    /// Shared state handed to the most recent successful connection.
    pub fn shared(&self) -> Option<Arc<StreamShared>> {
        self.lock().shared.clone()
    }

    /// Number of successful connections so far.
    pub fn connect_count(&self) -> usize {
        self.lock().connect_count
    }

    /// Number of disconnections so far.
    pub fn disconnect_count(&self) -> usize {
        self.lock().disconnect_count
    }

    /// Plays the device's format-negotiation callback.
    pub fn negotiate(&self, device_format: DeviceFormat, channels: u32, rate: u32) -> bool {
        match self.shared() {
            Some(shared) => shared.format_changed(device_format, channels, rate),
            None => false,
        }
    }

    /// Plays one capture cycle delivering `chunk`.
    pub fn deliver_capture(&self, chunk: &[u8]) {
        if let Some(shared) = self.shared() {
            shared.capture_cycle(chunk);
        }
    }

    /// Plays one playback cycle into a buffer of `capacity` bytes.
    pub fn fill_playback(&self, capacity: usize) -> (Vec<u8>, PlaybackFill) {
        let mut out = vec![0u8; capacity];
        let fill = match self.shared() {
            Some(shared) => shared.playback_cycle(&mut out),
            None => PlaybackFill { copied: 0, stride: 0 },
        };
        out.truncate(fill.copied);
        (out, fill)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StreamBackendFactory for MockStreamFactory {
    fn create(&self) -> Box<dyn StreamBackend> {
        Box::new(MockStreamHandle {
            state: self.state.clone(),
        })
    }
}

struct MockStreamHandle {
    state: Arc<Mutex<MockState>>,
}

impl StreamBackend for MockStreamHandle {
    fn connect(
        &mut self,
        intent: &StreamIntent,
        shared: Arc<StreamShared>,
    ) -> Result<(), BridgeError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(reason) = state.fail_next.take() {
            return Err(BridgeError::StreamCreateFailed { reason });
        }

        state.intent = Some(intent.clone());
        state.shared = Some(shared);
        state.connect_count += 1;
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.shared.take().is_some() {
            state.disconnect_count += 1;
        }
        state.intent = None;
    }
}
