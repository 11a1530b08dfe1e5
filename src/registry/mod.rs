//! Live view of the media server's audio endpoints.
//!
//! The registry client runs for the whole lifetime of the bridge,
//! independent of any open stream. It consumes global add/remove events,
//! filters them down to audio-capable nodes, tracks each endpoint's
//! advertised formats through asynchronous parameter enumeration, and
//! fires [`DeviceEvent`] notifications on every change.

mod events;
pub mod mock;
#[cfg(feature = "pipewire")]
pub mod pipewire;

pub use events::{
    FormatParam, GlobalInfo, InterfaceKind, MediaSubtype, ParamInfo, ParamKind, RegistryEvents,
    RegistryOps,
};

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use crate::caps::{ChannelLayout, SampleFormat};
use crate::event::{DeviceEvent, DeviceEventCallback};
use crate::format;

/// Media classes accepted as audio endpoints. Everything else announced by
/// the registry is ignored.
const SUPPORTED_MEDIA_CLASSES: &[&str] = &[
    "Stream/Output/Audio",
    "Stream/Input/Audio/Internal",
    "Audio/Source",
    "Audio/Sink",
];

/// One (format, layout, planar) triple an endpoint advertised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointFormat {
    /// Abstract sample format.
    pub format: SampleFormat,
    /// Channel layout derived from the advertised channel count.
    pub layout: ChannelLayout,
    /// Whether the encoding is planar.
    pub planar: bool,
}

#[derive(Debug, Clone, Copy)]
struct PendingQuery {
    node_id: u32,
    kind: ParamKind,
}

#[derive(Default)]
struct RegistryState {
    // Keyed by registry id so enumeration order follows id order.
    sinks: BTreeMap<u32, String>,
    sources: BTreeMap<u32, String>,
    descriptions: HashMap<String, String>,
    formats: HashMap<String, Vec<EndpointFormat>>,
    names: HashMap<u32, String>,
    default_sink: Option<String>,
    default_source: Option<String>,
    pending: HashMap<i32, PendingQuery>,
}

struct RegistryInner {
    state: Mutex<RegistryState>,
    callbacks: Mutex<Vec<DeviceEventCallback>>,
}

/// Thread-safe registry client state.
///
/// Cheap to clone; all clones share the same underlying view. Backends
/// feed events in through the [`RegistryEvents`] impl, callers read
/// snapshots out through the accessor methods. The internal lock is never
/// held while a change callback runs.
#[derive(Clone)]
pub struct DeviceRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    /// Creates an empty registry view.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: Mutex::new(RegistryState::default()),
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Registers a callback for device change notifications.
    pub fn on_event(&self, callback: DeviceEventCallback) {
        self.inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }

    /// Returns the capture device names, ordered by registry id.
    pub fn inputs(&self) -> Vec<String> {
        self.lock_state().sources.values().cloned().collect()
    }

    /// Returns the playback device names, ordered by registry id.
    pub fn outputs(&self) -> Vec<String> {
        self.lock_state().sinks.values().cloned().collect()
    }

    /// Returns the default capture device.
    ///
    /// Falls back to the first known source when no default was recorded.
    pub fn default_input(&self) -> Option<String> {
        let state = self.lock_state();
        state
            .default_source
            .clone()
            .or_else(|| state.sources.values().next().cloned())
    }

    /// Returns the default playback device.
    ///
    /// Falls back to the first known sink when no default was recorded.
    pub fn default_output(&self) -> Option<String> {
        let state = self.lock_state();
        state
            .default_sink
            .clone()
            .or_else(|| state.sinks.values().next().cloned())
    }

    /// Returns the human-readable description of a device.
    pub fn description(&self, device: &str) -> Option<String> {
        self.lock_state().descriptions.get(device).cloned()
    }

    /// Returns the formats an endpoint has advertised so far, in arrival
    /// order.
    pub fn endpoint_formats(&self, device: &str) -> Vec<EndpointFormat> {
        self.lock_state()
            .formats
            .get(device)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns `true` if the device is a known capture endpoint.
    pub fn is_source(&self, device: &str) -> bool {
        self.lock_state().sources.values().any(|name| name == device)
    }

    /// Returns `true` if the device is a known playback endpoint.
    pub fn is_sink(&self, device: &str) -> bool {
        self.lock_state().sinks.values().any(|name| name == device)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, events: Vec<DeviceEvent>) {
        if events.is_empty() {
            return;
        }

        let callbacks = self
            .inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for event in events {
            for callback in &callbacks {
                callback(event.clone());
            }
        }
    }
}

impl RegistryEvents for DeviceRegistry {
    fn global_added(&self, global: &GlobalInfo) -> bool {
        if global.interface != InterfaceKind::Node {
            return false;
        }

        let Some(media_class) = global.media_class.as_deref() else {
            return false;
        };

        if !SUPPORTED_MEDIA_CLASSES.contains(&media_class) {
            return false;
        }

        let Some(name) = global.name.clone() else {
            return false;
        };

        let is_sink = media_class == "Audio/Sink";
        let mut events = Vec::new();

        {
            let mut state = self.lock_state();

            if is_sink {
                state.sinks.insert(global.id, name.clone());
            } else {
                state.sources.insert(global.id, name.clone());
            }

            state.descriptions.insert(
                name.clone(),
                global.description.clone().unwrap_or_default(),
            );
            state.formats.insert(name.clone(), Vec::new());
            state.names.insert(global.id, name.clone());

            if is_sink {
                events.push(DeviceEvent::OutputsChanged {
                    outputs: state.sinks.values().cloned().collect(),
                });
            } else {
                events.push(DeviceEvent::InputsChanged {
                    inputs: state.sources.values().cloned().collect(),
                });
            }

            // Only the plain hardware classes seed the default pointers;
            // application streams never become defaults.
            if media_class == "Audio/Source" && state.default_source.is_none() {
                state.default_source = Some(name.clone());
                events.push(DeviceEvent::DefaultInputChanged {
                    device: Some(name.clone()),
                });
            }

            if media_class == "Audio/Sink" && state.default_sink.is_none() {
                state.default_sink = Some(name.clone());
                events.push(DeviceEvent::DefaultOutputChanged {
                    device: Some(name.clone()),
                });
            }
        }

        tracing::debug!(id = global.id, name = %name, media_class, "audio endpoint added");
        self.emit(events);

        true
    }

    fn global_removed(&self, id: u32) {
        let mut events = Vec::new();

        {
            let mut state = self.lock_state();

            let Some(name) = state.names.remove(&id) else {
                return;
            };

            let is_sink = state.sinks.contains_key(&id);

            if is_sink {
                state.sinks.remove(&id);
            } else {
                state.sources.remove(&id);
            }

            state.descriptions.remove(&name);
            state.formats.remove(&name);

            if is_sink {
                events.push(DeviceEvent::OutputsChanged {
                    outputs: state.sinks.values().cloned().collect(),
                });
            } else {
                events.push(DeviceEvent::InputsChanged {
                    inputs: state.sources.values().cloned().collect(),
                });
            }

            if state.default_source.as_deref() == Some(name.as_str()) {
                state.default_source = state.sources.values().next().cloned();
                events.push(DeviceEvent::DefaultInputChanged {
                    device: state.default_source.clone(),
                });
            }

            if state.default_sink.as_deref() == Some(name.as_str()) {
                state.default_sink = state.sinks.values().next().cloned();
                events.push(DeviceEvent::DefaultOutputChanged {
                    device: state.default_sink.clone(),
                });
            }

            tracing::debug!(id, name = %name, "audio endpoint removed");
        }

        self.emit(events);
    }

    fn node_info(&self, node_id: u32, params: &[ParamInfo], ops: &dyn RegistryOps) {
        for param in params {
            if !param.readable || param.kind != ParamKind::EnumFormat {
                continue;
            }

            {
                let mut state = self.lock_state();

                let Some(name) = state.names.get(&node_id).cloned() else {
                    return;
                };

                state.formats.entry(name).or_default();
            }

            // The request may block on the server; issue it without the
            // state lock, then record the pending query before the
            // barrier so the completion always finds it.
            if let Some(seq) = ops.enum_node_params(node_id, ParamKind::EnumFormat) {
                self.lock_state().pending.insert(
                    seq,
                    PendingQuery {
                        node_id,
                        kind: ParamKind::EnumFormat,
                    },
                );
                ops.sync(seq);
            }
        }
    }

    fn node_param(&self, seq: i32, param: &FormatParam) {
        let mut state = self.lock_state();

        let Some(query) = state.pending.get(&seq).copied() else {
            return;
        };

        if query.kind != ParamKind::EnumFormat {
            return;
        }

        if param.media_subtype != MediaSubtype::Raw {
            return;
        }

        let Some(entry) = format::by_device_format(param.device_format) else {
            return;
        };

        let Some(layout) = ChannelLayout::from_channels(param.channels) else {
            return;
        };

        let Some(name) = state.names.get(&query.node_id).cloned() else {
            return;
        };

        let endpoint_format = EndpointFormat {
            format: entry.format,
            layout,
            planar: entry.planar,
        };

        let formats = state.formats.entry(name).or_default();

        if !formats.contains(&endpoint_format) {
            formats.push(endpoint_format);
        }
    }

    fn done(&self, _id: u32, seq: i32) {
        // The server reports completion with a sequence one past the
        // enum-params request it answers. This is wire behavior of the
        // collaborator, not ours to fix; it is compensated only here.
        self.lock_state().pending.remove(&(seq - 1));
    }
}
