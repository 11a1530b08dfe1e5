//! Device change notifications.
//!
//! Events describe changes to the live device list maintained by the
//! registry client. They are fired synchronously from the registry worker
//! thread at the moment of the underlying state change; handlers must not
//! call back into the bridge's enumeration methods while blocking the
//! worker for long periods.

use std::sync::Arc;

/// Notifications about the live device list.
///
/// Emitted by the registry worker whenever an endpoint appears or
/// disappears, or the heuristic default endpoint moves. The registry lock
/// is never held while a callback runs, so handlers may safely query the
/// bridge.
///
/// # Example
///
/// ```
/// use audio_bridge::DeviceEvent;
///
/// fn handle_event(event: DeviceEvent) {
///     match event {
///         DeviceEvent::InputsChanged { inputs } => {
///             eprintln!("capture devices: {:?}", inputs);
///         }
///         DeviceEvent::OutputsChanged { outputs } => {
///             eprintln!("playback devices: {:?}", outputs);
///         }
///         DeviceEvent::DefaultInputChanged { device } => {
///             eprintln!("default input: {:?}", device);
///         }
///         DeviceEvent::DefaultOutputChanged { device } => {
///             eprintln!("default output: {:?}", device);
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// The set of capture endpoints changed.
    InputsChanged {
        /// Current capture device names, ordered by registry id.
        inputs: Vec<String>,
    },

    /// The set of playback endpoints changed.
    OutputsChanged {
        /// Current playback device names, ordered by registry id.
        outputs: Vec<String>,
    },

    /// The default capture endpoint changed.
    ///
    /// `None` means the last capture endpoint disappeared and no
    /// replacement exists.
    DefaultInputChanged {
        /// New default capture device name, if any.
        device: Option<String>,
    },

    /// The default playback endpoint changed.
    ///
    /// `None` means the last playback endpoint disappeared and no
    /// replacement exists.
    DefaultOutputChanged {
        /// New default playback device name, if any.
        device: Option<String>,
    },
}

/// Callback type for receiving device change notifications.
///
/// Register a callback via [`AudioBridge::on_event()`] to be notified of
/// device hot-plug and default changes.
///
/// [`AudioBridge::on_event()`]: crate::AudioBridge::on_event
pub type DeviceEventCallback = Arc<dyn Fn(DeviceEvent) + Send + Sync>;

/// Creates a [`DeviceEventCallback`] from a closure.
///
/// This is a convenience function for creating event callbacks without
/// manually wrapping in `Arc`.
///
/// # Example
///
/// ```
/// use audio_bridge::{device_event_callback, DeviceEvent};
///
/// let callback = device_event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn device_event_callback<F>(f: F) -> DeviceEventCallback
where
    F: Fn(DeviceEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}
