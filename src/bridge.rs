//! Public device facade.
//!
//! [`AudioBridge`] ties the registry view and the stream session together
//! behind one object: enumeration and format queries answer from the
//! registry, `init` opens a session against the chosen device, and
//! `read`/`write` move PCM through the session's exchange buffer.

use std::sync::{Arc, Mutex, PoisonError};

use crate::caps::{AudioCaps, AudioPacket, ChannelLayout, SampleFormat};
use crate::config::{BridgeConfig, COMMON_SAMPLE_RATES};
use crate::error::BridgeError;
use crate::event::DeviceEventCallback;
use crate::format;
use crate::registry::DeviceRegistry;
use crate::stream::{Direction, StreamBackendFactory, StreamSession, StreamShared};

/// Bridge between an application and the system's audio devices.
///
/// One bridge drives at most one stream at a time; calling
/// [`init`](Self::init) again tears the previous session down first.
/// Enumeration works independently of any open session.
pub struct AudioBridge {
    registry: DeviceRegistry,
    stream_factory: Arc<dyn StreamBackendFactory>,
    session: Mutex<Option<StreamSession>>,
    last_error: Mutex<Option<String>>,
    config: BridgeConfig,
    #[cfg(feature = "pipewire")]
    _registry_driver: Option<crate::registry::pipewire::RegistryDriver>,
}

impl AudioBridge {
    /// Creates a bridge connected to the system media server.
    ///
    /// Spawns the registry worker immediately; device lists populate
    /// asynchronously as the server announces its globals.
    #[cfg(feature = "pipewire")]
    pub fn new(config: BridgeConfig) -> Self {
        let registry = DeviceRegistry::new();
        let driver = crate::registry::pipewire::spawn(registry.clone());

        Self {
            registry,
            stream_factory: Arc::new(crate::stream::pipewire::PipewireStreamFactory::new()),
            session: Mutex::new(None),
            last_error: Mutex::new(None),
            config,
            _registry_driver: Some(driver),
        }
    }

    /// Creates a bridge over explicit backends.
    ///
    /// The registry is used as-is; no worker is spawned. This is the
    /// entry point for tests and for embedders that drive the registry
    /// themselves.
    pub fn with_backends(
        registry: DeviceRegistry,
        stream_factory: Arc<dyn StreamBackendFactory>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            registry,
            stream_factory,
            session: Mutex::new(None),
            last_error: Mutex::new(None),
            config,
            #[cfg(feature = "pipewire")]
            _registry_driver: None,
        }
    }

    /// Message of the most recent session failure, if any.
    ///
    /// Cleared by the next successful [`init`](Self::init).
    pub fn error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The registry view backing this bridge.
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Registers a callback for device change notifications.
    pub fn on_event(&self, callback: DeviceEventCallback) {
        self.registry.on_event(callback);
    }

    /// Current capture device names.
    pub fn inputs(&self) -> Vec<String> {
        self.registry.inputs()
    }

    /// Current playback device names.
    pub fn outputs(&self) -> Vec<String> {
        self.registry.outputs()
    }

    /// The default capture device, if any exists.
    pub fn default_input(&self) -> Option<String> {
        self.registry.default_input()
    }

    /// The default playback device, if any exists.
    pub fn default_output(&self) -> Option<String> {
        self.registry.default_output()
    }

    /// Human-readable description of a device.
    pub fn description(&self, device: &str) -> Option<String> {
        self.registry.description(device)
    }

    /// The caps a caller should open `device` with.
    ///
    /// Prefers signed 16-bit little-endian when advertised, otherwise the
    /// first advertised format. Playback devices get stereo at 48000 Hz,
    /// capture devices mono at 8000 Hz, falling back to the first
    /// advertised layout when the preferred one is missing. Returns `None`
    /// for unknown devices and for devices with no advertised formats.
    pub fn preferred_format(&self, device: &str) -> Option<AudioCaps> {
        let formats = self.registry.endpoint_formats(device);
        if formats.is_empty() {
            return None;
        }

        let is_sink = self.registry.is_sink(device);
        if !is_sink && !self.registry.is_source(device) {
            return None;
        }

        let sample_format = formats
            .iter()
            .find(|f| f.format == SampleFormat::S16Le && !f.planar)
            .map(|f| f.format)
            .unwrap_or(formats[0].format);

        let preferred_layout = if is_sink {
            ChannelLayout::Stereo
        } else {
            ChannelLayout::Mono
        };
        let layout = if formats.iter().any(|f| f.layout == preferred_layout) {
            preferred_layout
        } else {
            formats[0].layout
        };

        let rate = if is_sink { 48000 } else { 8000 };

        Some(AudioCaps::new(sample_format, layout, rate))
    }

    /// Sample formats a device advertised, deduplicated in arrival order.
    pub fn supported_formats(&self, device: &str) -> Vec<SampleFormat> {
        let mut formats = Vec::new();
        for entry in self.registry.endpoint_formats(device) {
            if !formats.contains(&entry.format) {
                formats.push(entry.format);
            }
        }
        formats
    }

    /// Channel layouts a device advertised, deduplicated in arrival order.
    pub fn supported_channel_layouts(&self, device: &str) -> Vec<ChannelLayout> {
        let mut layouts = Vec::new();
        for entry in self.registry.endpoint_formats(device) {
            if !layouts.contains(&entry.layout) {
                layouts.push(entry.layout);
            }
        }
        layouts
    }

    /// Sample rates available for negotiation.
    ///
    /// Devices do not advertise rates; every device reports the common
    /// rate list.
    pub fn supported_sample_rates(&self, _device: &str) -> Vec<u32> {
        COMMON_SAMPLE_RATES.to_vec()
    }

    /// Opens a stream session against `device` with the requested caps.
    ///
    /// The caps are validated against the capability table before
    /// anything else happens; a rejected format leaves any running
    /// session untouched. Otherwise the previous session is torn down
    /// and a new one negotiated. Devices the registry knows as capture
    /// endpoints get a capture stream, everything else a playback
    /// stream.
    pub fn init(&self, device: &str, caps: &AudioCaps) -> Result<(), BridgeError> {
        if format::by_format(caps.format, caps.planar).is_none() {
            return Err(BridgeError::UnsupportedFormat {
                format: if caps.planar {
                    format!("{:?} (planar)", caps.format)
                } else {
                    format!("{:?}", caps.format)
                },
            });
        }

        self.uninit();

        let direction = if self.registry.is_source(device) {
            Direction::Capture
        } else {
            Direction::Playback
        };

        match StreamSession::start(
            self.stream_factory.as_ref(),
            direction,
            device,
            caps,
            &self.config,
        ) {
            Ok(session) => {
                *self
                    .session
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(session);
                *self
                    .last_error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = None;
                Ok(())
            }
            Err(err) => {
                tracing::error!(device, %err, "failed to open stream session");
                *self
                    .last_error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Takes all captured bytes, blocking briefly when none are queued.
    ///
    /// Returns an empty vector when no session is open or no data arrived
    /// within the wait window.
    pub fn read(&self) -> Vec<u8> {
        match self.shared() {
            Some(shared) => shared.read_all(),
            None => Vec::new(),
        }
    }

    /// Queues a packet for playback.
    ///
    /// Returns `false` when no session is open, the packet is empty, no
    /// format has been negotiated yet, or the exchange buffer stayed full
    /// for the whole wait window. A `false` return means the data was
    /// dropped; retrying is safe.
    pub fn write(&self, packet: &AudioPacket) -> bool {
        match self.shared() {
            Some(shared) => shared.write_packet(packet),
            None => false,
        }
    }

    /// Tears down the open session, if any. Idempotent.
    pub fn uninit(&self) {
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(session);
    }

    // Blocking calls must not hold the session lock, so the shared state
    // is cloned out first.
    fn shared(&self) -> Option<Arc<StreamShared>> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(StreamSession::shared)
    }
}

impl Drop for AudioBridge {
    fn drop(&mut self) {
        self.uninit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::DeviceFormat;
    use crate::registry::mock::MockServer;
    use crate::stream::mock::MockStreamFactory;

    fn bridge_with_mocks() -> (AudioBridge, MockServer, MockStreamFactory) {
        let registry = DeviceRegistry::new();
        let server = MockServer::new(registry.clone());
        let factory = MockStreamFactory::new();
        let bridge = AudioBridge::with_backends(
            registry,
            Arc::new(factory.clone()),
            BridgeConfig::default(),
        );
        (bridge, server, factory)
    }

    #[test]
    fn test_preferred_format_source() {
        let (bridge, server, _factory) = bridge_with_mocks();
        server.add_endpoint(
            1,
            "mic0",
            "Microphone",
            "Audio/Source",
            &[(DeviceFormat::F32Le, 2), (DeviceFormat::S16Le, 1)],
        );

        let caps = bridge.preferred_format("mic0").unwrap();
        assert_eq!(caps.format, SampleFormat::S16Le);
        assert_eq!(caps.layout, ChannelLayout::Mono);
        assert_eq!(caps.rate, 8000);
    }

    #[test]
    fn test_preferred_format_sink_fallbacks() {
        let (bridge, server, _factory) = bridge_with_mocks();
        // No s16le, no stereo advertised.
        server.add_endpoint(
            1,
            "spk0",
            "Speakers",
            "Audio/Sink",
            &[(DeviceFormat::F32Le, 1)],
        );

        let caps = bridge.preferred_format("spk0").unwrap();
        assert_eq!(caps.format, SampleFormat::F32Le);
        assert_eq!(caps.layout, ChannelLayout::Mono);
        assert_eq!(caps.rate, 48000);
    }

    #[test]
    fn test_preferred_format_unknown_device() {
        let (bridge, _server, _factory) = bridge_with_mocks();
        assert!(bridge.preferred_format("ghost").is_none());
    }

    #[test]
    fn test_supported_lists_deduplicate() {
        let (bridge, server, _factory) = bridge_with_mocks();
        server.add_endpoint(
            1,
            "spk0",
            "Speakers",
            "Audio/Sink",
            &[
                (DeviceFormat::S16Le, 1),
                (DeviceFormat::S16Le, 2),
                (DeviceFormat::F32Le, 2),
            ],
        );

        assert_eq!(
            bridge.supported_formats("spk0"),
            vec![SampleFormat::S16Le, SampleFormat::F32Le]
        );
        assert_eq!(
            bridge.supported_channel_layouts("spk0"),
            vec![ChannelLayout::Mono, ChannelLayout::Stereo]
        );
        assert_eq!(bridge.supported_sample_rates("spk0"), COMMON_SAMPLE_RATES);
    }

    #[test]
    fn test_init_classifies_direction() {
        let (bridge, server, factory) = bridge_with_mocks();
        server.add_endpoint(1, "mic0", "Mic", "Audio/Source", &[(DeviceFormat::S16Le, 1)]);

        let caps = AudioCaps::new(SampleFormat::S16Le, ChannelLayout::Mono, 8000);
        bridge.init("mic0", &caps).unwrap();
        assert_eq!(
            factory.connected_intent().unwrap().direction,
            Direction::Capture
        );

        // Unknown devices default to playback.
        bridge.init("spk-unknown", &caps).unwrap();
        assert_eq!(
            factory.connected_intent().unwrap().direction,
            Direction::Playback
        );
    }

    #[test]
    fn test_init_rejects_unsupported_format_early() {
        let (bridge, _server, factory) = bridge_with_mocks();
        let mut caps = AudioCaps::new(SampleFormat::S16Le, ChannelLayout::Stereo, 48000);
        caps.planar = true;

        let err = bridge.init("spk0", &caps).unwrap_err();
        assert!(matches!(err, BridgeError::UnsupportedFormat { .. }));
        assert_eq!(factory.connect_count(), 0);
        // Early rejection is not a session failure.
        assert!(bridge.error().is_none());
    }

    #[test]
    fn test_init_failure_sets_error() {
        let (bridge, _server, factory) = bridge_with_mocks();
        factory.fail_next_connect("no server");

        let caps = AudioCaps::new(SampleFormat::S16Le, ChannelLayout::Stereo, 48000);
        assert!(bridge.init("spk0", &caps).is_err());
        assert!(bridge.error().unwrap().contains("no server"));

        // A later success clears it.
        bridge.init("spk0", &caps).unwrap();
        assert!(bridge.error().is_none());
    }

    #[test]
    fn test_reinit_replaces_session() {
        let (bridge, _server, factory) = bridge_with_mocks();
        let caps = AudioCaps::new(SampleFormat::S16Le, ChannelLayout::Stereo, 48000);

        bridge.init("spk0", &caps).unwrap();
        bridge.init("spk0", &caps).unwrap();

        assert_eq!(factory.connect_count(), 2);
        assert_eq!(factory.disconnect_count(), 1);
    }

    #[test]
    fn test_uninit_idempotent() {
        let (bridge, _server, factory) = bridge_with_mocks();
        let caps = AudioCaps::new(SampleFormat::S16Le, ChannelLayout::Stereo, 48000);
        bridge.init("spk0", &caps).unwrap();

        bridge.uninit();
        bridge.uninit();
        assert_eq!(factory.disconnect_count(), 1);
    }

    #[test]
    fn test_read_write_without_session() {
        let (bridge, _server, _factory) = bridge_with_mocks();
        assert!(bridge.read().is_empty());

        let packet = AudioPacket::new(
            AudioCaps::new(SampleFormat::S16Le, ChannelLayout::Mono, 8000),
            vec![0u8; 4],
        );
        assert!(!bridge.write(&packet));
    }

    #[test]
    fn test_write_read_through_session() {
        let (bridge, server, factory) = bridge_with_mocks();
        server.add_endpoint(1, "mic0", "Mic", "Audio/Source", &[(DeviceFormat::S16Le, 1)]);

        let caps = bridge.preferred_format("mic0").unwrap();
        bridge.init("mic0", &caps).unwrap();
        factory.negotiate(DeviceFormat::S16Le, 1, 8000);

        factory.deliver_capture(&[9, 8, 7, 6]);
        assert_eq!(bridge.read(), vec![9, 8, 7, 6]);
    }
}
