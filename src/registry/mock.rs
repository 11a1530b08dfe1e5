//! In-process registry backend for tests.
//!
//! [`MockRegistryOps`] answers server operations with locally assigned
//! sequence numbers and records every request, and [`MockServer`] drives a
//! [`DeviceRegistry`] through the same event sequence a live connection
//! would produce for an endpoint announcement.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{
    DeviceRegistry, FormatParam, GlobalInfo, InterfaceKind, MediaSubtype, ParamInfo, ParamKind,
    RegistryEvents, RegistryOps,
};
use crate::format::DeviceFormat;

/// Recording [`RegistryOps`] implementation with local sequence numbers.
pub struct MockRegistryOps {
    next_seq: AtomicI32,
    requests: Mutex<Vec<(u32, ParamKind, i32)>>,
    syncs: Mutex<Vec<i32>>,
}

impl Default for MockRegistryOps {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRegistryOps {
    /// Creates an ops recorder; sequence numbers start at 1.
    pub fn new() -> Self {
        Self {
            next_seq: AtomicI32::new(1),
            requests: Mutex::new(Vec::new()),
            syncs: Mutex::new(Vec::new()),
        }
    }

    /// Sequence number of the most recent enumerate-params request.
    pub fn last_seq(&self) -> Option<i32> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .map(|(_, _, seq)| *seq)
    }

    /// Every enumerate-params request issued so far.
    pub fn requests(&self) -> Vec<(u32, ParamKind, i32)> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sequence numbers passed to [`RegistryOps::sync`], in order.
    pub fn sync_calls(&self) -> Vec<i32> {
        self.syncs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RegistryOps for MockRegistryOps {
    fn enum_node_params(&self, node_id: u32, kind: ParamKind) -> Option<i32> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((node_id, kind, seq));
        Some(seq)
    }

    fn sync(&self, seq: i32) {
        self.syncs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(seq);
    }
}

/// Scripted server that feeds a registry the full announcement sequence
/// for an endpoint: global, node info, one param event per advertised
/// format, then the completion barrier.
pub struct MockServer {
    registry: DeviceRegistry,
    ops: MockRegistryOps,
}

impl MockServer {
    /// Wraps a registry for scripted event delivery.
    pub fn new(registry: DeviceRegistry) -> Self {
        Self {
            registry,
            ops: MockRegistryOps::new(),
        }
    }

    /// The wrapped registry.
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Announces an endpoint and plays out its format discovery.
    ///
    /// Each `(device_format, channels)` pair becomes one param event. The
    /// completion barrier arrives one sequence past the request, matching
    /// live server behavior.
    pub fn add_endpoint(
        &self,
        id: u32,
        name: &str,
        description: &str,
        media_class: &str,
        formats: &[(DeviceFormat, u32)],
    ) -> bool {
        let accepted = self.registry.global_added(&GlobalInfo {
            id,
            interface: InterfaceKind::Node,
            media_class: Some(media_class.to_string()),
            name: Some(name.to_string()),
            description: Some(description.to_string()),
        });

        if !accepted {
            return false;
        }

        self.registry.node_info(
            id,
            &[ParamInfo {
                kind: ParamKind::EnumFormat,
                readable: true,
            }],
            &self.ops,
        );

        if let Some(seq) = self.ops.last_seq() {
            for &(device_format, channels) in formats {
                self.registry.node_param(
                    seq,
                    &FormatParam {
                        media_subtype: MediaSubtype::Raw,
                        device_format,
                        channels,
                    },
                );
            }
            self.registry.done(id, seq + 1);
        }

        true
    }

    /// Withdraws an endpoint.
    pub fn remove_endpoint(&self, id: u32) {
        self.registry.global_removed(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::{ChannelLayout, SampleFormat};

    #[test]
    fn test_sequence_numbers_increase() {
        let ops = MockRegistryOps::new();
        let a = ops.enum_node_params(1, ParamKind::EnumFormat).unwrap();
        let b = ops.enum_node_params(2, ParamKind::EnumFormat).unwrap();
        assert!(b > a);
        assert_eq!(ops.requests().len(), 2);
    }

    #[test]
    fn test_server_plays_full_announcement() {
        let registry = DeviceRegistry::new();
        let server = MockServer::new(registry.clone());

        assert!(server.add_endpoint(
            1,
            "spk0",
            "Speakers",
            "Audio/Sink",
            &[(DeviceFormat::S16Le, 2), (DeviceFormat::F32Le, 2)],
        ));

        assert_eq!(registry.outputs(), vec!["spk0"]);
        assert_eq!(registry.description("spk0").as_deref(), Some("Speakers"));

        let formats = registry.endpoint_formats("spk0");
        assert_eq!(formats.len(), 2);
        assert_eq!(formats[0].format, SampleFormat::S16Le);
        assert_eq!(formats[0].layout, ChannelLayout::Stereo);
        assert_eq!(formats[1].format, SampleFormat::F32Le);
    }

    #[test]
    fn test_rejected_endpoint_skips_discovery() {
        let registry = DeviceRegistry::new();
        let server = MockServer::new(registry.clone());

        assert!(!server.add_endpoint(
            1,
            "cam0",
            "Camera",
            "Video/Source",
            &[(DeviceFormat::S16Le, 2)],
        ));
        assert!(server.ops.last_seq().is_none());
    }

    #[test]
    fn test_remove_endpoint() {
        let registry = DeviceRegistry::new();
        let server = MockServer::new(registry.clone());

        server.add_endpoint(1, "mic0", "Mic", "Audio/Source", &[(DeviceFormat::U8, 1)]);
        server.remove_endpoint(1);

        assert!(registry.inputs().is_empty());
        assert!(registry.endpoint_formats("mic0").is_empty());
    }
}
