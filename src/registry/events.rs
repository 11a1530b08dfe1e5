//! Registry event model.
//!
//! The media server delivers registry traffic as discrete events. Backends
//! translate their native callback tables into calls on [`RegistryEvents`],
//! one method per event, and receive server operations back through
//! [`RegistryOps`]. The core registry logic depends only on these traits,
//! so the same state machine runs against the live server and against the
//! in-process mock.

use crate::format::DeviceFormat;

/// Interface kind of a registry global object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKind {
    /// A processing node; the only kind the bridge inspects further.
    Node,
    /// Any other interface (device, port, link, ...).
    Other,
}

/// Description of a newly announced global object.
#[derive(Debug, Clone)]
pub struct GlobalInfo {
    /// Registry-assigned id, unique while the object is registered.
    pub id: u32,
    /// Interface kind.
    pub interface: InterfaceKind,
    /// The object's media class, when advertised.
    pub media_class: Option<String>,
    /// The node name, when advertised.
    pub name: Option<String>,
    /// Human-readable description, when advertised.
    pub description: Option<String>,
}

/// Parameter kinds a node can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// The enumerable-format parameter; triggers format discovery.
    EnumFormat,
    /// Any other parameter, carried by its raw id.
    Other(u32),
}

/// One parameter a node reports in its info event.
#[derive(Debug, Clone, Copy)]
pub struct ParamInfo {
    /// Which parameter.
    pub kind: ParamKind,
    /// Whether the parameter can be read (enumerated).
    pub readable: bool,
}

/// Media subtype of a format parameter payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSubtype {
    /// Raw PCM audio.
    Raw,
    /// Anything else; such payloads are discarded.
    Other,
}

/// A parsed format-enumeration payload.
#[derive(Debug, Clone, Copy)]
pub struct FormatParam {
    /// Media subtype of the advertised format.
    pub media_subtype: MediaSubtype,
    /// Device-layer encoding.
    pub device_format: DeviceFormat,
    /// Advertised channel count.
    pub channels: u32,
}

/// Server operations a registry event handler may issue.
///
/// Implemented by each backend for its own connection; the mock assigns
/// sequence numbers locally.
pub trait RegistryOps {
    /// Issues an asynchronous enumerate-params request against a node.
    ///
    /// Returns the request's sequence number, or `None` if the node is no
    /// longer reachable.
    fn enum_node_params(&self, node_id: u32, kind: ParamKind) -> Option<i32>;

    /// Requests a synchronization barrier for the given sequence.
    ///
    /// The server answers with a completion event once every reply up to
    /// the sequence has been delivered.
    fn sync(&self, seq: i32);
}

/// Registry event handler: one method per server event.
///
/// Backends resolve their opaque user-data into a typed object
/// implementing this trait and forward each callback. All methods may be
/// called from the backend's own worker thread.
pub trait RegistryEvents {
    /// A global object was announced.
    ///
    /// Returns `true` if the object was accepted as an audio endpoint; the
    /// backend then binds a node proxy and routes its info/param events
    /// here.
    fn global_added(&self, global: &GlobalInfo) -> bool;

    /// A global object disappeared.
    fn global_removed(&self, id: u32);

    /// A bound node reported its parameter list.
    fn node_info(&self, node_id: u32, params: &[ParamInfo], ops: &dyn RegistryOps);

    /// A bound node answered a parameter enumeration request.
    fn node_param(&self, seq: i32, param: &FormatParam);

    /// A synchronization barrier completed.
    fn done(&self, id: u32, seq: i32);
}
