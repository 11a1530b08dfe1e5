//! Live registry backend.
//!
//! Runs a dedicated thread with its own main loop, binds every accepted
//! audio node, and forwards the server's callbacks into a
//! [`DeviceRegistry`] through the [`RegistryEvents`] trait. The driver is
//! fire-and-forget: if the connection cannot be established the failure is
//! logged and the thread exits, leaving the registry view empty.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::thread;

use pipewire as pw;
use pw::spa::param::audio::{AudioFormat, AudioInfoRaw};
use pw::spa::param::{format::MediaSubtype as SpaMediaSubtype, ParamInfoFlags, ParamType};

use super::{
    DeviceRegistry, FormatParam, GlobalInfo, InterfaceKind, MediaSubtype, ParamInfo, ParamKind,
    RegistryEvents, RegistryOps,
};
use crate::format::DeviceFormat;

/// Handle to the registry worker thread.
pub struct RegistryDriver {
    quit: pw::channel::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl RegistryDriver {
    /// Stops the worker loop and joins the thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.quit.send(());
            let _ = handle.join();
        }
    }
}

impl Drop for RegistryDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawns the registry worker thread feeding the given registry view.
pub fn spawn(registry: DeviceRegistry) -> RegistryDriver {
    let (quit_tx, quit_rx) = pw::channel::channel();

    let handle = thread::Builder::new()
        .name("audio-registry".to_string())
        .spawn(move || run(registry, quit_rx))
        .ok();

    RegistryDriver {
        quit: quit_tx,
        handle,
    }
}

struct BoundNode {
    proxy: pw::node::Node,
    _listener: pw::node::NodeListener,
}

struct LoopOps {
    core: Rc<pw::core::Core>,
    nodes: Rc<RefCell<HashMap<u32, BoundNode>>>,
    next_seq: Cell<i32>,
}

impl RegistryOps for LoopOps {
    fn enum_node_params(&self, node_id: u32, kind: ParamKind) -> Option<i32> {
        let nodes = self.nodes.borrow();
        let bound = nodes.get(&node_id)?;

        let seq = self.next_seq.get();
        self.next_seq.set(seq.wrapping_add(1));

        let param_type = match kind {
            ParamKind::EnumFormat => ParamType::EnumFormat,
            ParamKind::Other(raw) => ParamType::from_raw(raw),
        };
        bound.proxy.enum_params(seq, Some(param_type), 0, u32::MAX);

        Some(seq)
    }

    fn sync(&self, seq: i32) {
        if let Err(err) = self.core.sync(seq) {
            tracing::warn!(seq, %err, "core sync failed");
        }
    }
}

fn run(registry: DeviceRegistry, quit_rx: pw::channel::Receiver<()>) {
    pw::init();

    let mainloop = match pw::main_loop::MainLoop::new(None) {
        Ok(mainloop) => mainloop,
        Err(err) => {
            tracing::error!(%err, "failed to create registry main loop");
            return;
        }
    };

    let context = match pw::context::Context::new(&mainloop) {
        Ok(context) => context,
        Err(err) => {
            tracing::error!(%err, "failed to create registry context");
            return;
        }
    };

    let core = match context.connect(None) {
        Ok(core) => Rc::new(core),
        Err(err) => {
            tracing::error!(%err, "failed to connect to the media server");
            return;
        }
    };

    let server_registry = match core.get_registry() {
        Ok(server_registry) => Rc::new(server_registry),
        Err(err) => {
            tracing::error!(%err, "failed to obtain the server registry");
            return;
        }
    };

    let nodes = Rc::new(RefCell::new(HashMap::new()));
    let ops = Rc::new(LoopOps {
        core: core.clone(),
        nodes: nodes.clone(),
        next_seq: Cell::new(1),
    });

    let registry_weak = Rc::downgrade(&server_registry);
    let registry_for_add = registry.clone();
    let nodes_for_add = nodes.clone();
    let ops_for_add = ops.clone();

    let _registry_listener = server_registry
        .add_listener_local()
        .global(move |global| {
            let interface = if global.type_ == pw::types::ObjectType::Node {
                InterfaceKind::Node
            } else {
                InterfaceKind::Other
            };

            let props = global.props;
            let info = GlobalInfo {
                id: global.id,
                interface,
                media_class: props
                    .and_then(|p| p.get("media.class"))
                    .map(str::to_string),
                name: props.and_then(|p| p.get("node.name")).map(str::to_string),
                description: props
                    .and_then(|p| p.get("node.description"))
                    .map(str::to_string),
            };

            if !registry_for_add.global_added(&info) {
                return;
            }

            let Some(server_registry) = registry_weak.upgrade() else {
                return;
            };

            let proxy: pw::node::Node = match server_registry.bind(global) {
                Ok(proxy) => proxy,
                Err(err) => {
                    tracing::warn!(id = global.id, %err, "failed to bind audio node");
                    return;
                }
            };

            let node_id = global.id;
            let registry_for_info = registry_for_add.clone();
            let ops_for_info = ops_for_add.clone();
            let registry_for_param = registry_for_add.clone();

            let listener = proxy
                .add_listener_local()
                .info(move |info| {
                    let params: Vec<ParamInfo> = info
                        .params()
                        .iter()
                        .map(|param| ParamInfo {
                            kind: if param.id() == ParamType::EnumFormat {
                                ParamKind::EnumFormat
                            } else {
                                ParamKind::Other(param.id().as_raw())
                            },
                            readable: param.flags().contains(ParamInfoFlags::READ),
                        })
                        .collect();

                    registry_for_info.node_info(node_id, &params, ops_for_info.as_ref());
                })
                .param(move |seq, id, _index, _next, param| {
                    if id != ParamType::EnumFormat {
                        return;
                    }
                    let Some(param) = param else {
                        return;
                    };
                    let Some(format_param) = parse_format_param(param) else {
                        return;
                    };
                    registry_for_param.node_param(seq, &format_param);
                })
                .register();

            nodes_for_add.borrow_mut().insert(
                node_id,
                BoundNode {
                    proxy,
                    _listener: listener,
                },
            );
        })
        .global_remove({
            let registry = registry.clone();
            let nodes = nodes.clone();
            move |id| {
                nodes.borrow_mut().remove(&id);
                registry.global_removed(id);
            }
        })
        .register();

    let _core_listener = core
        .add_listener_local()
        .done({
            let registry = registry.clone();
            move |id, seq| registry.done(id, seq.seq())
        })
        .register();

    let mainloop_quit = mainloop.clone();
    let _quit_receiver = quit_rx.attach(mainloop.loop_(), move |()| mainloop_quit.quit());

    tracing::debug!("registry loop running");
    mainloop.run();
    tracing::debug!("registry loop stopped");
}

fn parse_format_param(param: &pw::spa::pod::Pod) -> Option<FormatParam> {
    let (_media_type, media_subtype) =
        pw::spa::param::format_utils::parse_format(param).ok()?;

    let media_subtype = if media_subtype == SpaMediaSubtype::Raw {
        MediaSubtype::Raw
    } else {
        MediaSubtype::Other
    };

    let mut info = AudioInfoRaw::new();
    info.parse(param).ok()?;

    Some(FormatParam {
        media_subtype,
        device_format: device_format_from_spa(info.format())?,
        channels: info.channels(),
    })
}

fn device_format_from_spa(format: AudioFormat) -> Option<DeviceFormat> {
    let mapped = match format {
        AudioFormat::S8 => DeviceFormat::S8,
        AudioFormat::U8 => DeviceFormat::U8,
        AudioFormat::S16LE => DeviceFormat::S16Le,
        AudioFormat::S16BE => DeviceFormat::S16Be,
        AudioFormat::U16LE => DeviceFormat::U16Le,
        AudioFormat::U16BE => DeviceFormat::U16Be,
        AudioFormat::S32LE => DeviceFormat::S32Le,
        AudioFormat::S32BE => DeviceFormat::S32Be,
        AudioFormat::U32LE => DeviceFormat::U32Le,
        AudioFormat::U32BE => DeviceFormat::U32Be,
        AudioFormat::F32LE => DeviceFormat::F32Le,
        AudioFormat::F32BE => DeviceFormat::F32Be,
        AudioFormat::F64LE => DeviceFormat::F64Le,
        AudioFormat::F64BE => DeviceFormat::F64Be,
        AudioFormat::S16P => DeviceFormat::S16P,
        AudioFormat::S32P => DeviceFormat::S32P,
        AudioFormat::F32P => DeviceFormat::F32P,
        AudioFormat::F64P => DeviceFormat::F64P,
        _ => return None,
    };
    Some(mapped)
}
