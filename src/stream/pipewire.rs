//! Live stream backend.
//!
//! Each connected stream runs a dedicated thread with its own main loop.
//! The connect call blocks until the loop thread reports whether setup
//! succeeded, then the loop runs free: format negotiation and buffer
//! cycles land in the session's [`StreamShared`] from the loop thread.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use pipewire as pw;
use pw::properties::properties;
use pw::spa::param::audio::{AudioFormat, AudioInfoRaw};
use pw::spa::param::format::FormatProperties;
use pw::spa::param::ParamType;
use pw::spa::pod::{ChoiceValue, Object, Pod, Property, PropertyFlags, Value};
use pw::spa::utils::{Choice, ChoiceEnum, ChoiceFlags, Id, SpaTypes};
use pw::stream::StreamFlags;

use crate::config::COMMON_SAMPLE_RATES;
use crate::error::BridgeError;
use crate::format::{DeviceFormat, FORMAT_TABLE};

use super::session::{Direction, StreamBackend, StreamBackendFactory, StreamIntent, StreamShared};

/// Factory producing live device streams.
#[derive(Default)]
pub struct PipewireStreamFactory;

impl PipewireStreamFactory {
    /// Creates the factory.
    pub fn new() -> Self {
        Self
    }
}

impl StreamBackendFactory for PipewireStreamFactory {
    fn create(&self) -> Box<dyn StreamBackend> {
        Box::new(PipewireStream { worker: None })
    }
}

struct Worker {
    quit: pw::channel::Sender<()>,
    handle: thread::JoinHandle<()>,
}

struct PipewireStream {
    worker: Option<Worker>,
}

impl StreamBackend for PipewireStream {
    fn connect(
        &mut self,
        intent: &StreamIntent,
        shared: Arc<StreamShared>,
    ) -> Result<(), BridgeError> {
        self.disconnect();

        let (quit_tx, quit_rx) = pw::channel::channel();
        let (setup_tx, setup_rx) = mpsc::channel();
        let intent = intent.clone();

        let handle = thread::Builder::new()
            .name("audio-stream".to_string())
            .spawn(move || run(intent, shared, quit_rx, setup_tx))
            .map_err(|err| BridgeError::LoopStartFailed {
                reason: err.to_string(),
            })?;

        match setup_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(Worker {
                    quit: quit_tx,
                    handle,
                });
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(BridgeError::LoopStartFailed {
                    reason: "stream loop exited during setup".to_string(),
                })
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.quit.send(());
            let _ = worker.handle.join();
        }
    }
}

impl Drop for PipewireStream {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn run(
    intent: StreamIntent,
    shared: Arc<StreamShared>,
    quit_rx: pw::channel::Receiver<()>,
    setup_tx: mpsc::Sender<Result<(), BridgeError>>,
) {
    match setup(&intent, shared, quit_rx) {
        Ok((mainloop, _guards)) => {
            let _ = setup_tx.send(Ok(()));
            tracing::debug!(stream = %intent.stream_name, "stream loop running");
            mainloop.run();
            tracing::debug!(stream = %intent.stream_name, "stream loop stopped");
        }
        Err(err) => {
            let _ = setup_tx.send(Err(err));
        }
    }
}

// Loop-local objects that must stay alive for the stream's lifetime.
struct LoopGuards {
    _context: pw::context::Context,
    _core: pw::core::Core,
    _stream: pw::stream::Stream,
    _listener: pw::stream::StreamListener<()>,
    _quit_receiver: pw::channel::AttachedReceiver<()>,
}

#[allow(clippy::type_complexity)]
fn setup(
    intent: &StreamIntent,
    shared: Arc<StreamShared>,
    quit_rx: pw::channel::Receiver<()>,
) -> Result<(pw::main_loop::MainLoop, LoopGuards), BridgeError> {
    pw::init();

    let mainloop =
        pw::main_loop::MainLoop::new(None).map_err(|err| BridgeError::LoopStartFailed {
            reason: err.to_string(),
        })?;

    let context =
        pw::context::Context::new(&mainloop).map_err(|err| BridgeError::ContextCreateFailed {
            reason: err.to_string(),
        })?;

    let core = context
        .connect(None)
        .map_err(|err| BridgeError::CoreConnectFailed {
            reason: err.to_string(),
        })?;

    let category = match intent.direction {
        Direction::Capture => "Capture",
        Direction::Playback => "Playback",
    };

    let mut props = properties! {
        "media.type" => "Audio",
        "media.role" => "Music",
    };
    props.insert("media.category", category);
    props.insert("target.object", intent.target_device.as_str());

    let stream = pw::stream::Stream::new(&core, &intent.stream_name, props).map_err(|err| {
        BridgeError::StreamCreateFailed {
            reason: err.to_string(),
        }
    })?;

    let shared_for_param = shared.clone();
    let shared_for_process = shared;
    let direction = intent.direction;

    let listener = stream
        .add_local_listener::<()>()
        .param_changed(move |_stream, _data, id, param| {
            if id != ParamType::Format.as_raw() {
                return;
            }
            let Some(param) = param else {
                return;
            };

            let mut info = AudioInfoRaw::new();
            if info.parse(param).is_err() {
                return;
            }

            if let Some(device_format) = device_format_from_spa(info.format()) {
                shared_for_param.format_changed(device_format, info.channels(), info.rate());
            }
        })
        .process(move |stream, _data| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                return;
            };
            let datas = buffer.datas_mut();
            if datas.is_empty() {
                return;
            }

            match direction {
                Direction::Capture => {
                    let chunk = datas[0].chunk();
                    let offset = chunk.offset() as usize;
                    let size = chunk.size() as usize;
                    if size == 0 {
                        return;
                    }
                    let Some(raw) = datas[0].data() else {
                        return;
                    };
                    let end = offset.saturating_add(size).min(raw.len());
                    if offset >= end {
                        return;
                    }
                    shared_for_process.capture_cycle(&raw[offset..end]);
                }
                Direction::Playback => {
                    let fill = {
                        let Some(raw) = datas[0].data() else {
                            return;
                        };
                        if raw.is_empty() {
                            return;
                        }
                        raw.fill(0);
                        shared_for_process.playback_cycle(raw)
                    };

                    let chunk = datas[0].chunk_mut();
                    *chunk.offset_mut() = 0;
                    *chunk.stride_mut() = fill.stride as i32;
                    *chunk.size_mut() = fill.copied as u32;
                }
            }
        })
        .register()
        .map_err(|err| BridgeError::StreamCreateFailed {
            reason: err.to_string(),
        })?;

    let format_bytes = build_format_param(intent)?;
    let format_pod =
        Pod::from_bytes(&format_bytes).ok_or_else(|| BridgeError::StreamCreateFailed {
            reason: "invalid format pod".to_string(),
        })?;
    let mut params = [format_pod];

    let pw_direction = match intent.direction {
        Direction::Capture => pw::spa::utils::Direction::Input,
        Direction::Playback => pw::spa::utils::Direction::Output,
    };

    stream
        .connect(
            pw_direction,
            None,
            StreamFlags::AUTOCONNECT | StreamFlags::MAP_BUFFERS | StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|err| BridgeError::StreamCreateFailed {
            reason: err.to_string(),
        })?;

    let mainloop_quit = mainloop.clone();
    let quit_receiver = quit_rx.attach(mainloop.loop_(), move |()| mainloop_quit.quit());

    Ok((
        mainloop,
        LoopGuards {
            _context: context,
            _core: core,
            _stream: stream,
            _listener: listener,
            _quit_receiver: quit_receiver,
        },
    ))
}

/// Serializes the negotiation offer: the requested format first with every
/// table format as an alternative, channel and rate as clamped ranges.
fn build_format_param(intent: &StreamIntent) -> Result<Vec<u8>, BridgeError> {
    let requested = spa_format_from_device(intent.requested_device_format);

    let mut alternatives: Vec<Id> = vec![Id(requested.as_raw())];
    for entry in FORMAT_TABLE {
        let spa_format = spa_format_from_device(entry.device_format);
        let id = Id(spa_format.as_raw());
        if !alternatives.contains(&id) {
            alternatives.push(id);
        }
    }

    let min_rate = *COMMON_SAMPLE_RATES.first().unwrap_or(&intent.requested_rate);
    let max_rate = *COMMON_SAMPLE_RATES.last().unwrap_or(&intent.requested_rate);

    let object = Object {
        type_: SpaTypes::ObjectParamFormat.as_raw(),
        id: ParamType::EnumFormat.as_raw(),
        properties: vec![
            Property {
                key: FormatProperties::MediaType.as_raw(),
                flags: PropertyFlags::empty(),
                value: Value::Id(Id(pw::spa::param::format::MediaType::Audio.as_raw())),
            },
            Property {
                key: FormatProperties::MediaSubtype.as_raw(),
                flags: PropertyFlags::empty(),
                value: Value::Id(Id(pw::spa::param::format::MediaSubtype::Raw.as_raw())),
            },
            Property {
                key: FormatProperties::AudioFormat.as_raw(),
                flags: PropertyFlags::empty(),
                value: Value::Choice(ChoiceValue::Id(Choice(
                    ChoiceFlags::empty(),
                    ChoiceEnum::Enum {
                        default: Id(requested.as_raw()),
                        alternatives,
                    },
                ))),
            },
            Property {
                key: FormatProperties::AudioChannels.as_raw(),
                flags: PropertyFlags::empty(),
                value: Value::Choice(ChoiceValue::Int(Choice(
                    ChoiceFlags::empty(),
                    ChoiceEnum::Range {
                        default: intent.requested_channels as i32,
                        min: 1,
                        max: 2,
                    },
                ))),
            },
            Property {
                key: FormatProperties::AudioRate.as_raw(),
                flags: PropertyFlags::empty(),
                value: Value::Choice(ChoiceValue::Int(Choice(
                    ChoiceFlags::empty(),
                    ChoiceEnum::Range {
                        default: intent.requested_rate as i32,
                        min: min_rate as i32,
                        max: max_rate as i32,
                    },
                ))),
            },
        ],
    };

    let serialized = pw::spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &Value::Object(object),
    )
    .map_err(|err| BridgeError::StreamCreateFailed {
        reason: format!("format pod serialization failed: {err:?}"),
    })?;

    Ok(serialized.0.into_inner())
}

fn spa_format_from_device(device_format: DeviceFormat) -> AudioFormat {
    match device_format {
        DeviceFormat::S8 => AudioFormat::S8,
        DeviceFormat::U8 => AudioFormat::U8,
        DeviceFormat::S16Le => AudioFormat::S16LE,
        DeviceFormat::S16Be => AudioFormat::S16BE,
        DeviceFormat::U16Le => AudioFormat::U16LE,
        DeviceFormat::U16Be => AudioFormat::U16BE,
        DeviceFormat::S32Le => AudioFormat::S32LE,
        DeviceFormat::S32Be => AudioFormat::S32BE,
        DeviceFormat::U32Le => AudioFormat::U32LE,
        DeviceFormat::U32Be => AudioFormat::U32BE,
        DeviceFormat::F32Le => AudioFormat::F32LE,
        DeviceFormat::F32Be => AudioFormat::F32BE,
        DeviceFormat::F64Le => AudioFormat::F64LE,
        DeviceFormat::F64Be => AudioFormat::F64BE,
        DeviceFormat::S16P => AudioFormat::S16P,
        DeviceFormat::S32P => AudioFormat::S32P,
        DeviceFormat::F32P => AudioFormat::F32P,
        DeviceFormat::F64P => AudioFormat::F64P,
    }
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
