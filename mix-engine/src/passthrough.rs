//! Software stand-in for the hardware transcoder.
//!
//! Every unit read from any attached input channel is copied to every attached
//! output stream. No decoding, composition or encoding takes place.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use tokio_util::sync::CancellationToken;

use crate::{
    codec::BgColor,
    hw::{
        ComposeConfig, ComposeHandle, DecodeConfig, DecodeHandle, EncodeConfig, EncodeHandle,
        OpenedSession, PipelineBackend, PipelineSession,
    },
    input::InputChannel,
    output::OutputStream,
};

pub struct PassthroughBackend {
    handles: Arc<AtomicU64>,
    poll_interval: Duration,
}

impl PassthroughBackend {
    pub fn new() -> Self {
        Self::with_poll_interval(Duration::from_millis(1))
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            handles: Arc::new(AtomicU64::new(0)),
            poll_interval,
        }
    }
}

impl Default for PassthroughBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn next_handle(handles: &AtomicU64) -> u64 {
    handles.fetch_add(1, Ordering::Relaxed) + 1
}

impl PipelineBackend for PassthroughBackend {
    fn open(
        &mut self,
        decode: &DecodeConfig,
        compose: &ComposeConfig,
        encode: &EncodeConfig,
    ) -> anyhow::Result<OpenedSession> {
        let decode_handle = DecodeHandle(next_handle(&self.handles));
        let encode_handle = EncodeHandle(next_handle(&self.handles));
        let compose_handle = ComposeHandle(next_handle(&self.handles));

        let mut graph = Graph {
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            compose: *compose,
        };
        graph.inputs.insert(decode_handle, decode.channel.clone());
        graph.outputs.insert(encode_handle, encode.stream.clone());
        log::debug!(
            "passthrough session opened: {} -> {} @ {} kbps",
            decode.codec,
            encode.codec,
            encode.bitrate
        );

        Ok(OpenedSession {
            session: Box::new(PassthroughSession {
                graph: Arc::new(Mutex::new(graph)),
                handles: self.handles.clone(),
                cancel: CancellationToken::new(),
                worker: None,
                poll_interval: self.poll_interval,
            }),
            decode: decode_handle,
            encode: encode_handle,
            compose: compose_handle,
        })
    }
}

struct Graph {
    inputs: HashMap<DecodeHandle, Arc<InputChannel>>,
    outputs: HashMap<EncodeHandle, Arc<OutputStream>>,
    compose: ComposeConfig,
}

pub struct PassthroughSession {
    graph: Arc<Mutex<Graph>>,
    handles: Arc<AtomicU64>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
    poll_interval: Duration,
}

impl PassthroughSession {
    fn graph(&self) -> MutexGuard<'_, Graph> {
        self.graph.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn forward_loop(graph: Arc<Mutex<Graph>>, cancel: CancellationToken, poll_interval: Duration) {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let forwarded = {
                let graph = graph.lock().unwrap_or_else(PoisonError::into_inner);
                let mut forwarded = false;
                for channel in graph.inputs.values() {
                    while let Some(unit) = channel.read_unit() {
                        for stream in graph.outputs.values() {
                            stream.write(&unit);
                        }
                        forwarded = true;
                    }
                }
                forwarded
            };
            if !forwarded {
                std::thread::sleep(poll_interval);
            }
        }
    }
}

impl PipelineSession for PassthroughSession {
    fn start(&mut self) -> anyhow::Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let graph = self.graph.clone();
        let cancel = self.cancel.clone();
        let poll_interval = self.poll_interval;
        let worker = std::thread::Builder::new()
            .name("mix-passthrough".to_string())
            .spawn(move || Self::forward_loop(graph, cancel, poll_interval))?;
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("passthrough worker panicked");
            }
        }
        let mut graph = self.graph();
        graph.inputs.clear();
        graph.outputs.clear();
    }

    fn attach_input(
        &mut self,
        decode: &DecodeConfig,
        _compose: ComposeHandle,
    ) -> anyhow::Result<DecodeHandle> {
        let handle = DecodeHandle(next_handle(&self.handles));
        self.graph().inputs.insert(handle, decode.channel.clone());
        Ok(handle)
    }

    fn detach_input(&mut self, handle: DecodeHandle) {
        self.graph().inputs.remove(&handle);
    }

    fn attach_output(
        &mut self,
        encode: &EncodeConfig,
        _compose: ComposeHandle,
    ) -> anyhow::Result<EncodeHandle> {
        let handle = EncodeHandle(next_handle(&self.handles));
        self.graph().outputs.insert(handle, encode.stream.clone());
        Ok(handle)
    }

    fn detach_output(&mut self, handle: EncodeHandle) {
        self.graph().outputs.remove(&handle);
    }

    fn set_resolution(&mut self, _compose: ComposeHandle, width: u32, height: u32) {
        let mut graph = self.graph();
        graph.compose.width = width;
        graph.compose.height = height;
        log::debug!("passthrough resolution {}x{}", width, height);
    }

    fn set_background_color(&mut self, _compose: ComposeHandle, color: BgColor) {
        self.graph().compose.background = color;
    }

    fn force_keyframe(&mut self, encode: EncodeHandle) {
        log::debug!("passthrough keyframe request for {:?}", encode);
    }

    fn set_bitrate(&mut self, encode: EncodeHandle, bitrate: u32) {
        log::debug!("passthrough bitrate {} kbps for {:?}", bitrate, encode);
    }
}

impl Drop for PassthroughSession {
    fn drop(&mut self) {
        self.stop();
    }
}
