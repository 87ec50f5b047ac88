//! Recording fakes of the hardware contract and of producers/consumers.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    codec::{BgColor, CodecType},
    hw::{
        AvcParams, ComposeConfig, ComposeHandle, DecodeConfig, DecodeHandle, EncodeConfig,
        EncodeHandle, OpenedSession, PipelineBackend, PipelineSession,
    },
    registry::{InputIndex, InputProducer, OutputConsumer, OutputIndex},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwEvent {
    Open {
        input: CodecType,
        output: CodecType,
        bitrate: u32,
        compose: ComposeConfig,
        avc: Option<AvcParams>,
    },
    Start,
    Stop,
    AttachInput(CodecType, DecodeHandle),
    DetachInput(DecodeHandle),
    AttachOutput(CodecType, u32, Option<AvcParams>, EncodeHandle),
    DetachOutput(EncodeHandle),
    SetResolution(u32, u32),
    SetBackground(BgColor),
    ForceKeyframe(EncodeHandle),
    SetBitrate(EncodeHandle, u32),
}

#[derive(Default)]
struct Failures {
    open: bool,
    start: bool,
    next_attach_input: bool,
    next_attach_output: bool,
}

#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<HwEvent>>>,
    failures: Arc<Mutex<Failures>>,
    next_handle: Arc<AtomicU64>,
}

impl Recorder {
    pub fn backend(&self) -> RecordingBackend {
        RecordingBackend(self.clone())
    }

    pub fn events(&self) -> Vec<HwEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    /// Decoders and encoders brought up, the pair opened with the session included.
    pub fn attach_count(&self) -> usize {
        self.events()
            .iter()
            .map(|e| match e {
                HwEvent::Open { .. } => 2,
                HwEvent::AttachInput(..) | HwEvent::AttachOutput(..) => 1,
                _ => 0,
            })
            .sum()
    }

    pub fn count(&self, pred: impl Fn(&HwEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }

    pub fn fail_open(&self) {
        self.failures.lock().unwrap().open = true;
    }

    pub fn fail_start(&self) {
        self.failures.lock().unwrap().start = true;
    }

    pub fn fail_next_attach_input(&self) {
        self.failures.lock().unwrap().next_attach_input = true;
    }

    pub fn fail_next_attach_output(&self) {
        self.failures.lock().unwrap().next_attach_output = true;
    }

    fn record(&self, event: HwEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed) + 1
    }
}

pub struct RecordingBackend(Recorder);

impl PipelineBackend for RecordingBackend {
    fn open(
        &mut self,
        decode: &DecodeConfig,
        compose: &ComposeConfig,
        encode: &EncodeConfig,
    ) -> anyhow::Result<OpenedSession> {
        if std::mem::take(&mut self.0.failures.lock().unwrap().open) {
            anyhow::bail!("open refused");
        }
        self.0.record(HwEvent::Open {
            input: decode.codec,
            output: encode.codec,
            bitrate: encode.bitrate,
            compose: *compose,
            avc: encode.avc,
        });
        Ok(OpenedSession {
            session: Box::new(RecordingSession(self.0.clone())),
            decode: DecodeHandle(self.0.handle()),
            encode: EncodeHandle(self.0.handle()),
            compose: ComposeHandle(self.0.handle()),
        })
    }
}

pub struct RecordingSession(Recorder);

impl PipelineSession for RecordingSession {
    fn start(&mut self) -> anyhow::Result<()> {
        if std::mem::take(&mut self.0.failures.lock().unwrap().start) {
            anyhow::bail!("start refused");
        }
        self.0.record(HwEvent::Start);
        Ok(())
    }

    fn stop(&mut self) {
        self.0.record(HwEvent::Stop);
    }

    fn attach_input(
        &mut self,
        decode: &DecodeConfig,
        _compose: ComposeHandle,
    ) -> anyhow::Result<DecodeHandle> {
        if std::mem::take(&mut self.0.failures.lock().unwrap().next_attach_input) {
            anyhow::bail!("decoder attach refused");
        }
        let handle = DecodeHandle(self.0.handle());
        self.0.record(HwEvent::AttachInput(decode.codec, handle));
        Ok(handle)
    }

    fn detach_input(&mut self, handle: DecodeHandle) {
        self.0.record(HwEvent::DetachInput(handle));
    }

    fn attach_output(
        &mut self,
        encode: &EncodeConfig,
        _compose: ComposeHandle,
    ) -> anyhow::Result<EncodeHandle> {
        if std::mem::take(&mut self.0.failures.lock().unwrap().next_attach_output) {
            anyhow::bail!("encoder attach refused");
        }
        let handle = EncodeHandle(self.0.handle());
        self.0.record(HwEvent::AttachOutput(
            encode.codec,
            encode.bitrate,
            encode.avc,
            handle,
        ));
        Ok(handle)
    }

    fn detach_output(&mut self, handle: EncodeHandle) {
        self.0.record(HwEvent::DetachOutput(handle));
    }

    fn set_resolution(&mut self, _compose: ComposeHandle, width: u32, height: u32) {
        self.0.record(HwEvent::SetResolution(width, height));
    }

    fn set_background_color(&mut self, _compose: ComposeHandle, color: BgColor) {
        self.0.record(HwEvent::SetBackground(color));
    }

    fn force_keyframe(&mut self, encode: EncodeHandle) {
        self.0.record(HwEvent::ForceKeyframe(encode));
    }

    fn set_bitrate(&mut self, encode: EncodeHandle, bitrate: u32) {
        self.0.record(HwEvent::SetBitrate(encode, bitrate));
    }
}

#[derive(Default)]
pub struct KeyframeCounter {
    requests: Mutex<HashMap<InputIndex, usize>>,
}

impl KeyframeCounter {
    pub fn count(&self, index: InputIndex) -> usize {
        self.requests
            .lock()
            .unwrap()
            .get(&index)
            .copied()
            .unwrap_or(0)
    }
}

impl InputProducer for KeyframeCounter {
    fn request_key_frame(&self, index: InputIndex) {
        *self.requests.lock().unwrap().entry(index).or_default() += 1;
    }
}

#[derive(Default)]
pub struct ConsumerLog {
    events: Mutex<Vec<(OutputIndex, bool)>>,
}

impl ConsumerLog {
    /// `(index, attached)` in arrival order.
    pub fn events(&self) -> Vec<(OutputIndex, bool)> {
        self.events.lock().unwrap().clone()
    }
}

impl OutputConsumer for ConsumerLog {
    fn on_stream_attached(&self, index: OutputIndex) {
        self.events.lock().unwrap().push((index, true));
    }

    fn on_stream_detached(&self, index: OutputIndex) {
        self.events.lock().unwrap().push((index, false));
    }
}
