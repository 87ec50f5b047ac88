//! Contract with the hardware transcoder.
//!
//! A [`PipelineBackend`] opens one [`PipelineSession`] per in-service period with a
//! first decoder/compositor/encoder triple. Further decoders and encoders are
//! attached to and detached from the live session individually. Handles are opaque
//! tokens chosen by the backend.

use std::sync::Arc;

use crate::{
    codec::{BgColor, CodecType},
    input::InputChannel,
    output::OutputStream,
};

/// Constrained baseline profile.
pub const AVC_BASELINE_PROFILE: u16 = 66;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodeHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodeHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComposeHandle(pub u64);

#[derive(Clone)]
pub struct DecodeConfig {
    pub codec: CodecType,
    pub channel: Arc<InputChannel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposeConfig {
    pub background: BgColor,
    pub width: u32,
    pub height: u32,
}

/// Fixed encoder parameters applied to every AVC output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvcParams {
    pub profile: u16,
    pub num_ref_frames: u16,
    pub idr_interval: u32,
    pub intra_period: u32,
}

impl AvcParams {
    pub fn baseline(intra_period: u32) -> Self {
        Self {
            profile: AVC_BASELINE_PROFILE,
            num_ref_frames: 1,
            idr_interval: 0,
            intra_period,
        }
    }
}

#[derive(Clone)]
pub struct EncodeConfig {
    pub codec: CodecType,
    // kbps
    pub bitrate: u32,
    pub stream: Arc<OutputStream>,
    // set only for AVC
    pub avc: Option<AvcParams>,
}

impl EncodeConfig {
    pub fn new(codec: CodecType, bitrate: u32, stream: Arc<OutputStream>, gop_size: u32) -> Self {
        Self {
            codec,
            bitrate,
            stream,
            avc: codec.is_avc().then(|| AvcParams::baseline(gop_size)),
        }
    }
}

/// Result of opening a session: the session itself plus the handles of the
/// decoder, encoder and compositor it was opened with.
pub struct OpenedSession {
    pub session: Box<dyn PipelineSession>,
    pub decode: DecodeHandle,
    pub encode: EncodeHandle,
    pub compose: ComposeHandle,
}

pub trait PipelineBackend: Send {
    fn open(
        &mut self,
        decode: &DecodeConfig,
        compose: &ComposeConfig,
        encode: &EncodeConfig,
    ) -> anyhow::Result<OpenedSession>;
}

pub trait PipelineSession: Send {
    fn start(&mut self) -> anyhow::Result<()>;

    /// Stops processing and releases every decoder, encoder and the compositor.
    fn stop(&mut self);

    fn attach_input(
        &mut self,
        decode: &DecodeConfig,
        compose: ComposeHandle,
    ) -> anyhow::Result<DecodeHandle>;

    fn detach_input(&mut self, handle: DecodeHandle);

    fn attach_output(
        &mut self,
        encode: &EncodeConfig,
        compose: ComposeHandle,
    ) -> anyhow::Result<EncodeHandle>;

    fn detach_output(&mut self, handle: EncodeHandle);

    fn set_resolution(&mut self, compose: ComposeHandle, width: u32, height: u32);

    fn set_background_color(&mut self, _compose: ComposeHandle, _color: BgColor) {}

    fn force_keyframe(&mut self, encode: EncodeHandle);

    fn set_bitrate(&mut self, encode: EncodeHandle, bitrate: u32);
}
