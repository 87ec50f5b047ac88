use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::{
    codec::{BgColor, CodecType},
    error::{MixError, Result},
    hw::{ComposeConfig, ComposeHandle, DecodeHandle, EncodeHandle},
    input::InputChannel,
    output::OutputStream,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InputIndex(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputIndex(pub u32);

impl fmt::Display for InputIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "input#{}", self.0)
    }
}

impl fmt::Display for OutputIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output#{}", self.0)
    }
}

/// Either kind of index, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexRef {
    Input(InputIndex),
    Output(OutputIndex),
}

impl fmt::Display for IndexRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexRef::Input(index) => index.fmt(f),
            IndexRef::Output(index) => index.fmt(f),
        }
    }
}

impl From<InputIndex> for IndexRef {
    fn from(index: InputIndex) -> Self {
        IndexRef::Input(index)
    }
}

impl From<OutputIndex> for IndexRef {
    fn from(index: OutputIndex) -> Self {
        IndexRef::Output(index)
    }
}

/// Source of encoded video for one input.
pub trait InputProducer: Send + Sync {
    /// The decoder for `index` was (re)attached and needs a keyframe to start from.
    fn request_key_frame(&self, index: InputIndex);
}

/// Reader of one output's encoded blocks.
pub trait OutputConsumer: Send + Sync {
    fn on_stream_attached(&self, _index: OutputIndex) {}

    fn on_stream_detached(&self, _index: OutputIndex) {}
}

pub(crate) struct InputAttachment {
    pub handle: DecodeHandle,
    pub channel: Arc<InputChannel>,
}

pub(crate) struct OutputAttachment {
    pub handle: EncodeHandle,
    pub stream: Arc<OutputStream>,
}

pub struct InputDescriptor {
    pub codec: CodecType,
    pub producer: Option<Arc<dyn InputProducer>>,
    pub(crate) attachment: Option<InputAttachment>,
}

impl InputDescriptor {
    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    pub fn decode_handle(&self) -> Option<DecodeHandle> {
        self.attachment.as_ref().map(|a| a.handle)
    }

    pub fn channel(&self) -> Option<&Arc<InputChannel>> {
        self.attachment.as_ref().map(|a| &a.channel)
    }
}

pub struct OutputDescriptor {
    pub codec: CodecType,
    // kbps
    pub bitrate: u32,
    pub consumer: Option<Arc<dyn OutputConsumer>>,
    pub(crate) attachment: Option<OutputAttachment>,
}

impl OutputDescriptor {
    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    pub fn encode_handle(&self) -> Option<EncodeHandle> {
        self.attachment.as_ref().map(|a| a.handle)
    }

    pub fn stream(&self) -> Option<&Arc<OutputStream>> {
        self.attachment.as_ref().map(|a| &a.stream)
    }
}

/// Composition stage settings shared by every input and output.
#[derive(Debug, Clone, Default)]
pub struct ComposeDescriptor {
    pub background: BgColor,
    pub width: u32,
    pub height: u32,
    pub(crate) handle: Option<ComposeHandle>,
}

impl ComposeDescriptor {
    pub fn config(&self) -> ComposeConfig {
        ComposeConfig {
            background: self.background,
            width: self.width,
            height: self.height,
        }
    }

    pub fn handle(&self) -> Option<ComposeHandle> {
        self.handle
    }
}

/// Owner of every input and output descriptor.
///
/// Indices come from two independent counters and are never handed out twice.
/// Maps are ordered by index, which is registration order.
#[derive(Default)]
pub struct Registry {
    next_input: u32,
    next_output: u32,
    inputs: BTreeMap<InputIndex, InputDescriptor>,
    outputs: BTreeMap<OutputIndex, OutputDescriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_input(
        &mut self,
        codec: CodecType,
        producer: Option<Arc<dyn InputProducer>>,
    ) -> Result<InputIndex> {
        let index = InputIndex(self.next_input);
        self.next_input = self
            .next_input
            .checked_add(1)
            .ok_or(MixError::ResourceExhausted)?;
        self.inputs.insert(
            index,
            InputDescriptor {
                codec,
                producer,
                attachment: None,
            },
        );
        Ok(index)
    }

    /// Admits a new output. Encoder codecs are exclusive among live outputs.
    pub fn schedule_output(
        &mut self,
        codec: CodecType,
        bitrate: u32,
        consumer: Option<Arc<dyn OutputConsumer>>,
    ) -> Result<OutputIndex> {
        if self.is_codec_in_use(codec) {
            return Err(MixError::CodecConflict(codec));
        }
        let index = OutputIndex(self.next_output);
        self.next_output = self
            .next_output
            .checked_add(1)
            .ok_or(MixError::ResourceExhausted)?;
        self.outputs.insert(
            index,
            OutputDescriptor {
                codec,
                bitrate,
                consumer,
                attachment: None,
            },
        );
        Ok(index)
    }

    pub fn is_codec_in_use(&self, codec: CodecType) -> bool {
        self.outputs.values().any(|o| o.codec == codec)
    }

    pub fn input(&self, index: InputIndex) -> Option<&InputDescriptor> {
        self.inputs.get(&index)
    }

    pub fn input_mut(&mut self, index: InputIndex) -> Option<&mut InputDescriptor> {
        self.inputs.get_mut(&index)
    }

    pub fn output(&self, index: OutputIndex) -> Option<&OutputDescriptor> {
        self.outputs.get(&index)
    }

    pub fn output_mut(&mut self, index: OutputIndex) -> Option<&mut OutputDescriptor> {
        self.outputs.get_mut(&index)
    }

    pub fn remove_input(&mut self, index: InputIndex) -> Option<InputDescriptor> {
        self.inputs.remove(&index)
    }

    pub fn remove_output(&mut self, index: OutputIndex) -> Option<OutputDescriptor> {
        self.outputs.remove(&index)
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn first_input(&self) -> Option<InputIndex> {
        self.inputs.keys().next().copied()
    }

    pub fn first_output(&self) -> Option<OutputIndex> {
        self.outputs.keys().next().copied()
    }

    pub fn input_indices(&self) -> Vec<InputIndex> {
        self.inputs.keys().copied().collect()
    }

    pub fn output_indices(&self) -> Vec<OutputIndex> {
        self.outputs.keys().copied().collect()
    }

    pub(crate) fn inputs_mut(&mut self) -> impl Iterator<Item = (&InputIndex, &mut InputDescriptor)> {
        self.inputs.iter_mut()
    }

    pub(crate) fn outputs_mut(
        &mut self,
    ) -> impl Iterator<Item = (&OutputIndex, &mut OutputDescriptor)> {
        self.outputs.iter_mut()
    }
}
