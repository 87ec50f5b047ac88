use std::sync::Arc;

use serde::Serialize;

use crate::{
    codec::{BgColor, CodecType},
    error::{MixError, Result},
    hw::PipelineBackend,
    pipeline::Pipeline,
    registry::{
        ComposeDescriptor, InputDescriptor, InputIndex, InputProducer, OutputConsumer,
        OutputDescriptor, OutputIndex, Registry,
    },
    routes::{DataPlane, Routes},
    settings::MixSettings,
    stats::{EngineStats, StatsSnapshot},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Uninitialized,
    Idle,
    /// At least one output, no input.
    WaitingForInput,
    /// At least one input, no output.
    WaitingForOutput,
    /// Inputs and outputs present, hardware session live.
    InService,
}

/// Decides what every control request may do in the current state and
/// drives the registry and the pipeline accordingly.
///
/// All methods take `&mut self`; callers serialize access, e.g. through
/// [`crate::bus::MixBus`]. Producers and consumers go through [`DataPlane`].
pub struct VideoMixEngine {
    state: PipelineState,
    registry: Registry,
    compose: ComposeDescriptor,
    pipeline: Pipeline,
    routes: Arc<Routes>,
    stats: Arc<EngineStats>,
}

impl VideoMixEngine {
    pub fn new(backend: impl PipelineBackend + 'static, settings: MixSettings) -> Self {
        let routes = Arc::new(Routes::default());
        let stats = Arc::new(EngineStats::default());
        Self {
            state: PipelineState::Uninitialized,
            registry: Registry::new(),
            compose: ComposeDescriptor::default(),
            pipeline: Pipeline::new(Box::new(backend), settings, routes.clone(), stats.clone()),
            routes,
            stats,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn initialize(&mut self, background: BgColor, width: u32, height: u32) -> Result<()> {
        if self.state != PipelineState::Uninitialized {
            log::warn!("mix engine already initialized");
            return Err(MixError::AlreadyInitialized);
        }
        self.compose.background = background;
        self.compose.width = width;
        self.compose.height = height;
        self.state = PipelineState::Idle;
        log::info!("mix engine initialized: {}x{}", width, height);
        Ok(())
    }

    pub fn enable_input(
        &mut self,
        codec: CodecType,
        producer: Option<Arc<dyn InputProducer>>,
    ) -> Result<InputIndex> {
        let index = match self.state {
            PipelineState::Uninitialized => return Err(MixError::NotInitialized),
            PipelineState::Idle | PipelineState::WaitingForOutput => {
                let index = self.registry.schedule_input(codec, producer)?;
                self.state = PipelineState::WaitingForOutput;
                index
            }
            PipelineState::WaitingForInput => {
                let index = self.registry.schedule_input(codec, producer)?;
                if let Err(e) = self.pipeline.bootstrap(&mut self.registry, &mut self.compose) {
                    self.registry.remove_input(index);
                    return Err(e);
                }
                self.state = PipelineState::InService;
                index
            }
            PipelineState::InService => {
                let index = self.registry.schedule_input(codec, producer)?;
                if let Err(e) = self
                    .pipeline
                    .install_input(&mut self.registry, &self.compose, index)
                {
                    self.registry.remove_input(index);
                    return Err(e);
                }
                index
            }
        };
        log::info!("{} enabled ({}), state {:?}", index, codec, self.state);
        Ok(index)
    }

    pub fn enable_output(
        &mut self,
        codec: CodecType,
        bitrate: u32,
        consumer: Option<Arc<dyn OutputConsumer>>,
    ) -> Result<OutputIndex> {
        let index = match self.state {
            PipelineState::Uninitialized => return Err(MixError::NotInitialized),
            PipelineState::Idle | PipelineState::WaitingForInput => {
                let index = self.registry.schedule_output(codec, bitrate, consumer)?;
                self.state = PipelineState::WaitingForInput;
                index
            }
            PipelineState::WaitingForOutput => {
                let index = self.registry.schedule_output(codec, bitrate, consumer)?;
                if let Err(e) = self.pipeline.bootstrap(&mut self.registry, &mut self.compose) {
                    self.registry.remove_output(index);
                    return Err(e);
                }
                self.state = PipelineState::InService;
                index
            }
            PipelineState::InService => {
                let index = self.registry.schedule_output(codec, bitrate, consumer)?;
                if let Err(e) = self
                    .pipeline
                    .install_output(&mut self.registry, &self.compose, index)
                {
                    self.registry.remove_output(index);
                    return Err(e);
                }
                index
            }
        };
        log::info!(
            "{} enabled ({} @ {} kbps), state {:?}",
            index,
            codec,
            bitrate,
            self.state
        );
        Ok(index)
    }

    pub fn disable_input(&mut self, index: InputIndex) -> Result<()> {
        if self.registry.input(index).is_none() {
            self.stats.invalid_index();
            log::warn!("disable unknown {}", index);
            return Err(MixError::InvalidIndex(index.into()));
        }
        if self.state == PipelineState::InService {
            self.pipeline.uninstall_input(&mut self.registry, index);
        }
        self.registry.remove_input(index);
        if self.registry.input_count() == 0 {
            self.pipeline.demolish(&mut self.registry, &mut self.compose);
        }
        self.settle_state();
        log::info!("{} disabled, state {:?}", index, self.state);
        Ok(())
    }

    pub fn disable_output(&mut self, index: OutputIndex) -> Result<()> {
        if self.registry.output(index).is_none() {
            self.stats.invalid_index();
            log::warn!("disable unknown {}", index);
            return Err(MixError::InvalidIndex(index.into()));
        }
        if self.state == PipelineState::InService {
            self.pipeline.uninstall_output(&mut self.registry, index);
        }
        self.registry.remove_output(index);
        if self.registry.output_count() == 0 {
            self.pipeline.demolish(&mut self.registry, &mut self.compose);
        }
        self.settle_state();
        log::info!("{} disabled, state {:?}", index, self.state);
        Ok(())
    }

    fn settle_state(&mut self) {
        let inputs = self.registry.input_count() > 0;
        let outputs = self.registry.output_count() > 0;
        self.state = match (inputs, outputs) {
            (false, false) => PipelineState::Idle,
            (false, true) => PipelineState::WaitingForInput,
            (true, false) => PipelineState::WaitingForOutput,
            (true, true) if self.pipeline.is_live() => PipelineState::InService,
            // both kinds present only ever happens with a live session
            (true, true) => self.state,
        };
    }

    /// Stored immediately; reaches the hardware only while in service.
    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.compose.width = width;
        self.compose.height = height;
        if self.state == PipelineState::InService {
            self.pipeline.set_resolution(&self.compose);
        }
    }

    pub fn set_background_color(&mut self, color: BgColor) {
        self.compose.background = color;
        if self.state == PipelineState::InService {
            self.pipeline.set_background_color(&self.compose, color);
        }
    }

    pub fn force_keyframe(&mut self, index: OutputIndex) -> Result<()> {
        self.pipeline
            .force_keyframe(&self.registry, index)
            .inspect_err(|_| self.stats.invalid_index())
    }

    pub fn set_bitrate(&mut self, index: OutputIndex, bitrate: u32) -> Result<()> {
        self.pipeline
            .set_bitrate(&mut self.registry, index, bitrate)
            .inspect_err(|_| self.stats.invalid_index())
    }

    pub fn settings(&self) -> &MixSettings {
        self.pipeline.settings()
    }

    pub fn data_plane(&self) -> DataPlane {
        DataPlane::new(self.routes.clone(), self.stats.clone())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn compose(&self) -> &ComposeDescriptor {
        &self.compose
    }

    pub fn input(&self, index: InputIndex) -> Option<&InputDescriptor> {
        self.registry.input(index)
    }

    pub fn output(&self, index: OutputIndex) -> Option<&OutputDescriptor> {
        self.registry.output(index)
    }

    pub fn input_count(&self) -> usize {
        self.registry.input_count()
    }

    pub fn output_count(&self) -> usize {
        self.registry.output_count()
    }

    pub fn is_live(&self) -> bool {
        self.pipeline.is_live()
    }
}

impl Drop for VideoMixEngine {
    fn drop(&mut self) {
        self.pipeline.demolish(&mut self.registry, &mut self.compose);
    }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;
