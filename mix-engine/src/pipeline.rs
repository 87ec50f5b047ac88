//! Creation and demolition of the shared hardware session, and installation of
//! single inputs and outputs into a live one.

use std::sync::Arc;

use crate::{
    codec::BgColor,
    error::{MixError, Result},
    hw::{
        DecodeConfig, DecodeHandle, EncodeConfig, EncodeHandle, OpenedSession, PipelineBackend,
        PipelineSession,
    },
    input::InputChannel,
    output::OutputStream,
    registry::{
        ComposeDescriptor, IndexRef, InputAttachment, InputIndex, OutputAttachment, OutputIndex,
        Registry,
    },
    routes::Routes,
    settings::MixSettings,
    stats::EngineStats,
};

pub(crate) struct Pipeline {
    backend: Box<dyn PipelineBackend>,
    session: Option<Box<dyn PipelineSession>>,
    settings: MixSettings,
    routes: Arc<Routes>,
    stats: Arc<EngineStats>,
}

impl Pipeline {
    pub fn new(
        backend: Box<dyn PipelineBackend>,
        settings: MixSettings,
        routes: Arc<Routes>,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            backend,
            session: None,
            settings,
            routes,
            stats,
        }
    }

    pub fn is_live(&self) -> bool {
        self.session.is_some()
    }

    pub fn settings(&self) -> &MixSettings {
        &self.settings
    }

    fn new_channel(&self, input: InputIndex, registry: &Registry) -> Result<DecodeConfig> {
        let descriptor = registry
            .input(input)
            .ok_or(MixError::InvalidIndex(input.into()))?;
        Ok(DecodeConfig {
            codec: descriptor.codec,
            channel: Arc::new(InputChannel::new(
                descriptor.codec,
                self.settings.channel_capacity,
            )),
        })
    }

    fn new_stream(&self, output: OutputIndex, registry: &Registry) -> Result<EncodeConfig> {
        let descriptor = registry
            .output(output)
            .ok_or(MixError::InvalidIndex(output.into()))?;
        Ok(EncodeConfig::new(
            descriptor.codec,
            descriptor.bitrate,
            Arc::new(OutputStream::new(
                self.settings.block_size,
                self.settings.stream_capacity,
            )),
            self.settings.gop_size,
        ))
    }

    /// Opens the session with the earliest registered input and output, then
    /// installs every other registered input and output. On any failure the
    /// session is torn down again and no descriptor is left attached.
    pub fn bootstrap(
        &mut self,
        registry: &mut Registry,
        compose: &mut ComposeDescriptor,
    ) -> Result<()> {
        if self.session.is_some() {
            log::warn!("bootstrap skipped: pipeline already live");
            return Ok(());
        }
        let (Some(input), Some(output)) = (registry.first_input(), registry.first_output()) else {
            return Err(MixError::Hardware(anyhow::anyhow!(
                "bootstrap needs at least one input and one output"
            )));
        };

        let decode = self.new_channel(input, registry)?;
        let encode = self.new_stream(output, registry)?;
        let OpenedSession {
            mut session,
            decode: decode_handle,
            encode: encode_handle,
            compose: compose_handle,
        } = self
            .backend
            .open(&decode, &compose.config(), &encode)
            .map_err(|e| {
                log::error!("open pipeline session error: {:#}", e);
                MixError::Hardware(e)
            })?;
        if let Err(e) = session.start() {
            log::error!("start pipeline session error: {:#}", e);
            session.stop();
            return Err(MixError::Hardware(e));
        }

        self.session = Some(session);
        compose.handle = Some(compose_handle);
        self.attach_input_descriptor(registry, input, decode_handle, decode.channel);
        self.attach_output_descriptor(registry, output, encode_handle, encode.stream);

        let rest = self.install_rest(registry, compose, input, output);
        if let Err(e) = rest {
            log::error!("bootstrap rollback: {}", e);
            self.demolish(registry, compose);
            return Err(e);
        }

        self.stats.bootstrapped();
        log::info!(
            "pipeline started: {} inputs, {} outputs, {}x{}",
            registry.input_count(),
            registry.output_count(),
            compose.width,
            compose.height
        );
        Ok(())
    }

    fn install_rest(
        &mut self,
        registry: &mut Registry,
        compose: &ComposeDescriptor,
        paired_input: InputIndex,
        paired_output: OutputIndex,
    ) -> Result<()> {
        for index in registry.input_indices() {
            if index != paired_input {
                self.install_input(registry, compose, index)?;
            }
        }
        for index in registry.output_indices() {
            if index != paired_output {
                self.install_output(registry, compose, index)?;
            }
        }
        Ok(())
    }

    pub fn install_input(
        &mut self,
        registry: &mut Registry,
        compose: &ComposeDescriptor,
        index: InputIndex,
    ) -> Result<()> {
        if registry.input(index).is_some_and(|d| d.is_attached()) {
            return Ok(());
        }
        let decode = self.new_channel(index, registry)?;
        let (Some(session), Some(compose_handle)) = (self.session.as_mut(), compose.handle) else {
            return Err(MixError::SessionNotLive);
        };
        let handle = session
            .attach_input(&decode, compose_handle)
            .map_err(|e| {
                log::error!("attach {} error: {:#}", index, e);
                MixError::Hardware(e)
            })?;
        self.attach_input_descriptor(registry, index, handle, decode.channel);
        Ok(())
    }

    pub fn install_output(
        &mut self,
        registry: &mut Registry,
        compose: &ComposeDescriptor,
        index: OutputIndex,
    ) -> Result<()> {
        if registry.output(index).is_some_and(|d| d.is_attached()) {
            return Ok(());
        }
        let encode = self.new_stream(index, registry)?;
        let (Some(session), Some(compose_handle)) = (self.session.as_mut(), compose.handle) else {
            return Err(MixError::SessionNotLive);
        };
        let handle = session
            .attach_output(&encode, compose_handle)
            .map_err(|e| {
                log::error!("attach {} error: {:#}", index, e);
                MixError::Hardware(e)
            })?;
        self.attach_output_descriptor(registry, index, handle, encode.stream);
        Ok(())
    }

    fn attach_input_descriptor(
        &self,
        registry: &mut Registry,
        index: InputIndex,
        handle: DecodeHandle,
        channel: Arc<InputChannel>,
    ) {
        let Some(descriptor) = registry.input_mut(index) else {
            return;
        };
        descriptor.attachment = Some(InputAttachment {
            handle,
            channel: channel.clone(),
        });
        self.routes.publish_input(index, channel);
        log::debug!("{} attached as decoder {:?}", index, handle);

        // decoder needs a clean starting point
        if let Some(producer) = &descriptor.producer {
            producer.request_key_frame(index);
        }
    }

    fn attach_output_descriptor(
        &self,
        registry: &mut Registry,
        index: OutputIndex,
        handle: EncodeHandle,
        stream: Arc<OutputStream>,
    ) {
        let Some(descriptor) = registry.output_mut(index) else {
            return;
        };
        descriptor.attachment = Some(OutputAttachment {
            handle,
            stream: stream.clone(),
        });
        self.routes.publish_output(index, stream);
        log::debug!("{} attached as encoder {:?}", index, handle);

        if let Some(consumer) = &descriptor.consumer {
            consumer.on_stream_attached(index);
        }
    }

    /// Detaches one input and releases its channel. No-op when not attached.
    pub fn uninstall_input(&mut self, registry: &mut Registry, index: InputIndex) {
        let Some(attachment) = registry
            .input_mut(index)
            .and_then(|d| d.attachment.take())
        else {
            return;
        };
        self.routes.withdraw_input(index);
        if let Some(session) = self.session.as_mut() {
            session.detach_input(attachment.handle);
        }
        log::debug!("{} detached", index);
    }

    /// Detaches one output and releases its stream. No-op when not attached.
    pub fn uninstall_output(&mut self, registry: &mut Registry, index: OutputIndex) {
        let Some(descriptor) = registry.output_mut(index) else {
            return;
        };
        let Some(attachment) = descriptor.attachment.take() else {
            return;
        };
        self.routes.withdraw_output(index);
        if let Some(session) = self.session.as_mut() {
            session.detach_output(attachment.handle);
        }
        if let Some(consumer) = &descriptor.consumer {
            consumer.on_stream_detached(index);
        }
        log::debug!("{} detached", index);
    }

    /// Stops and releases the session. Descriptors that are still registered
    /// lose their handles, channels and streams along with it.
    pub fn demolish(&mut self, registry: &mut Registry, compose: &mut ComposeDescriptor) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        for (index, descriptor) in registry.inputs_mut() {
            if descriptor.attachment.take().is_some() {
                self.routes.withdraw_input(*index);
            }
        }
        for (index, descriptor) in registry.outputs_mut() {
            if descriptor.attachment.take().is_some() {
                self.routes.withdraw_output(*index);
                if let Some(consumer) = &descriptor.consumer {
                    consumer.on_stream_detached(*index);
                }
            }
        }

        session.stop();
        compose.handle = None;
        self.stats.demolished();
        log::info!("pipeline stopped");
    }

    pub fn set_resolution(&mut self, compose: &ComposeDescriptor) {
        if let (Some(session), Some(handle)) = (self.session.as_mut(), compose.handle) {
            session.set_resolution(handle, compose.width, compose.height);
        }
    }

    pub fn set_background_color(&mut self, compose: &ComposeDescriptor, color: BgColor) {
        if let (Some(session), Some(handle)) = (self.session.as_mut(), compose.handle) {
            session.set_background_color(handle, color);
        }
    }

    pub fn force_keyframe(&mut self, registry: &Registry, index: OutputIndex) -> Result<()> {
        let descriptor = registry
            .output(index)
            .ok_or(MixError::InvalidIndex(IndexRef::Output(index)))?;
        if let (Some(session), Some(handle)) = (self.session.as_mut(), descriptor.encode_handle()) {
            session.force_keyframe(handle);
        }
        Ok(())
    }

    pub fn set_bitrate(
        &mut self,
        registry: &mut Registry,
        index: OutputIndex,
        bitrate: u32,
    ) -> Result<()> {
        let descriptor = registry
            .output_mut(index)
            .ok_or(MixError::InvalidIndex(IndexRef::Output(index)))?;
        descriptor.bitrate = bitrate;
        if let (Some(session), Some(handle)) = (self.session.as_mut(), descriptor.encode_handle()) {
            session.set_bitrate(handle, bitrate);
        }
        Ok(())
    }
}
