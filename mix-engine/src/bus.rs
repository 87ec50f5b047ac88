use std::sync::Arc;

use bytes::Bytes;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    codec::{BgColor, CodecType},
    engine::{PipelineState, VideoMixEngine},
    error::{MixError, Result},
    registry::{InputIndex, InputProducer, OutputConsumer, OutputIndex},
    routes::DataPlane,
    stats::StatsSnapshot,
};

/// Owns a [`VideoMixEngine`] on a spawned task and applies control requests
/// one at a time in arrival order. Pushes and pulls skip the mailbox.
pub struct MixBus {
    id: String,
    cancel: CancellationToken,
    tx: mpsc::Sender<MixCommand>,
    data: DataPlane,
    task: Option<JoinHandle<()>>,
}

impl MixBus {
    pub fn new(id: &str, engine: VideoMixEngine) -> Self {
        let id = id.to_string();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(engine.settings().command_queue.max(1));
        let data = engine.data_plane();

        let cancel_clone = cancel.clone();
        let id_clone = id.clone();
        let task =
            tokio::spawn(async move { Self::inner_loop(id_clone, cancel_clone, rx, engine).await });
        Self {
            id,
            cancel,
            tx,
            data,
            task: Some(task),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    async fn inner_loop(
        id: String,
        cancel: CancellationToken,
        mut rx: mpsc::Receiver<MixCommand>,
        mut engine: VideoMixEngine,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    break;
                },
                Some(cmd) = rx.recv() => {
                    if let Err(e) = Self::inner_command_handler(&mut engine, cmd) {
                        log::error!("[{}] inner_command_handler error: {:#}", id, e);
                    }
                },
            }
        }
        // releases the hardware session, if any
        drop(engine);
        log::info!("[{}] mix bus stopped", id);
    }

    fn inner_command_handler(engine: &mut VideoMixEngine, cmd: MixCommand) -> anyhow::Result<()> {
        match cmd {
            MixCommand::Initialize {
                background,
                width,
                height,
                result,
            } => reply(result, engine.initialize(background, width, height)),
            MixCommand::EnableInput {
                codec,
                producer,
                result,
            } => reply(result, engine.enable_input(codec, producer)),
            MixCommand::DisableInput { index, result } => {
                reply(result, engine.disable_input(index))
            }
            MixCommand::EnableOutput {
                codec,
                bitrate,
                consumer,
                result,
            } => reply(result, engine.enable_output(codec, bitrate, consumer)),
            MixCommand::DisableOutput { index, result } => {
                reply(result, engine.disable_output(index))
            }
            MixCommand::SetResolution {
                width,
                height,
                result,
            } => {
                engine.set_resolution(width, height);
                reply(result, ())
            }
            MixCommand::SetBackgroundColor { color, result } => {
                engine.set_background_color(color);
                reply(result, ())
            }
            MixCommand::ForceKeyframe { index, result } => {
                reply(result, engine.force_keyframe(index))
            }
            MixCommand::SetBitrate {
                index,
                bitrate,
                result,
            } => reply(result, engine.set_bitrate(index, bitrate)),
            MixCommand::State { result } => reply(result, engine.state()),
        }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> MixCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(build(tx))
            .await
            .map_err(|_| MixError::BusClosed)?;
        rx.await.map_err(|_| MixError::BusClosed)
    }

    pub async fn initialize(&self, background: BgColor, width: u32, height: u32) -> Result<()> {
        self.request(|result| MixCommand::Initialize {
            background,
            width,
            height,
            result,
        })
        .await?
    }

    pub async fn enable_input(
        &self,
        codec: CodecType,
        producer: Option<Arc<dyn InputProducer>>,
    ) -> Result<InputIndex> {
        self.request(|result| MixCommand::EnableInput {
            codec,
            producer,
            result,
        })
        .await?
    }

    pub async fn disable_input(&self, index: InputIndex) -> Result<()> {
        self.request(|result| MixCommand::DisableInput { index, result })
            .await?
    }

    pub async fn enable_output(
        &self,
        codec: CodecType,
        bitrate: u32,
        consumer: Option<Arc<dyn OutputConsumer>>,
    ) -> Result<OutputIndex> {
        self.request(|result| MixCommand::EnableOutput {
            codec,
            bitrate,
            consumer,
            result,
        })
        .await?
    }

    pub async fn disable_output(&self, index: OutputIndex) -> Result<()> {
        self.request(|result| MixCommand::DisableOutput { index, result })
            .await?
    }

    pub async fn set_resolution(&self, width: u32, height: u32) -> Result<()> {
        self.request(|result| MixCommand::SetResolution {
            width,
            height,
            result,
        })
        .await
    }

    pub async fn set_background_color(&self, color: BgColor) -> Result<()> {
        self.request(|result| MixCommand::SetBackgroundColor { color, result })
            .await
    }

    pub async fn force_keyframe(&self, index: OutputIndex) -> Result<()> {
        self.request(|result| MixCommand::ForceKeyframe { index, result })
            .await?
    }

    pub async fn set_bitrate(&self, index: OutputIndex, bitrate: u32) -> Result<()> {
        self.request(|result| MixCommand::SetBitrate {
            index,
            bitrate,
            result,
        })
        .await?
    }

    pub async fn state(&self) -> Result<PipelineState> {
        self.request(|result| MixCommand::State { result }).await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.data.stats()
    }

    pub fn data_plane(&self) -> DataPlane {
        self.data.clone()
    }

    pub fn push_input(&self, index: InputIndex, data: &[u8]) {
        self.data.push_input(index, data);
    }

    pub fn pull_output(&self, index: OutputIndex, buf: &mut [u8]) -> usize {
        self.data.pull_output(index, buf)
    }

    pub fn pull_block(&self, index: OutputIndex) -> Option<Bytes> {
        self.data.pull_block(index)
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stops the loop and waits until the engine has released its session.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("[{}] mix bus task error: {}", self.id, e);
            }
        }
    }
}

impl Drop for MixBus {
    fn drop(&mut self) {
        self.stop();
    }
}

fn reply<T>(result: oneshot::Sender<T>, value: T) -> anyhow::Result<()> {
    result
        .send(value)
        .map_err(|_| anyhow::anyhow!("send result error: receiver dropped"))
}

enum MixCommand {
    Initialize {
        background: BgColor,
        width: u32,
        height: u32,
        result: oneshot::Sender<Result<()>>,
    },
    EnableInput {
        codec: CodecType,
        producer: Option<Arc<dyn InputProducer>>,
        result: oneshot::Sender<Result<InputIndex>>,
    },
    DisableInput {
        index: InputIndex,
        result: oneshot::Sender<Result<()>>,
    },
    EnableOutput {
        codec: CodecType,
        bitrate: u32,
        consumer: Option<Arc<dyn OutputConsumer>>,
        result: oneshot::Sender<Result<OutputIndex>>,
    },
    DisableOutput {
        index: OutputIndex,
        result: oneshot::Sender<Result<()>>,
    },
    SetResolution {
        width: u32,
        height: u32,
        result: oneshot::Sender<()>,
    },
    SetBackgroundColor {
        color: BgColor,
        result: oneshot::Sender<()>,
    },
    ForceKeyframe {
        index: OutputIndex,
        result: oneshot::Sender<Result<()>>,
    },
    SetBitrate {
        index: OutputIndex,
        bitrate: u32,
        result: oneshot::Sender<Result<()>>,
    },
    State {
        result: oneshot::Sender<PipelineState>,
    },
}

#[cfg(test)]
#[path = "bus_test.rs"]
mod bus_test;
