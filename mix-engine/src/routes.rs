use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use bytes::Bytes;

use crate::{
    input::InputChannel,
    output::OutputStream,
    registry::{InputIndex, OutputIndex},
    stats::{EngineStats, StatsSnapshot},
};

/// Attached channels and streams by index. Only install/uninstall write here,
/// so a bootstrap in progress never holds this lock.
#[derive(Default)]
pub(crate) struct Routes {
    inputs: RwLock<HashMap<InputIndex, Arc<InputChannel>>>,
    outputs: RwLock<HashMap<OutputIndex, Arc<OutputStream>>>,
}

impl Routes {
    pub fn publish_input(&self, index: InputIndex, channel: Arc<InputChannel>) {
        self.inputs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index, channel);
    }

    pub fn withdraw_input(&self, index: InputIndex) {
        self.inputs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&index);
    }

    pub fn publish_output(&self, index: OutputIndex, stream: Arc<OutputStream>) {
        self.outputs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index, stream);
    }

    pub fn withdraw_output(&self, index: OutputIndex) {
        self.outputs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&index);
    }

    fn input(&self, index: InputIndex) -> Option<Arc<InputChannel>> {
        self.inputs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&index)
            .cloned()
    }

    fn output(&self, index: OutputIndex) -> Option<Arc<OutputStream>> {
        self.outputs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&index)
            .cloned()
    }
}

/// Producer/consumer entry point. Cheap to clone and safe to use from any thread
/// while the control side attaches and detaches.
#[derive(Clone)]
pub struct DataPlane {
    routes: Arc<Routes>,
    stats: Arc<EngineStats>,
}

impl DataPlane {
    pub(crate) fn new(routes: Arc<Routes>, stats: Arc<EngineStats>) -> Self {
        Self { routes, stats }
    }

    /// Hands one encoded unit to the decoder of `index`. Units for unknown or
    /// detached inputs and units that do not fit are dropped.
    pub fn push_input(&self, index: InputIndex, data: &[u8]) {
        let Some(channel) = self.routes.input(index) else {
            self.stats.push_unrouted();
            log::trace!("push to unattached {} dropped", index);
            return;
        };
        match channel.push(data) {
            Ok(n) => self.stats.pushed(n),
            Err(e) => {
                self.stats.push_dropped();
                log::trace!("push to {} dropped: {}", index, e);
            }
        }
    }

    /// Copies one encoded block of `index` into `buf`; 0 when nothing is queued.
    pub fn pull_output(&self, index: OutputIndex, buf: &mut [u8]) -> usize {
        let n = self
            .routes
            .output(index)
            .map(|stream| stream.pull_into(buf))
            .unwrap_or(0);
        self.stats.pulled(n > 0);
        n
    }

    pub fn pull_block(&self, index: OutputIndex) -> Option<Bytes> {
        let block = self.routes.output(index).and_then(|stream| stream.pull());
        self.stats.pulled(block.is_some());
        block
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
