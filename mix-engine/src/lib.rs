//! Orchestration core of a multipoint video mixer: which decoders, the
//! compositor and which encoders exist in the hardware pipeline, when they
//! are created and torn down, and how compressed data flows in and out.

pub mod bus;
pub mod codec;
pub mod engine;
pub mod error;
pub mod hw;
pub mod input;
pub mod output;
pub mod passthrough;
mod pipeline;
pub mod registry;
pub mod routes;
pub mod settings;
pub mod stats;

#[cfg(test)]
mod testing;

pub use bus::MixBus;
pub use engine::{PipelineState, VideoMixEngine};
pub use error::{MixError, Result};
