use crate::{codec::CodecType, registry::IndexRef};

#[derive(Debug, thiserror::Error)]
pub enum MixError {
    #[error("mix engine already initialized")]
    AlreadyInitialized,

    #[error("mix engine not initialized")]
    NotInitialized,

    #[error("codec {0} is already used by another output")]
    CodecConflict(CodecType),

    #[error("no free identifier left")]
    ResourceExhausted,

    #[error("invalid {0}")]
    InvalidIndex(IndexRef),

    #[error("input channel full: {needed} bytes needed, {free} free")]
    BufferFull { needed: usize, free: usize },

    #[error("hardware pipeline session is not live")]
    SessionNotLive,

    #[error("hardware pipeline: {0:#}")]
    Hardware(anyhow::Error),

    #[error("mix bus closed")]
    BusClosed,
}

pub type Result<T> = std::result::Result<T, MixError>;
