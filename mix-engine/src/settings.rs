use serde::{Deserialize, Serialize};

/// Intra period used for AVC outputs.
pub const GOP_SIZE: u32 = 24;

/// Tunables for buffering and the control mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixSettings {
    // bytes per input channel
    pub channel_capacity: usize,
    // bytes per output block
    pub block_size: usize,
    // blocks per output stream
    pub stream_capacity: usize,
    pub gop_size: u32,
    pub command_queue: usize,
}

impl Default for MixSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 1024 * 1024,
            block_size: 4096,
            stream_capacity: 1024,
            gop_size: GOP_SIZE,
            command_queue: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() -> anyhow::Result<()> {
        let settings: MixSettings = serde_json::from_str(r#"{ "block_size": 1500 }"#)?;
        assert_eq!(settings.block_size, 1500);
        assert_eq!(settings.gop_size, GOP_SIZE);
        assert_eq!(settings.channel_capacity, MixSettings::default().channel_capacity);
        Ok(())
    }
}
