use std::sync::LazyLock;

use anyhow::Context;
use mix_engine::{
    codec::{BgColor, CodecType},
    settings::MixSettings,
};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub codec: CodecType,
    // kbps
    pub bitrate: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub background: BgColor,
    pub width: u32,
    pub height: u32,
    pub inputs: Vec<CodecType>,
    pub outputs: Vec<OutputConfig>,
    pub settings: MixSettings,
    pub stats_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            background: BgColor::BLACK,
            width: 1280,
            height: 720,
            inputs: Vec::new(),
            outputs: Vec::new(),
            settings: MixSettings::default(),
            stats_interval_secs: 10,
        }
    }
}

impl AppConfig {
    fn load(path: &str) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
        serde_json::from_str(&content).with_context(|| format!("parse config {}", path))
    }
}

pub fn config() -> &'static AppConfig {
    static CONFIG: LazyLock<AppConfig> = LazyLock::new(|| match std::env::var("MIX_CONFIG") {
        Ok(path) => AppConfig::load(&path).unwrap_or_else(|e| {
            log::error!("{:#}, using defaults", e);
            AppConfig::default()
        }),
        Err(_) => AppConfig::default(),
    });
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() -> anyhow::Result<()> {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "width": 640,
                "inputs": ["vp8", "h264"],
                "outputs": [{ "codec": "vp9", "bitrate": 900 }],
                "settings": { "block_size": 1200 }
            }"#,
        )?;
        assert_eq!(config.width, 640);
        assert_eq!(config.height, 720);
        assert_eq!(config.inputs, vec![CodecType::Vp8, CodecType::Avc]);
        assert_eq!(config.outputs[0].codec, CodecType::Vp9);
        assert_eq!(config.settings.block_size, 1200);
        assert_eq!(config.settings.gop_size, 24);
        Ok(())
    }
}
