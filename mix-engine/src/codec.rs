use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Video codecs the mixer can decode from producers and encode for consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecType {
    Vp8,
    Vp9,
    #[serde(alias = "h264")]
    Avc,
    #[serde(alias = "h265")]
    Hevc,
}

impl CodecType {
    /// VP8 units carry no length delimiting of their own, so the input channel
    /// writes a 4-byte length ahead of every unit.
    pub fn is_length_prefixed(self) -> bool {
        matches!(self, CodecType::Vp8)
    }

    pub fn is_avc(self) -> bool {
        matches!(self, CodecType::Avc)
    }

    pub fn name(self) -> &'static str {
        match self {
            CodecType::Vp8 => "vp8",
            CodecType::Vp9 => "vp9",
            CodecType::Avc => "h264",
            CodecType::Hevc => "hevc",
        }
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CodecType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vp8" => Ok(CodecType::Vp8),
            "vp9" => Ok(CodecType::Vp9),
            "avc" | "h264" => Ok(CodecType::Avc),
            "hevc" | "h265" => Ok(CodecType::Hevc),
            other => Err(anyhow::anyhow!("unknown codec: {}", other)),
        }
    }
}

/// Composition background in YCbCr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BgColor {
    pub y: u8,
    pub cb: u8,
    pub cr: u8,
}

impl BgColor {
    pub const BLACK: BgColor = BgColor {
        y: 16,
        cb: 128,
        cr: 128,
    };

    pub fn new(y: u8, cb: u8, cr: u8) -> Self {
        Self { y, cb, cr }
    }
}

impl Default for BgColor {
    fn default() -> Self {
        Self::BLACK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_from_str_aliases() -> anyhow::Result<()> {
        assert_eq!("h264".parse::<CodecType>()?, CodecType::Avc);
        assert_eq!("AVC".parse::<CodecType>()?, CodecType::Avc);
        assert_eq!("h265".parse::<CodecType>()?, CodecType::Hevc);
        assert_eq!("vp8".parse::<CodecType>()?, CodecType::Vp8);
        assert!("mjpeg".parse::<CodecType>().is_err());
        Ok(())
    }

    #[test]
    fn test_only_vp8_is_length_prefixed() {
        assert!(CodecType::Vp8.is_length_prefixed());
        assert!(!CodecType::Vp9.is_length_prefixed());
        assert!(!CodecType::Avc.is_length_prefixed());
        assert!(!CodecType::Hevc.is_length_prefixed());
    }

    #[test]
    fn test_codec_serde_lowercase() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&CodecType::Hevc)?, "\"hevc\"");
        let codec: CodecType = serde_json::from_str("\"vp9\"")?;
        assert_eq!(codec, CodecType::Vp9);
        Ok(())
    }
}
