//! TIFF encoding options

use serde::{Deserialize, Serialize};

/// Compression applied to TIFF strips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TiffCompression {
    #[default]
    None,
    Lzw,
    DeflateFast,
    DeflateBalanced,
    DeflateBest,
}

/// Options for writing a TIFF file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TiffOptions {
    pub compression: TiffCompression,
    /// TIFF tag 317; 2 enables horizontal differencing, which only pays off
    /// with LZW or Deflate.
    pub predictor: Option<u16>,
}
