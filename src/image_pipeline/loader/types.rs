use serde::{Deserialize, Serialize};

use crate::image_pipeline::raw::RawDecodingSettings;
use crate::image_pipeline::tiff::{TiffCompression, TiffOptions};

/// On-disk encodings the loader family understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Raw,
    Jpeg,
    Png,
    Tiff,
    /// Anything else the generic codec can guess from content.
    Other,
}

impl ImageFormat {
    /// Value stored in the buffer's `format` attribute.
    pub fn name(self) -> &'static str {
        match self {
            ImageFormat::Raw => "RAW",
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
            ImageFormat::Tiff => "TIFF",
            ImageFormat::Other => "GENERIC",
        }
    }
}

/// Options consumed by [`ImageLoader::decode`](super::ImageLoader::decode).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeOptions {
    /// Only read by the RAW loader.
    pub raw: RawDecodingSettings,
}

impl DecodeOptions {
    pub fn with_raw(raw: RawDecodingSettings) -> Self {
        Self { raw }
    }
}

/// PNG zlib effort, `0..=9`.
pub const DEFAULT_PNG_COMPRESSION: u8 = 6;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    pub tiff_compression: TiffCompression,
    pub tiff_predictor: Option<u16>,
    pub jpeg_quality: u8,
    pub png_compression: u8,
    /// Overrides the format chosen from the output extension.
    pub format: Option<ImageFormat>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            tiff_compression: TiffCompression::None,
            tiff_predictor: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            png_compression: DEFAULT_PNG_COMPRESSION,
            format: None,
        }
    }
}

impl EncodeOptions {
    pub fn builder() -> EncodeOptionsBuilder {
        EncodeOptionsBuilder::default()
    }

    pub fn tiff_options(&self) -> TiffOptions {
        TiffOptions {
            compression: self.tiff_compression,
            predictor: self.tiff_predictor,
        }
    }
}

#[derive(Default)]
pub struct EncodeOptionsBuilder {
    tiff_compression: Option<TiffCompression>,
    tiff_predictor: Option<Option<u16>>,
    jpeg_quality: Option<u8>,
    png_compression: Option<u8>,
    format: Option<ImageFormat>,
}

impl EncodeOptionsBuilder {
    pub fn tiff_compression(mut self, compression: TiffCompression) -> Self {
        self.tiff_compression = Some(compression);
        self
    }

    pub fn tiff_predictor(mut self, predictor: Option<u16>) -> Self {
        self.tiff_predictor = Some(predictor);
        self
    }

    /// Clamped to `1..=100`.
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = Some(quality.clamp(1, 100));
        self
    }

    /// Clamped to `0..=9`.
    pub fn png_compression(mut self, level: u8) -> Self {
        self.png_compression = Some(level.min(9));
        self
    }

    pub fn format(mut self, format: ImageFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn build(self) -> EncodeOptions {
        let default = EncodeOptions::default();
        EncodeOptions {
            tiff_compression: self.tiff_compression.unwrap_or(default.tiff_compression),
            tiff_predictor: self.tiff_predictor.unwrap_or(default.tiff_predictor),
            jpeg_quality: self.jpeg_quality.unwrap_or(default.jpeg_quality),
            png_compression: self.png_compression.unwrap_or(default.png_compression),
            format: self.format.or(default.format),
        }
    }
}

/// Metadata read without decoding pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub bits_per_channel: u32,
    pub has_alpha: bool,
    pub color_model: String,
}

/// Values of the `originalColorModel` attribute.
pub mod color_model {
    pub const RAW: &str = "RAW";
    pub const GRAY: &str = "GRAY";
    pub const GRAY_ALPHA: &str = "GRAYA";
    pub const RGB: &str = "RGB";
    pub const RGBA: &str = "RGBA";
}
