//! TOML configuration for the command-line converter.
//!
//! ```toml
//! [decoding]
//! sixteen_bits_image = true
//! output_color_space = "adobe-rgb"
//! exposure_comp = 0.5
//!
//! [encoding]
//! tiff_compression = "deflate-balanced"
//! tiff_predictor = 2
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::image_pipeline::conversions::ConversionConfig;
use crate::image_pipeline::loader::types::{DEFAULT_JPEG_QUALITY, DEFAULT_PNG_COMPRESSION};
use crate::image_pipeline::loader::{DecodeOptions, EncodeOptions};
use crate::image_pipeline::raw::RawDecodingSettings;
use crate::image_pipeline::tiff::TiffCompression;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodingConfig {
    pub tiff_compression: TiffCompression,
    pub tiff_predictor: Option<u16>,
    pub jpeg_quality: u8,
    pub png_compression: u8,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            tiff_compression: TiffCompression::None,
            tiff_predictor: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            png_compression: DEFAULT_PNG_COMPRESSION,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub decoding: RawDecodingSettings,
    pub encoding: EncodingConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let encoding = &self.encoding;
        if !(1..=100).contains(&encoding.jpeg_quality) {
            return Err(ConfigError::Invalid(format!("jpeg_quality = {}", encoding.jpeg_quality)));
        }
        if encoding.png_compression > 9 {
            return Err(ConfigError::Invalid(format!("png_compression = {}", encoding.png_compression)));
        }
        if let Some(predictor) = encoding.tiff_predictor {
            if predictor != 1 && predictor != 2 {
                return Err(ConfigError::Invalid(format!("tiff_predictor = {}", predictor)));
            }
        }
        let decoding = &self.decoding;
        if !(decoding.gamma > 0.0) || !(decoding.contrast >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "gamma = {}, contrast = {}",
                decoding.gamma, decoding.contrast
            )));
        }
        Ok(())
    }

    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions::builder()
            .tiff_compression(self.encoding.tiff_compression)
            .tiff_predictor(self.encoding.tiff_predictor)
            .jpeg_quality(self.encoding.jpeg_quality)
            .png_compression(self.encoding.png_compression)
            .build()
    }

    pub fn conversion_config(&self) -> ConversionConfig {
        ConversionConfig {
            decode: DecodeOptions::with_raw(self.decoding.clone()),
            encode: self.encode_options(),
            ..ConversionConfig::default()
        }
    }
}
