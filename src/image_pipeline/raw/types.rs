//! RAW image data types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::image_pipeline::buffer::BitDepth;

/// Undemosaiced sensor data as read from the RAW container.
#[derive(Debug, Clone)]
pub struct RawImageData {
    /// Width of the image in pixels
    pub width: usize,
    /// Height of the image in pixels
    pub height: usize,
    /// Raw pixel data (single channel Bayer pattern)
    pub data: Vec<u16>,
    /// Actual bits per sample from the sensor (e.g., 12, 14, or 16)
    pub bits_per_sample: u32,
    /// Camera white-balance multipliers (R, G, B, G2)
    pub wb_coeffs: [f32; 4],
    pub blacklevels: [u16; 4],
    pub whitelevels: [u16; 4],
    /// Colour filter array layout, e.g. "RGGB"
    pub cfa: String,
    /// Components per pixel: 1 for mosaiced sensors, 3 for linear RGB data
    pub cpp: usize,
    /// Camera to XYZ matrix, all zero when the camera is unknown
    pub cam_to_xyz: [[f32; 4]; 3],
}

/// Interleaved RGB samples handed back by a [`RawDecoder`](super::RawDecoder).
#[derive(Debug, Clone, PartialEq)]
pub enum RawSamples {
    Eight(Vec<u8>),
    Sixteen(Vec<u16>),
}

impl RawSamples {
    pub fn len(&self) -> usize {
        match self {
            RawSamples::Eight(data) => data.len(),
            RawSamples::Sixteen(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Demosaiced output of the external decoder.
#[derive(Debug, Clone)]
pub struct DecodedRaw {
    pub width: u32,
    pub height: u32,
    /// R, G, B interleaved
    pub samples: RawSamples,
    /// Largest value a sample can take in `samples`
    pub rgbmax: u32,
}

/// Metadata-only identification result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawInfo {
    pub width: u32,
    pub height: u32,
    pub make: String,
    pub model: String,
    pub bits_per_sample: u32,
}

/// Requested output colour space for RAW decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputColorSpace {
    /// Camera colour, no profile assigned.
    Raw,
    #[default]
    Srgb,
    AdobeRgb,
    WideGamut,
    ProPhoto,
    /// Profile given by `RawDecodingSettings::output_profile`.
    Custom,
}

/// One channel of a levels adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelLevels {
    pub low_input: i32,
    pub high_input: i32,
    pub low_output: i32,
    pub high_output: i32,
}

impl ChannelLevels {
    pub fn identity(depth: BitDepth) -> Self {
        let max = depth.max_value() as i32;
        Self {
            low_input: 0,
            high_input: max,
            low_output: 0,
            high_output: max,
        }
    }
}

/// Levels for luminosity, red, green and blue, in that order.
///
/// Values are stored in 16-bit form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelsAdjust {
    pub channels: [ChannelLevels; 4],
}

impl LevelsAdjust {
    /// Builds the adjustment from the flat 16-value list
    /// (low-in, high-in, low-out, high-out per channel).
    pub fn from_flat(values: &[i32]) -> Option<Self> {
        if values.len() != 16 {
            return None;
        }
        let mut channels = [ChannelLevels::identity(BitDepth::Sixteen); 4];
        for (channel, chunk) in channels.iter_mut().zip(values.chunks_exact(4)) {
            *channel = ChannelLevels {
                low_input: chunk[0],
                high_input: chunk[1],
                low_output: chunk[2],
                high_output: chunk[3],
            };
        }
        Some(Self { channels })
    }

    pub fn to_flat(&self) -> Vec<i32> {
        self.channels
            .iter()
            .flat_map(|c| [c.low_input, c.high_input, c.low_output, c.high_output])
            .collect()
    }
}

/// Decoder knobs plus the post-processing applied after decode.
///
/// `curve_adjust` and `levels_adjust` are always expressed on the 16-bit
/// scale (`0..=65535`), whatever `sixteen_bits_image` says. They are scaled
/// down when an 8-bit image is produced, so callers working in 8-bit must
/// convert their `0..=255` values first (see `points_from_eight_bit`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDecodingSettings {
    pub sixteen_bits_image: bool,
    pub output_color_space: OutputColorSpace,
    pub output_profile: Option<PathBuf>,

    pub lightness: f64,
    pub contrast: f64,
    pub gamma: f64,
    pub saturation: f64,
    /// Exposure compensation in EV.
    pub exposure_comp: f64,
    /// Luminosity tone curve control points on the 16-bit scale.
    pub curve_adjust: Vec<(i32, i32)>,
    /// Levels on the 16-bit scale.
    pub levels_adjust: Option<LevelsAdjust>,
}

impl Default for RawDecodingSettings {
    fn default() -> Self {
        Self {
            sixteen_bits_image: false,
            output_color_space: OutputColorSpace::Srgb,
            output_profile: None,
            lightness: 0.0,
            contrast: 1.0,
            gamma: 1.0,
            saturation: 1.0,
            exposure_comp: 0.0,
            curve_adjust: Vec::new(),
            levels_adjust: None,
        }
    }
}

impl RawDecodingSettings {
    pub fn depth(&self) -> BitDepth {
        if self.sixteen_bits_image {
            BitDepth::Sixteen
        } else {
            BitDepth::Eight
        }
    }

    /// Puts every post-processing knob back to its no-op value.
    pub fn reset_post_processing(&mut self) {
        let defaults = RawDecodingSettings::default();
        self.lightness = defaults.lightness;
        self.contrast = defaults.contrast;
        self.gamma = defaults.gamma;
        self.saturation = defaults.saturation;
        self.exposure_comp = defaults.exposure_comp;
        self.curve_adjust.clear();
        self.levels_adjust = None;
    }

    pub fn white_balance_dirty(&self) -> bool {
        self.exposure_comp != 0.0 || self.saturation != 1.0
    }

    pub fn bcg_dirty(&self) -> bool {
        self.lightness != 0.0 || self.contrast != 1.0 || self.gamma != 1.0
    }

    pub fn curve_dirty(&self) -> bool {
        !self.curve_adjust.is_empty()
    }

    pub fn levels_dirty(&self) -> bool {
        self.levels_adjust.is_some()
    }

    /// Whether any post-processing stage has work to do.
    pub fn post_processing_dirty(&self) -> bool {
        self.white_balance_dirty() || self.bcg_dirty() || self.curve_dirty() || self.levels_dirty()
    }

    /// Short human-readable summary stored as a buffer attribute.
    pub fn summary(&self) -> String {
        format!(
            "{}-bit {:?} lightness={} contrast={} gamma={} saturation={} exposure={} curve={} levels={}",
            self.depth().bits(),
            self.output_color_space,
            self.lightness,
            self.contrast,
            self.gamma,
            self.saturation,
            self.exposure_comp,
            self.curve_adjust.len(),
            self.levels_adjust.is_some()
        )
    }
}
