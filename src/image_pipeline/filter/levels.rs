//! Per-channel levels.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::image_pipeline::buffer::{BitDepth, PixelBuffer};
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::filter::curves::MULTIPLIER_16BIT;
use crate::image_pipeline::filter::kernel::map_rows;
use crate::image_pipeline::filter::params::FilterParams;
use crate::image_pipeline::filter::registry::RegisteredFilter;
use crate::image_pipeline::filter::threaded::{FilterContext, ThreadedFilter};
use crate::image_pipeline::raw::LevelsAdjust;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelsChannel {
    pub low_input: i32,
    pub high_input: i32,
    pub low_output: i32,
    pub high_output: i32,
    pub gamma: f64,
}

impl Default for LevelsChannel {
    fn default() -> Self {
        Self {
            low_input: 0,
            high_input: 65535,
            low_output: 0,
            high_output: 65535,
            gamma: 1.0,
        }
    }
}

impl LevelsChannel {
    fn scaled(&self, depth: BitDepth) -> [f64; 4] {
        let values = [self.low_input, self.high_input, self.low_output, self.high_output];
        match depth {
            BitDepth::Sixteen => values.map(|v| v.clamp(0, 65535) as f64),
            BitDepth::Eight => values.map(|v| (v / MULTIPLIER_16BIT).clamp(0, 255) as f64),
        }
    }

    fn table(&self, depth: BitDepth) -> Vec<f64> {
        let max = depth.max_value() as f64;
        let [lo_in, hi_in, lo_out, hi_out] = self.scaled(depth);
        let in_range = (hi_in - lo_in).max(1.0);
        let inv_gamma = 1.0 / self.gamma;
        (0..=depth.max_value() as usize)
            .map(|i| {
                let normalized = ((i as f64 - lo_in) / in_range).clamp(0.0, 1.0);
                (lo_out + normalized.powf(inv_gamma) * (hi_out - lo_out)).clamp(0.0, max)
            })
            .collect()
    }
}

/// Luminosity, red, green and blue levels. Values are in 16-bit form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelsSettings {
    pub channels: [LevelsChannel; 4],
}

impl From<&LevelsAdjust> for LevelsSettings {
    fn from(adjust: &LevelsAdjust) -> Self {
        let mut settings = LevelsSettings::default();
        for (dst, src) in settings.channels.iter_mut().zip(adjust.channels.iter()) {
            *dst = LevelsChannel {
                low_input: src.low_input,
                high_input: src.high_input,
                low_output: src.low_output,
                high_output: src.high_output,
                gamma: 1.0,
            };
        }
        settings
    }
}

impl LevelsSettings {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// Channel curve followed by the luminosity curve, blue, green, red order.
    fn composed(&self, depth: BitDepth) -> [Vec<f64>; 3] {
        let lum = self.channels[0].table(depth);
        [3usize, 2, 1].map(|c| {
            self.channels[c]
                .table(depth)
                .into_iter()
                .map(|v| lum[v.round() as usize])
                .collect()
        })
    }

    pub fn lut8(&self) -> [Vec<u8>; 3] {
        self.composed(BitDepth::Eight)
            .map(|t| t.into_iter().map(|v| v.round() as u8).collect())
    }

    pub fn lut16(&self) -> [Vec<u16>; 3] {
        self.composed(BitDepth::Sixteen)
            .map(|t| t.into_iter().map(|v| v.round() as u16).collect())
    }
}

pub struct LevelsFilter {
    settings: LevelsSettings,
}

impl LevelsFilter {
    pub fn new(settings: LevelsSettings) -> Result<Self> {
        for channel in &settings.channels {
            if channel.high_input < channel.low_input || !(channel.gamma > 0.0) {
                return Err(PipelineError::InvalidParameters(format!("{:?}", channel)));
            }
        }
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &LevelsSettings {
        &self.settings
    }
}

impl ThreadedFilter for LevelsFilter {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn filter_image(&mut self, src: &PixelBuffer, ctx: &FilterContext<'_>) -> Result<PixelBuffer> {
        debug!(settings = ?self.settings, "Applying levels");
        let channels = src.channels();
        let (lut8, lut16): ([Vec<u8>; 3], [Vec<u16>; 3]) = if src.is_sixteen_bit() {
            (Default::default(), self.settings.lut16())
        } else {
            (self.settings.lut8(), Default::default())
        };
        map_rows(
            src,
            ctx,
            |row| {
                for px in row.chunks_exact_mut(channels) {
                    for c in 0..3 {
                        px[c] = lut8[c][px[c] as usize];
                    }
                }
            },
            |row| {
                for px in row.chunks_exact_mut(channels) {
                    for c in 0..3 {
                        px[c] = lut16[c][px[c] as usize];
                    }
                }
            },
        )
    }
}

impl RegisteredFilter for LevelsFilter {
    const ID: &'static str = "levels";
    const NAME: &'static str = "Adjust Levels";
    const VERSIONS: &'static [u32] = &[1];

    /// `values`: 16 numbers, low-in, high-in, low-out, high-out for luminosity,
    /// red, green and blue. `gamma`: optional 4 numbers in the same channel order.
    fn from_params(params: &FilterParams) -> Result<Self> {
        let values = params.list("values")?;
        let gammas = params.list("gamma")?;
        let mut settings = LevelsSettings::default();
        if !values.is_empty() {
            let flat: Vec<i32> = values.iter().map(|&v| v.round() as i32).collect();
            let adjust = LevelsAdjust::from_flat(&flat).ok_or_else(|| {
                PipelineError::InvalidParameters("levels need 16 values".to_string())
            })?;
            settings = LevelsSettings::from(&adjust);
        }
        match gammas.len() {
            0 => {}
            4 => {
                for (channel, gamma) in settings.channels.iter_mut().zip(gammas) {
                    channel.gamma = gamma;
                }
            }
            _ => return Err(PipelineError::InvalidParameters("levels need 4 gamma values".to_string())),
        }
        Self::new(settings)
    }
}
