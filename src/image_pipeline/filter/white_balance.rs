//! White balance, exposure and saturation.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::image_pipeline::buffer::PixelBuffer;
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::filter::kernel::map_rows;
use crate::image_pipeline::filter::params::FilterParams;
use crate::image_pipeline::filter::registry::RegisteredFilter;
use crate::image_pipeline::filter::threaded::{FilterContext, ThreadedFilter};

/// Colour temperature that leaves channels unscaled.
pub const NEUTRAL_TEMPERATURE: f64 = 6500.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhiteBalanceSettings {
    /// Black point as a fraction of full range.
    pub black: f64,
    /// Exposure compensation in EV.
    pub exposure: f64,
    /// Scene illuminant in kelvin.
    pub temperature: f64,
    /// Green channel multiplier.
    pub green: f64,
    pub gamma: f64,
    pub saturation: f64,
}

impl Default for WhiteBalanceSettings {
    fn default() -> Self {
        Self {
            black: 0.0,
            exposure: 0.0,
            temperature: NEUTRAL_TEMPERATURE,
            green: 1.0,
            gamma: 1.0,
            saturation: 1.0,
        }
    }
}

/// Approximate sRGB colour of a black body at `kelvin`, each channel in 0..=1.
fn blackbody(kelvin: f64) -> [f64; 3] {
    let t = kelvin.clamp(1000.0, 40000.0) / 100.0;
    let red = if t <= 66.0 {
        255.0
    } else {
        329.698727446 * (t - 60.0).powf(-0.1332047592)
    };
    let green = if t <= 66.0 {
        99.4708025861 * t.ln() - 161.1195681661
    } else {
        288.1221695283 * (t - 60.0).powf(-0.0755148492)
    };
    let blue = if t >= 66.0 {
        255.0
    } else if t <= 19.0 {
        0.0
    } else {
        138.5177312231 * (t - 10.0).ln() - 305.0447927307
    };
    [red, green, blue].map(|c| (c / 255.0).clamp(0.001, 1.0))
}

impl WhiteBalanceSettings {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    fn validate(&self) -> Result<()> {
        let ok = (0.0..1.0).contains(&self.black)
            && self.gamma > 0.0
            && self.green > 0.0
            && self.saturation >= 0.0
            && (1000.0..=40000.0).contains(&self.temperature)
            && self.exposure.is_finite();
        if ok {
            Ok(())
        } else {
            Err(PipelineError::InvalidParameters(format!("{:?}", self)))
        }
    }

    /// Red, green, blue gains from temperature, green tint and exposure.
    fn gains(&self) -> [f64; 3] {
        let reference = blackbody(NEUTRAL_TEMPERATURE);
        let scene = blackbody(self.temperature);
        let mut gains = [0.0; 3];
        for c in 0..3 {
            gains[c] = reference[c] / scene[c];
        }
        let g = gains[1];
        let exposure = 2f64.powf(self.exposure);
        [
            gains[0] / g * exposure,
            self.green * exposure,
            gains[2] / g * exposure,
        ]
    }

    /// Per-channel tables in blue, green, red order.
    fn tables(&self, max: f64) -> [Vec<f64>; 3] {
        let gains = self.gains();
        let size = max as usize + 1;
        let black = self.black * max;
        let scale = max / (max - black);
        [2usize, 1, 0].map(|c| {
            (0..size)
                .map(|i| {
                    let v = ((i as f64 - black).max(0.0) * scale * gains[c] / max).min(1.0);
                    v.powf(1.0 / self.gamma) * max
                })
                .collect()
        })
    }
}

/// Moves each channel away from (or toward) Rec. 601 luma.
fn saturate(bgr: [f64; 3], saturation: f64, max: f64) -> [f64; 3] {
    if saturation == 1.0 {
        return bgr;
    }
    let luma = 0.114 * bgr[0] + 0.587 * bgr[1] + 0.299 * bgr[2];
    bgr.map(|c| (luma + (c - luma) * saturation).clamp(0.0, max))
}

pub struct WhiteBalanceFilter {
    settings: WhiteBalanceSettings,
}

impl WhiteBalanceFilter {
    pub fn new(settings: WhiteBalanceSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &WhiteBalanceSettings {
        &self.settings
    }

    fn process8(&self, row: &mut [u8], channels: usize, tables: &[Vec<f64>; 3]) {
        for px in row.chunks_exact_mut(channels) {
            let bgr = [0, 1, 2].map(|c| tables[c][px[c] as usize]);
            let out = saturate(bgr, self.settings.saturation, 255.0);
            for c in 0..3 {
                px[c] = out[c].round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    fn process16(&self, row: &mut [u16], channels: usize, tables: &[Vec<f64>; 3]) {
        for px in row.chunks_exact_mut(channels) {
            let bgr = [0, 1, 2].map(|c| tables[c][px[c] as usize]);
            let out = saturate(bgr, self.settings.saturation, 65535.0);
            for c in 0..3 {
                px[c] = out[c].round().clamp(0.0, 65535.0) as u16;
            }
        }
    }
}

impl ThreadedFilter for WhiteBalanceFilter {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn filter_image(&mut self, src: &PixelBuffer, ctx: &FilterContext<'_>) -> Result<PixelBuffer> {
        debug!(settings = ?self.settings, "Applying white balance");
        let channels = src.channels();
        let max = src.depth().max_value() as f64;
        let tables = self.settings.tables(max);
        let this = &*self;
        map_rows(
            src,
            ctx,
            |row| this.process8(row, channels, &tables),
            |row| this.process16(row, channels, &tables),
        )
    }
}

impl RegisteredFilter for WhiteBalanceFilter {
    const ID: &'static str = "whitebalance";
    const NAME: &'static str = "White Balance Tool";
    const VERSIONS: &'static [u32] = &[1];

    fn from_params(params: &FilterParams) -> Result<Self> {
        let d = WhiteBalanceSettings::default();
        Self::new(WhiteBalanceSettings {
            black: params.float("black", d.black)?,
            exposure: params.float("exposure", d.exposure)?,
            temperature: params.float("temperature", d.temperature)?,
            green: params.float("green", d.green)?,
            gamma: params.float("gamma", d.gamma)?,
            saturation: params.float("saturation", d.saturation)?,
        })
    }
}
