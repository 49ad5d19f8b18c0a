//! Brightness / contrast / gamma through per-depth lookup tables.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::image_pipeline::buffer::PixelBuffer;
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::filter::kernel::{apply_lut, map_rows};
use crate::image_pipeline::filter::params::FilterParams;
use crate::image_pipeline::filter::registry::RegisteredFilter;
use crate::image_pipeline::filter::threaded::{FilterContext, ThreadedFilter};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BcgSettings {
    /// Offset as a fraction of full range, -1..=1.
    pub brightness: f64,
    pub contrast: f64,
    pub gamma: f64,
}

impl Default for BcgSettings {
    fn default() -> Self {
        Self {
            brightness: 0.0,
            contrast: 1.0,
            gamma: 1.0,
        }
    }
}

impl BcgSettings {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    fn validate(&self) -> Result<()> {
        if !(self.gamma > 0.0) || !(self.contrast >= 0.0) || !(-1.0..=1.0).contains(&self.brightness) {
            return Err(PipelineError::InvalidParameters(format!("{:?}", self)));
        }
        Ok(())
    }

    /// Gamma first, then brightness, then contrast around mid-range.
    fn map(&self, value: f64, max: f64) -> f64 {
        let half = (max + 1.0) / 2.0;
        let mut v = ((value / max).powf(1.0 / self.gamma) * max).round().clamp(0.0, max);
        v = (v + (self.brightness * max).round()).clamp(0.0, max);
        ((v - half) * self.contrast + half).round().clamp(0.0, max)
    }

    pub fn lut8(&self) -> Vec<u8> {
        (0..=255u16).map(|i| self.map(i as f64, 255.0) as u8).collect()
    }

    pub fn lut16(&self) -> Vec<u16> {
        (0..=65535u32).map(|i| self.map(i as f64, 65535.0) as u16).collect()
    }
}

pub struct BcgFilter {
    settings: BcgSettings,
}

impl BcgFilter {
    pub fn new(settings: BcgSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &BcgSettings {
        &self.settings
    }
}

impl ThreadedFilter for BcgFilter {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn filter_image(&mut self, src: &PixelBuffer, ctx: &FilterContext<'_>) -> Result<PixelBuffer> {
        debug!(settings = ?self.settings, "Applying BCG");
        let channels = src.channels();
        let settings = self.settings;
        let mut lut8 = Vec::new();
        let mut lut16 = Vec::new();
        if src.is_sixteen_bit() {
            lut16 = settings.lut16();
        } else {
            lut8 = settings.lut8();
        }
        map_rows(
            src,
            ctx,
            |row| apply_lut(row, channels, &lut8),
            |row| apply_lut(row, channels, &lut16),
        )
    }
}

impl RegisteredFilter for BcgFilter {
    const ID: &'static str = "bcg";
    const NAME: &'static str = "Brightness / Contrast / Gamma Filter";
    const VERSIONS: &'static [u32] = &[1];

    fn from_params(params: &FilterParams) -> Result<Self> {
        let defaults = BcgSettings::default();
        Self::new(BcgSettings {
            brightness: params.float("brightness", defaults.brightness)?,
            contrast: params.float("contrast", defaults.contrast)?,
            gamma: params.float("gamma", defaults.gamma)?,
        })
    }
}
