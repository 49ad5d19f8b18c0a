use tracing::debug;

use crate::image_pipeline::buffer::{AspectMode, PixelBuffer};
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::filter::params::FilterParams;
use crate::image_pipeline::filter::registry::RegisteredFilter;
use crate::image_pipeline::filter::threaded::{FilterContext, ThreadedFilter};

/// Smooth rescale to a target size.
pub struct ResizeFilter {
    width: u32,
    height: u32,
    aspect: AspectMode,
}

impl ResizeFilter {
    pub fn new(width: u32, height: u32, aspect: AspectMode) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidDimensions(width, height));
        }
        Ok(Self { width, height, aspect })
    }

    pub fn target(&self) -> (u32, u32, AspectMode) {
        (self.width, self.height, self.aspect)
    }
}

impl ThreadedFilter for ResizeFilter {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn filter_image(&mut self, src: &PixelBuffer, ctx: &FilterContext<'_>) -> Result<PixelBuffer> {
        debug!(width = self.width, height = self.height, aspect = ?self.aspect, "Resizing");
        src.smooth_scale_with(self.width, self.height, self.aspect, &mut |line, lines| {
            ctx.scanline(line, lines)
        })
    }
}

impl RegisteredFilter for ResizeFilter {
    const ID: &'static str = "resize";
    const NAME: &'static str = "Resize Image";
    const VERSIONS: &'static [u32] = &[1];

    fn from_params(params: &FilterParams) -> Result<Self> {
        let dimension = |key: &str| -> Result<u32> {
            let value = params.int(key, 0)?;
            u32::try_from(value)
                .map_err(|_| PipelineError::InvalidParameters(format!("{} = {}", key, value)))
        };
        let aspect = match params.text("aspect")? {
            None | Some("free") => AspectMode::Free,
            Some("keep") => AspectMode::KeepAspect,
            Some(other) => {
                return Err(PipelineError::InvalidParameters(format!("aspect mode {:?}", other)));
            }
        };
        // Missing dimensions default to 1x1.
        let width = dimension("width")?.max(1);
        let height = dimension("height")?.max(1);
        Self::new(width, height, aspect)
    }
}
