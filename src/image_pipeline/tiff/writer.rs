use std::io::Write;

use crate::image_pipeline::buffer::PixelBuffer;
use crate::image_pipeline::common::error::Result;
use crate::image_pipeline::tiff::types::TiffOptions;

/// Sink that stores a [`PixelBuffer`] as TIFF.
pub trait TiffWriter: Send + Sync {
    fn write_tiff(&self, image: &PixelBuffer, output: &mut dyn Write, options: &TiffOptions) -> Result<()>;
}
