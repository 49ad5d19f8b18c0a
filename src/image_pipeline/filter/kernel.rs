//! Row-wise sample mapping shared by the colour filters.

use crate::image_pipeline::buffer::{PixelBuffer, PixelSamples};
use crate::image_pipeline::common::error::Result;
use crate::image_pipeline::filter::threaded::FilterContext;

/// Deep-copies `src` and runs the depth-specific closure over every row of
/// the copy, polling cancellation once per row.
///
/// Rows are interleaved BGR(A); the closures walk pixels themselves.
pub(crate) fn map_rows<F8, F16>(
    src: &PixelBuffer,
    ctx: &FilterContext<'_>,
    mut eight: F8,
    mut sixteen: F16,
) -> Result<PixelBuffer>
where
    F8: FnMut(&mut [u8]),
    F16: FnMut(&mut [u16]),
{
    let mut dest = src.copy()?;
    let rows = dest.height();
    let row_len = dest.row_len();
    match dest.samples_mut() {
        PixelSamples::Eight(data) => {
            for (y, row) in data.chunks_exact_mut(row_len).enumerate() {
                ctx.scanline(y as u32, rows)?;
                eight(row);
            }
        }
        PixelSamples::Sixteen(data) => {
            for (y, row) in data.chunks_exact_mut(row_len).enumerate() {
                ctx.scanline(y as u32, rows)?;
                sixteen(row);
            }
        }
    }
    Ok(dest)
}

/// Applies one lookup table to the blue, green and red samples of a row.
pub(crate) fn apply_lut<T: Copy + Into<usize>>(row: &mut [T], channels: usize, lut: &[T]) {
    for px in row.chunks_exact_mut(channels) {
        for sample in &mut px[..3] {
            *sample = lut[(*sample).into()];
        }
    }
}
