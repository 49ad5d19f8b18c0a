use std::io::{Cursor, Write};

use tiff::encoder::colortype::{RGB8, RGB16, RGBA8, RGBA16};
use tiff::encoder::compression::DeflateLevel;
use tiff::encoder::{Compression, TiffEncoder};
use tiff::tags::Predictor;
use tracing::debug;

use crate::image_pipeline::buffer::{PixelBuffer, PixelSamples};
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::tiff::types::{TiffCompression, TiffOptions};
use crate::image_pipeline::tiff::writer::TiffWriter;

/// TIFF writer backed by the `tiff` crate. Writes RGB or RGBA at the buffer's depth.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardTiffWriter;

/// BGR(A) storage to the RGB(A) order TIFF expects.
fn to_rgb_order<T: Copy>(samples: &[T], channels: usize) -> Vec<T> {
    let mut out = samples.to_vec();
    for px in out.chunks_exact_mut(channels) {
        px.swap(0, 2);
    }
    out
}

fn compression(kind: TiffCompression) -> Compression {
    match kind {
        TiffCompression::None => Compression::Uncompressed,
        TiffCompression::Lzw => Compression::Lzw,
        TiffCompression::DeflateFast => Compression::Deflate(DeflateLevel::Fast),
        TiffCompression::DeflateBalanced => Compression::Deflate(DeflateLevel::Balanced),
        TiffCompression::DeflateBest => Compression::Deflate(DeflateLevel::Best),
    }
}

impl TiffWriter for StandardTiffWriter {
    fn write_tiff(&self, image: &PixelBuffer, output: &mut dyn Write, options: &TiffOptions) -> Result<()> {
        debug!(
            width = image.width(),
            height = image.height(),
            bits = image.depth().bits(),
            alpha = image.has_alpha(),
            "Encoding TIFF image"
        );

        let mut buffer = Vec::new();
        let mut encoder = TiffEncoder::new(Cursor::new(&mut buffer))
            .map_err(|e| PipelineError::EncodeFailed(e.to_string()))?
            .with_compression(compression(options.compression));

        if let Some(predictor_val) = options.predictor {
            let predictor = match predictor_val {
                2 => Predictor::Horizontal,
                _ => Predictor::None,
            };
            encoder = encoder.with_predictor(predictor);
        }

        let (w, h, channels) = (image.width(), image.height(), image.channels());
        let written = match (image.samples(), image.has_alpha()) {
            (PixelSamples::Eight(data), false) => encoder.write_image::<RGB8>(w, h, &to_rgb_order(data, channels)),
            (PixelSamples::Eight(data), true) => encoder.write_image::<RGBA8>(w, h, &to_rgb_order(data, channels)),
            (PixelSamples::Sixteen(data), false) => encoder.write_image::<RGB16>(w, h, &to_rgb_order(data, channels)),
            (PixelSamples::Sixteen(data), true) => encoder.write_image::<RGBA16>(w, h, &to_rgb_order(data, channels)),
        };
        written.map_err(|e| PipelineError::EncodeFailed(e.to_string()))?;

        output.write_all(&buffer)?;

        debug!(bytes = buffer.len(), "TIFF encoding complete");
        Ok(())
    }
}
