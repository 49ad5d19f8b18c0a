use std::io::{Read, Seek};

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::{ColorType, TiffError};
use tracing::debug;

use crate::image_pipeline::buffer::{PixelBuffer, PixelSamples, try_alloc};
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::common::observer::{ProgressReporter, ScanlineProgress};

/// Dimensions, channel layout and depth of the first TIFF directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub width: u32,
    pub height: u32,
    pub source_channels: usize,
    pub has_alpha: bool,
    pub bits: u8,
}

fn header(color: ColorType, width: u32, height: u32) -> Result<TiffHeader> {
    let (source_channels, has_alpha, bits) = match color {
        ColorType::Gray(bits) => (1, false, bits),
        ColorType::GrayA(bits) => (2, true, bits),
        ColorType::RGB(bits) => (3, false, bits),
        ColorType::RGBA(bits) => (4, true, bits),
        other => {
            return Err(PipelineError::UnsupportedFormat(format!("TIFF colour type {:?}", other)));
        }
    };
    if bits != 8 && bits != 16 {
        return Err(PipelineError::UnsupportedFormat(format!("{}-bit TIFF samples", bits)));
    }
    Ok(TiffHeader {
        width,
        height,
        source_channels,
        has_alpha,
        bits,
    })
}

impl TiffHeader {
    /// Bytes the decoded strips occupy, or `None` when that overflows.
    pub fn decoded_size(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.source_channels)?
            .checked_mul(usize::from(self.bits / 8))
    }
}

fn decoder<R: Read + Seek>(input: R) -> Result<Decoder<R>> {
    Decoder::new(input).map_err(|e| PipelineError::DecodeFailed(e.to_string()))
}

/// Makes sure the buffer the header asks for can exist before the decoder
/// allocates it, and caps the decoder at exactly that size.
fn reserve_for<R: Read + Seek>(decoder: Decoder<R>, header: &TiffHeader) -> Result<Decoder<R>> {
    let size = header.decoded_size().ok_or(PipelineError::OutOfMemory(usize::MAX))?;
    Vec::<u8>::new()
        .try_reserve_exact(size)
        .map_err(|_| PipelineError::OutOfMemory(size))?;
    let mut limits = Limits::default();
    limits.decoding_buffer_size = limits.decoding_buffer_size.max(size);
    limits.intermediate_buffer_size = limits.intermediate_buffer_size.max(size);
    Ok(decoder.with_limits(limits))
}

fn read_failed(error: TiffError, header: &TiffHeader) -> PipelineError {
    match error {
        TiffError::LimitsExceeded => PipelineError::OutOfMemory(header.decoded_size().unwrap_or(usize::MAX)),
        other => PipelineError::DecodeFailed(other.to_string()),
    }
}

/// Reads only the directory entries needed for dimensions and layout.
pub fn read_tiff_header<R: Read + Seek>(input: R) -> Result<TiffHeader> {
    let mut decoder = decoder(input)?;
    let (width, height) = decoder
        .dimensions()
        .map_err(|e| PipelineError::DecodeFailed(e.to_string()))?;
    let color = decoder
        .colortype()
        .map_err(|e| PipelineError::DecodeFailed(e.to_string()))?;
    header(color, width, height)
}

/// Expands one source pixel (gray, gray+alpha, RGB or RGBA) into BGR(A).
fn expand<T: Copy>(src: &[T], dst: &mut [T]) {
    match (src.len(), dst.len()) {
        (1, 3) => dst.fill(src[0]),
        (2, 4) => {
            dst[..3].fill(src[0]);
            dst[3] = src[1];
        }
        _ => {
            dst[0] = src[2];
            dst[1] = src[1];
            dst[2] = src[0];
            if dst.len() == 4 {
                dst[3] = src[3];
            }
        }
    }
}

fn convert_rows<T: Copy + Default>(
    data: &[T],
    header: &TiffHeader,
    scan: &mut ScanlineProgress<'_, '_>,
) -> Result<Vec<T>> {
    let channels = if header.has_alpha { 4 } else { 3 };
    let width = header.width as usize;
    let mut out = try_alloc::<T>(width * header.height as usize * channels)?;
    let src_row = width * header.source_channels;
    for (y, (src, dst)) in data
        .chunks_exact(src_row)
        .zip(out.chunks_exact_mut(width * channels))
        .enumerate()
    {
        scan.row(y as u32)?;
        for (s, d) in src
            .chunks_exact(header.source_channels)
            .zip(dst.chunks_exact_mut(channels))
        {
            expand(s, d);
        }
    }
    Ok(out)
}

/// Decodes the first image of a TIFF file into a BGR(A) buffer.
///
/// Strip decoding is one opaque call covering the first half of progress;
/// channel conversion reports per scanline over the second half.
pub fn read_tiff<R: Read + Seek>(input: R, progress: &mut ProgressReporter<'_>) -> Result<(PixelBuffer, TiffHeader)> {
    let mut decoder = decoder(input)?;
    let (width, height) = decoder
        .dimensions()
        .map_err(|e| PipelineError::DecodeFailed(e.to_string()))?;
    let color = decoder
        .colortype()
        .map_err(|e| PipelineError::DecodeFailed(e.to_string()))?;
    let header = header(color, width, height)?;
    debug!(?header, "Decoding TIFF");

    progress.check()?;
    let mut decoder = reserve_for(decoder, &header)?;
    let decoded = decoder.read_image().map_err(|e| read_failed(e, &header))?;
    progress.report(0.5);

    let expected = width as usize * height as usize * header.source_channels;
    let mut scan = ScanlineProgress::new(progress, height, 0.5, 1.0);
    let samples = match decoded {
        DecodingResult::U8(data) if data.len() >= expected => {
            PixelSamples::Eight(convert_rows(&data, &header, &mut scan)?)
        }
        DecodingResult::U16(data) if data.len() >= expected => {
            PixelSamples::Sixteen(convert_rows(&data, &header, &mut scan)?)
        }
        _ => {
            return Err(PipelineError::DecodeFailed(
                "TIFF sample data does not match its header".to_string(),
            ));
        }
    };
    scan.finish();

    let buffer = PixelBuffer::from_samples(width, height, header.has_alpha, samples)?;
    Ok((buffer, header))
}
