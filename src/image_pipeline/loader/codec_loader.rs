//! JPEG, PNG and other common encodings through the `image` crate.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage, ExtendedColorType, ImageDecoder, ImageEncoder, ImageReader};
use tracing::{debug, info, instrument, warn};

use crate::image_pipeline::buffer::{BitDepth, PixelBuffer, PixelSamples, try_alloc};
use crate::image_pipeline::color::ColorProfile;
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::common::observer::{LoaderObserver, ProgressReporter, ScanlineProgress};
use crate::image_pipeline::loader::image_loader::{ImageLoader, write_atomically};
use crate::image_pipeline::loader::types::{DecodeOptions, EncodeOptions, ImageFormat, ImageInfo, color_model};

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Loader for one of the `image` crate's codecs.
///
/// The fallback variant accepts anything whose content the crate can
/// identify, regardless of extension, and never encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecLoader {
    format: ImageFormat,
    fallback: bool,
}

impl CodecLoader {
    pub fn jpeg() -> Self {
        Self {
            format: ImageFormat::Jpeg,
            fallback: false,
        }
    }

    pub fn png() -> Self {
        Self {
            format: ImageFormat::Png,
            fallback: false,
        }
    }

    /// GIF, BMP and WebP.
    pub fn generic() -> Self {
        Self {
            format: ImageFormat::Other,
            fallback: false,
        }
    }

    pub fn fallback() -> Self {
        Self {
            format: ImageFormat::Other,
            fallback: true,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }
}

fn open_decoder(path: &Path) -> Result<impl ImageDecoder> {
    ImageReader::open(path)
        .map_err(|e| PipelineError::InputReadError(format!("{}: {}", path.display(), e)))?
        .with_guessed_format()?
        .into_decoder()
        .map_err(|e| PipelineError::DecodeFailed(e.to_string()))
}

fn model_of(color: ColorType) -> &'static str {
    match color {
        ColorType::L8 | ColorType::L16 => color_model::GRAY,
        ColorType::La8 | ColorType::La16 => color_model::GRAY_ALPHA,
        color if color.has_alpha() => color_model::RGBA,
        _ => color_model::RGB,
    }
}

fn original_bits(decoder: &impl ImageDecoder) -> u32 {
    let original = decoder.original_color_type();
    original.bits_per_pixel() as u32 / (original.channel_count().max(1) as u32)
}

/// RGB(A) rows into BGR(A) storage.
fn swap_rows<T: Copy + Clone + Default>(
    rgb: &[T],
    channels: usize,
    width: u32,
    scan: &mut ScanlineProgress<'_, '_>,
) -> Result<Vec<T>> {
    let row_len = width as usize * channels;
    let mut out = try_alloc::<T>(rgb.len())?;
    for (y, (dst, src)) in out.chunks_exact_mut(row_len).zip(rgb.chunks_exact(row_len)).enumerate() {
        scan.row(y as u32)?;
        dst.copy_from_slice(src);
        for px in dst.chunks_exact_mut(channels) {
            px.swap(0, 2);
        }
    }
    Ok(out)
}

fn to_buffer(image: DynamicImage, scan: &mut ScanlineProgress<'_, '_>) -> Result<PixelBuffer> {
    let color = image.color();
    let has_alpha = color.has_alpha();
    let sixteen = color.bytes_per_pixel() / color.channel_count() > 1;
    let (width, height) = (image.width(), image.height());
    let samples = match (sixteen, has_alpha) {
        (false, false) => PixelSamples::Eight(swap_rows(image.into_rgb8().as_raw(), 3, width, scan)?),
        (false, true) => PixelSamples::Eight(swap_rows(image.into_rgba8().as_raw(), 4, width, scan)?),
        (true, false) => PixelSamples::Sixteen(swap_rows(image.into_rgb16().as_raw(), 3, width, scan)?),
        (true, true) => PixelSamples::Sixteen(swap_rows(image.into_rgba16().as_raw(), 4, width, scan)?),
    };
    PixelBuffer::from_samples(width, height, has_alpha, samples)
}

/// Samples in RGB(A) order at `depth`, as bytes in native endianness.
fn interleaved(buffer: &PixelBuffer, depth: BitDepth, keep_alpha: bool) -> Result<(Vec<u8>, ExtendedColorType)> {
    let converted;
    let source = if buffer.depth() == depth {
        buffer
    } else {
        converted = buffer.convert_depth(depth)?;
        &converted
    };
    let channels = source.channels();
    let out_channels = if keep_alpha && source.has_alpha() { 4 } else { 3 };

    fn reorder<T: Copy>(samples: &[T], channels: usize, out_channels: usize) -> Vec<T> {
        let mut out = Vec::with_capacity(samples.len() / channels * out_channels);
        for px in samples.chunks_exact(channels) {
            out.extend_from_slice(&[px[2], px[1], px[0]]);
            if out_channels == 4 {
                out.push(px[3]);
            }
        }
        out
    }

    Ok(match source.samples() {
        PixelSamples::Eight(data) => {
            let color = if out_channels == 4 { ExtendedColorType::Rgba8 } else { ExtendedColorType::Rgb8 };
            (reorder(data, channels, out_channels), color)
        }
        PixelSamples::Sixteen(data) => {
            let color = if out_channels == 4 { ExtendedColorType::Rgba16 } else { ExtendedColorType::Rgb16 };
            let samples = reorder(data, channels, out_channels);
            (bytemuck::cast_slice::<u16, u8>(&samples).to_vec(), color)
        }
    })
}

/// ICC bytes for the encoder. Built-in profiles have no bytes at hand.
fn icc_bytes(buffer: &PixelBuffer) -> Option<Vec<u8>> {
    match buffer.icc_profile()? {
        ColorProfile::Embedded(bytes) => Some(bytes.clone()),
        ColorProfile::File(path) => match std::fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read ICC profile, saving without it");
                None
            }
        },
        other => {
            debug!(profile = %other.description(), "No ICC data to embed for built-in profile");
            None
        }
    }
}

fn attach_icc(encoder: &mut impl ImageEncoder, buffer: &PixelBuffer) {
    if let Some(icc) = icc_bytes(buffer) {
        if let Err(e) = encoder.set_icc_profile(icc) {
            warn!(error = %e, "Encoder cannot embed an ICC profile");
        }
    }
}

fn png_compression(level: u8) -> CompressionType {
    match level {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

fn encode_error(e: image::ImageError) -> PipelineError {
    PipelineError::EncodeFailed(e.to_string())
}

impl CodecLoader {
    fn write_jpeg(&self, buffer: &PixelBuffer, writer: &mut dyn Write, quality: u8) -> Result<()> {
        if buffer.is_sixteen_bit() {
            warn!("JPEG is 8-bit only, reducing colour depth");
        }
        if buffer.has_alpha() {
            warn!("JPEG has no alpha channel, dropping it");
        }
        let (bytes, color) = interleaved(buffer, BitDepth::Eight, false)?;
        let mut encoder = JpegEncoder::new_with_quality(writer, quality);
        attach_icc(&mut encoder, buffer);
        encoder
            .write_image(&bytes, buffer.width(), buffer.height(), color)
            .map_err(encode_error)
    }

    fn write_png(&self, buffer: &PixelBuffer, writer: &mut dyn Write, level: u8) -> Result<()> {
        let (bytes, color) = interleaved(buffer, buffer.depth(), true)?;
        let mut encoder = PngEncoder::new_with_quality(writer, png_compression(level), FilterType::Adaptive);
        attach_icc(&mut encoder, buffer);
        encoder
            .write_image(&bytes, buffer.width(), buffer.height(), color)
            .map_err(encode_error)
    }

    fn write_generic(&self, buffer: &PixelBuffer, path: &Path, writer: &mut BufWriter<&mut File>) -> Result<()> {
        let format = image::ImageFormat::from_path(path)
            .map_err(|_| PipelineError::UnsupportedFormat(path.display().to_string()))?;
        if buffer.is_sixteen_bit() {
            warn!(?format, "Format is 8-bit only, reducing colour depth");
        }
        let (bytes, color) = interleaved(buffer, BitDepth::Eight, true)?;
        let (width, height) = (buffer.width(), buffer.height());
        let image = match color {
            ExtendedColorType::Rgba8 => image::RgbaImage::from_raw(width, height, bytes).map(DynamicImage::ImageRgba8),
            _ => image::RgbImage::from_raw(width, height, bytes).map(DynamicImage::ImageRgb8),
        }
        .ok_or_else(|| PipelineError::EncodeFailed("sample count does not match dimensions".to_string()))?;
        image.write_to(writer, format).map_err(encode_error)
    }
}

impl ImageLoader for CodecLoader {
    fn format(&self) -> ImageFormat {
        self.format
    }

    fn extensions(&self) -> &'static [&'static str] {
        match (self.format, self.fallback) {
            (_, true) => &[],
            (ImageFormat::Jpeg, _) => &["jpg", "jpeg", "jpe"],
            (ImageFormat::Png, _) => &["png"],
            _ => &["gif", "bmp", "webp"],
        }
    }

    fn matches_signature(&self, header: &[u8]) -> bool {
        match self.format {
            ImageFormat::Jpeg => header.starts_with(&JPEG_MAGIC),
            ImageFormat::Png => header.starts_with(&PNG_MAGIC),
            _ => matches!(
                image::guess_format(header),
                Ok(image::ImageFormat::Gif | image::ImageFormat::Bmp | image::ImageFormat::WebP)
            ) || (self.fallback && image::guess_format(header).is_ok()),
        }
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    fn identify(&self, path: &Path) -> Result<ImageInfo> {
        let decoder = open_decoder(path)?;
        let (width, height) = decoder.dimensions();
        let color = decoder.color_type();
        Ok(ImageInfo {
            format: self.format,
            width,
            height,
            bits_per_channel: original_bits(&decoder),
            has_alpha: color.has_alpha(),
            color_model: model_of(color).to_string(),
        })
    }

    #[instrument(skip_all, fields(path = %path.display(), format = self.format.name()))]
    fn decode(
        &self,
        path: &Path,
        _options: &DecodeOptions,
        observer: Option<&dyn LoaderObserver>,
    ) -> Result<PixelBuffer> {
        let mut progress = ProgressReporter::new(observer);
        progress.check()?;

        let mut decoder = open_decoder(path)?;
        let color = decoder.color_type();
        let bits = original_bits(&decoder);
        let icc = match decoder.icc_profile() {
            Ok(icc) => icc,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable embedded ICC profile");
                None
            }
        };
        let image = DynamicImage::from_decoder(decoder).map_err(|e| PipelineError::DecodeFailed(e.to_string()))?;
        progress.check()?;
        progress.report(0.5);

        let height = image.height();
        let mut scan = ScanlineProgress::new(&mut progress, height, 0.5, 1.0);
        let mut buffer = to_buffer(image, &mut scan)?;
        scan.finish();

        if let Some(icc) = icc {
            debug!(bytes = icc.len(), "Embedded ICC profile");
            buffer.set_icc_profile(Some(ColorProfile::Embedded(icc)));
        }
        buffer.set_attribute("format", self.format.name());
        buffer.set_attribute("originalColorModel", model_of(color));
        buffer.set_attribute("originalBitDepth", bits);
        info!(width = buffer.width(), height = buffer.height(), bits, "Decoded image");
        Ok(buffer)
    }

    #[instrument(skip_all, fields(path = %path.display(), format = self.format.name()))]
    fn encode(&self, buffer: &PixelBuffer, path: &Path, options: &EncodeOptions) -> Result<()> {
        if self.fallback {
            return Err(PipelineError::ReadOnly("fallback"));
        }
        write_atomically(path, |writer| match self.format {
            ImageFormat::Jpeg => self.write_jpeg(buffer, writer, options.jpeg_quality),
            ImageFormat::Png => self.write_png(buffer, writer, options.png_compression),
            _ => self.write_generic(buffer, path, writer),
        })?;
        info!(width = buffer.width(), height = buffer.height(), "Encoded image");
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.fallback
    }
}
