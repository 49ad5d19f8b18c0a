use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::{info, instrument};

use crate::image_pipeline::buffer::PixelBuffer;
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::common::observer::{LoaderObserver, ProgressReporter};
use crate::image_pipeline::loader::image_loader::{ImageLoader, write_atomically};
use crate::image_pipeline::loader::types::{DecodeOptions, EncodeOptions, ImageFormat, ImageInfo, color_model};
use crate::image_pipeline::tiff::{StandardTiffWriter, TiffHeader, TiffWriter, read_tiff, read_tiff_header};

const TIFF_LE_MAGIC: [u8; 4] = [b'I', b'I', 0x2A, 0x00];
const TIFF_BE_MAGIC: [u8; 4] = [b'M', b'M', 0x00, 0x2A];

pub struct TiffLoader<W: TiffWriter = StandardTiffWriter> {
    writer: W,
}

impl TiffLoader<StandardTiffWriter> {
    pub fn new() -> Self {
        Self::with_custom(StandardTiffWriter)
    }
}

impl Default for TiffLoader<StandardTiffWriter> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: TiffWriter> TiffLoader<W> {
    pub fn with_custom(writer: W) -> Self {
        Self { writer }
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path)
        .map_err(|e| PipelineError::InputReadError(format!("{}: {}", path.display(), e)))?;
    Ok(BufReader::new(file))
}

fn model_of(header: &TiffHeader) -> &'static str {
    match (header.source_channels, header.has_alpha) {
        (1, _) => color_model::GRAY,
        (2, _) => color_model::GRAY_ALPHA,
        (_, true) => color_model::RGBA,
        _ => color_model::RGB,
    }
}

impl<W: TiffWriter> ImageLoader for TiffLoader<W> {
    fn format(&self) -> ImageFormat {
        ImageFormat::Tiff
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["tif", "tiff"]
    }

    fn matches_signature(&self, header: &[u8]) -> bool {
        header.starts_with(&TIFF_LE_MAGIC) || header.starts_with(&TIFF_BE_MAGIC)
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    fn identify(&self, path: &Path) -> Result<ImageInfo> {
        let header = read_tiff_header(open(path)?)?;
        Ok(ImageInfo {
            format: ImageFormat::Tiff,
            width: header.width,
            height: header.height,
            bits_per_channel: header.bits as u32,
            has_alpha: header.has_alpha,
            color_model: model_of(&header).to_string(),
        })
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    fn decode(
        &self,
        path: &Path,
        _options: &DecodeOptions,
        observer: Option<&dyn LoaderObserver>,
    ) -> Result<PixelBuffer> {
        let mut progress = ProgressReporter::new(observer);
        progress.check()?;
        let (mut buffer, header) = read_tiff(open(path)?, &mut progress)?;
        buffer.set_attribute("format", ImageFormat::Tiff.name());
        buffer.set_attribute("originalColorModel", model_of(&header));
        buffer.set_attribute("originalBitDepth", header.bits as u32);
        info!(width = header.width, height = header.height, bits = header.bits, "Decoded TIFF");
        Ok(buffer)
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    fn encode(&self, buffer: &PixelBuffer, path: &Path, options: &EncodeOptions) -> Result<()> {
        write_atomically(path, |output| self.writer.write_tiff(buffer, output, &options.tiff_options()))?;
        info!(
            width = buffer.width(),
            height = buffer.height(),
            compression = ?options.tiff_compression,
            "Encoded TIFF"
        );
        Ok(())
    }
}
