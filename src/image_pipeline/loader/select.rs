use std::path::Path;

use tracing::{debug, instrument};

use crate::image_pipeline::buffer::PixelBuffer;
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::common::observer::LoaderObserver;
use crate::image_pipeline::loader::codec_loader::CodecLoader;
use crate::image_pipeline::loader::image_loader::{ImageLoader, extension_of, read_signature};
use crate::image_pipeline::loader::raw_loader::RawLoader;
use crate::image_pipeline::loader::tiff_loader::TiffLoader;
use crate::image_pipeline::loader::types::{DecodeOptions, EncodeOptions, ImageFormat, ImageInfo};

/// Ordered loaders plus a content-sniffing fallback.
///
/// Reading picks, in order: the RAW loader by extension, the first loader
/// whose signature matches, the first loader claiming the extension, then
/// the fallback.
pub struct LoaderSet {
    loaders: Vec<Box<dyn ImageLoader>>,
    fallback: Box<dyn ImageLoader>,
}

impl Default for LoaderSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl LoaderSet {
    /// No loaders besides the fallback.
    pub fn new() -> Self {
        Self {
            loaders: Vec::new(),
            fallback: Box::new(CodecLoader::fallback()),
        }
    }

    /// RAW, JPEG, PNG, TIFF and the generic codec loader.
    pub fn standard() -> Self {
        Self::new()
            .with_loader(Box::new(RawLoader::new()))
            .with_loader(Box::new(CodecLoader::jpeg()))
            .with_loader(Box::new(CodecLoader::png()))
            .with_loader(Box::new(TiffLoader::new()))
            .with_loader(Box::new(CodecLoader::generic()))
    }

    pub fn with_loader(mut self, loader: Box<dyn ImageLoader>) -> Self {
        self.push(loader);
        self
    }

    /// Appends `loader`, replacing an existing loader for the same format.
    pub fn push(&mut self, loader: Box<dyn ImageLoader>) {
        let format = loader.format();
        match self.loaders.iter().position(|l| l.format() == format) {
            Some(index) => self.loaders[index] = loader,
            None => self.loaders.push(loader),
        }
    }

    pub fn by_format(&self, format: ImageFormat) -> Option<&dyn ImageLoader> {
        self.loaders
            .iter()
            .find(|l| l.format() == format)
            .map(|l| l.as_ref())
    }

    pub fn for_reading(&self, path: &Path) -> &dyn ImageLoader {
        let extension = extension_of(path);
        let claims = |loader: &dyn ImageLoader| {
            extension
                .as_deref()
                .is_some_and(|ext| loader.extensions().contains(&ext))
        };

        if let Some(raw) = self.by_format(ImageFormat::Raw).filter(|l| claims(*l)) {
            debug!("Selected RAW loader by extension");
            return raw;
        }
        if let Ok(header) = read_signature(path) {
            if let Some(loader) = self.loaders.iter().find(|l| l.matches_signature(&header)) {
                debug!(format = loader.format().name(), "Selected loader by signature");
                return loader.as_ref();
            }
        }
        if let Some(loader) = self.loaders.iter().find(|l| claims(l.as_ref())) {
            debug!(format = loader.format().name(), "Selected loader by extension");
            return loader.as_ref();
        }
        debug!("Using fallback loader");
        self.fallback.as_ref()
    }

    /// Format from `options`, otherwise from the output extension.
    pub fn for_writing(&self, path: &Path, options: &EncodeOptions) -> Result<&dyn ImageLoader> {
        let loader = match options.format {
            Some(format) => self.by_format(format),
            None => {
                let extension = extension_of(path);
                self.loaders.iter().map(|l| l.as_ref()).find(|l| {
                    !l.is_read_only()
                        && extension
                            .as_deref()
                            .is_some_and(|ext| l.extensions().contains(&ext))
                })
            }
        }
        .ok_or_else(|| PipelineError::UnsupportedFormat(format!("no encoder for {}", path.display())))?;
        if loader.is_read_only() {
            return Err(PipelineError::ReadOnly(loader.format().name()));
        }
        Ok(loader)
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn identify(&self, path: &Path) -> Result<ImageInfo> {
        self.for_reading(path).identify(path)
    }

    pub fn load(
        &self,
        path: &Path,
        options: &DecodeOptions,
        observer: Option<&dyn LoaderObserver>,
    ) -> Result<PixelBuffer> {
        self.for_reading(path).decode(path, options, observer)
    }

    pub fn save(&self, buffer: &PixelBuffer, path: &Path, options: &EncodeOptions) -> Result<()> {
        self.for_writing(path, options)?.encode(buffer, path, options)
    }
}
