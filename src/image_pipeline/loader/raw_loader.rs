//! Camera RAW loader.
//!
//! Pixel work is delegated to a [`RawDecoder`]. The loader rescales the
//! decoder's output to the full range of the requested depth, reorders it to
//! BGR, attaches the output colour profile and runs the RAW post-processing
//! chain when its settings are dirty.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::image_pipeline::buffer::{BitDepth, PixelBuffer, PixelSamples, try_alloc};
use crate::image_pipeline::color::{AssignProfileOnly, ColorProfile, ColorTransform, RenderingIntent};
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::common::observer::{CancelToken, LoaderObserver, ProgressReporter, ScanlineProgress};
use crate::image_pipeline::filter::{FilterContext, FilterPipeline, FilterRegistry};
use crate::image_pipeline::loader::image_loader::ImageLoader;
use crate::image_pipeline::loader::types::{DecodeOptions, ImageFormat, ImageInfo, color_model};
use crate::image_pipeline::raw::{
    DecodedRaw, OutputColorSpace, RawDecoder, RawDecodingSettings, RawLoaderReader, RawSamples,
};

pub const RAW_EXTENSIONS: &[&str] = &[
    "3fr", "ari", "arw", "crw", "cr2", "dcr", "dng", "erf", "kdc", "mef", "mos", "mrw", "nef", "nrw",
    "orf", "pef", "raf", "raw", "rw2", "rwl", "sr2", "srf", "srw", "x3f",
];

/// Progress share of the external decode call.
const DECODE_END: f32 = 0.7;
/// End of the rescale/reorder pass. Post-processing owns the rest.
const CONVERT_END: f32 = 0.9;

pub struct RawLoader<D: RawDecoder = RawLoaderReader, T: ColorTransform = AssignProfileOnly> {
    decoder: D,
    transform: T,
    registry: Option<Arc<FilterRegistry>>,
}

impl RawLoader<RawLoaderReader, AssignProfileOnly> {
    pub fn new() -> Self {
        Self::with_custom(RawLoaderReader, AssignProfileOnly)
    }
}

impl Default for RawLoader<RawLoaderReader, AssignProfileOnly> {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin_space(profile: &ColorProfile) -> Option<OutputColorSpace> {
    match profile {
        ColorProfile::Srgb => Some(OutputColorSpace::Srgb),
        ColorProfile::AdobeRgb => Some(OutputColorSpace::AdobeRgb),
        ColorProfile::WideGamut => Some(OutputColorSpace::WideGamut),
        ColorProfile::ProPhoto => Some(OutputColorSpace::ProPhoto),
        _ => None,
    }
}

/// Settings actually handed to the decoder, plus the custom profile the
/// result must be converted into afterwards.
///
/// A custom profile that is one of the built-ins is decoded straight into
/// that space. Any other is decoded into ProPhoto (16-bit) or sRGB (8-bit).
pub(crate) fn resolve_output(settings: &RawDecodingSettings) -> (RawDecodingSettings, Option<ColorProfile>) {
    let mut decoding = settings.clone();
    if settings.output_color_space != OutputColorSpace::Custom {
        return (decoding, None);
    }
    let Some(path) = settings.output_profile.as_deref() else {
        warn!("Custom output colour space without a profile, falling back to sRGB");
        decoding.output_color_space = OutputColorSpace::Srgb;
        return (decoding, None);
    };
    if let Some(space) = ColorProfile::match_builtin(path).as_ref().and_then(builtin_space) {
        debug!(?space, "Custom output profile is a built-in");
        decoding.output_color_space = space;
        return (decoding, None);
    }
    decoding.output_color_space = if settings.sixteen_bits_image {
        OutputColorSpace::ProPhoto
    } else {
        OutputColorSpace::Srgb
    };
    (decoding, Some(ColorProfile::File(path.to_path_buf())))
}

fn space_profile(space: OutputColorSpace, settings: &RawDecodingSettings) -> Option<ColorProfile> {
    match space {
        OutputColorSpace::Raw => None,
        OutputColorSpace::Srgb => Some(ColorProfile::Srgb),
        OutputColorSpace::AdobeRgb => Some(ColorProfile::AdobeRgb),
        OutputColorSpace::WideGamut => Some(ColorProfile::WideGamut),
        OutputColorSpace::ProPhoto => Some(ColorProfile::ProPhoto),
        OutputColorSpace::Custom => settings.output_profile.clone().map(ColorProfile::File),
    }
}

/// Interleaved RGB to BGR, each sample scaled by `fac` and clamped to `max`.
fn rescale_rows<S, T>(
    src: &[S],
    width: usize,
    height: u32,
    fac: f64,
    max: f64,
    narrow: impl Fn(f64) -> T,
    scan: &mut ScanlineProgress<'_, '_>,
) -> Result<Vec<T>>
where
    S: Copy + Into<f64>,
    T: Copy + Clone + Default,
{
    let row_len = width * 3;
    let mut out = try_alloc::<T>(row_len * height as usize)?;
    for (y, (dst, src)) in out.chunks_exact_mut(row_len).zip(src.chunks_exact(row_len)).enumerate() {
        scan.row(y as u32)?;
        for (d, s) in dst.chunks_exact_mut(3).zip(src.chunks_exact(3)) {
            let scale = |v: S| narrow((v.into() * fac).round().min(max));
            d[0] = scale(s[2]);
            d[1] = scale(s[1]);
            d[2] = scale(s[0]);
        }
    }
    Ok(out)
}

fn to_buffer(raw: &DecodedRaw, depth: BitDepth, progress: &mut ProgressReporter<'_>) -> Result<PixelBuffer> {
    let expected = raw.width as usize * raw.height as usize * 3;
    if raw.width == 0 || raw.height == 0 || raw.samples.len() < expected {
        return Err(PipelineError::DecodeFailed(format!(
            "decoder returned {} samples for {}x{}",
            raw.samples.len(),
            raw.width,
            raw.height
        )));
    }
    if raw.rgbmax == 0 {
        return Err(PipelineError::DecodeFailed("decoder reported rgbmax = 0".to_string()));
    }

    let max = depth.max_value() as f64;
    let fac = max / raw.rgbmax as f64;
    let width = raw.width as usize;
    debug!(rgbmax = raw.rgbmax, fac, bits = depth.bits(), "Rescaling decoder output");

    let mut scan = ScanlineProgress::new(progress, raw.height, DECODE_END, CONVERT_END);
    let samples = match (&raw.samples, depth) {
        (RawSamples::Sixteen(data), BitDepth::Sixteen) => {
            PixelSamples::Sixteen(rescale_rows(data, width, raw.height, fac, max, |v| v as u16, &mut scan)?)
        }
        (RawSamples::Eight(data), BitDepth::Sixteen) => {
            PixelSamples::Sixteen(rescale_rows(data, width, raw.height, fac, max, |v| v as u16, &mut scan)?)
        }
        (RawSamples::Sixteen(data), BitDepth::Eight) => {
            PixelSamples::Eight(rescale_rows(data, width, raw.height, fac, max, |v| v as u8, &mut scan)?)
        }
        (RawSamples::Eight(data), BitDepth::Eight) => {
            PixelSamples::Eight(rescale_rows(data, width, raw.height, fac, max, |v| v as u8, &mut scan)?)
        }
    };
    scan.finish();
    PixelBuffer::from_samples(raw.width, raw.height, false, samples)
}

impl<D: RawDecoder, T: ColorTransform> RawLoader<D, T> {
    pub fn with_custom(decoder: D, transform: T) -> Self {
        Self {
            decoder,
            transform,
            registry: None,
        }
    }

    /// Post-processing filters come from `registry` instead of the global one.
    pub fn with_registry(mut self, registry: Arc<FilterRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    fn registry(&self) -> &FilterRegistry {
        match &self.registry {
            Some(registry) => registry,
            None => FilterRegistry::global(),
        }
    }

    /// White balance, BCG, curves and levels, each only when dirty.
    fn post_process(
        &self,
        image: PixelBuffer,
        settings: &RawDecodingSettings,
        observer: Option<&dyn LoaderObserver>,
    ) -> Result<PixelBuffer> {
        if !settings.post_processing_dirty() {
            return Ok(image);
        }
        let mut pipeline = FilterPipeline::raw_post_processing(settings, self.registry())?;
        let root = FilterContext::new(CancelToken::new(), observer);
        let ctx = root.slave(CONVERT_END * 100.0, 100.0);
        let (mut processed, timings) = pipeline.run(&image, &ctx)?;
        debug!(timings = %timings.summary(), "RAW post-processing done");
        processed.copy_metadata_from(&image);
        Ok(processed)
    }
}

impl<D: RawDecoder, T: ColorTransform> ImageLoader for RawLoader<D, T> {
    fn format(&self) -> ImageFormat {
        ImageFormat::Raw
    }

    fn extensions(&self) -> &'static [&'static str] {
        RAW_EXTENSIONS
    }

    /// RAW containers share magic with TIFF and each other; only the
    /// extension is meaningful.
    fn matches_signature(&self, _header: &[u8]) -> bool {
        false
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    fn identify(&self, path: &Path) -> Result<ImageInfo> {
        let info = self.decoder.identify(path)?;
        debug!(make = %info.make, model = %info.model, "Identified RAW file");
        Ok(ImageInfo {
            format: ImageFormat::Raw,
            width: info.width,
            height: info.height,
            bits_per_channel: 16,
            has_alpha: false,
            color_model: color_model::RAW.to_string(),
        })
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    fn decode(
        &self,
        path: &Path,
        options: &DecodeOptions,
        observer: Option<&dyn LoaderObserver>,
    ) -> Result<PixelBuffer> {
        let settings = &options.raw;
        let mut progress = ProgressReporter::new(observer);
        progress.check()?;

        let (decoding, custom_profile) = resolve_output(settings);
        info!(settings = %decoding.summary(), "Decoding RAW file");
        let raw = self.decoder.decode(path, &decoding)?;
        progress.check()?;
        progress.report(DECODE_END);

        let mut image = to_buffer(&raw, decoding.depth(), &mut progress)?;
        match space_profile(decoding.output_color_space, &decoding) {
            Some(profile) => image.set_icc_profile(Some(profile)),
            None => image.set_attribute("uncalibratedColor", true),
        }
        image.set_attribute("format", ImageFormat::Raw.name());
        image.set_attribute("rawDecodingSettings", settings.summary());
        image.set_attribute("originalColorModel", color_model::RAW);
        image.set_attribute("originalBitDepth", 16u32);

        if let Some(target) = custom_profile {
            let source = image.icc_profile().cloned().unwrap_or(ColorProfile::Srgb);
            self.transform
                .apply(&mut image, &source, &target, RenderingIntent::Perceptual, observer)?;
            image.set_icc_profile(Some(target));
        }
        progress.check()?;

        let image = self.post_process(image, settings, observer)?;
        progress.report(1.0);
        info!(width = image.width(), height = image.height(), "RAW decode complete");
        Ok(image)
    }

    fn is_read_only(&self) -> bool {
        true
    }
}
