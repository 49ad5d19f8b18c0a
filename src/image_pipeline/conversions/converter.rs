use std::path::Path;

use tracing::{info, info_span, instrument};

use crate::image_pipeline::buffer::{BitDepth, PixelBuffer};
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::common::observer::{CancelToken, LoaderObserver};
use crate::image_pipeline::filter::{
    FilterContext, FilterParams, FilterPipeline, FilterRegistry, PipelineTimings, Timer,
};
use crate::image_pipeline::loader::{DecodeOptions, EncodeOptions, LoaderSet};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionConfig {
    pub decode: DecodeOptions,
    pub encode: EncodeOptions,
    /// Bounding box for a smooth rescale, aspect ratio kept.
    pub resize: Option<(u32, u32)>,
    pub output_depth: Option<BitDepth>,
}

/// Read, post-process and write one image.
pub struct Converter {
    loaders: LoaderSet,
    config: ConversionConfig,
}

impl Converter {
    pub fn new(config: ConversionConfig) -> Self {
        Self::with_custom(LoaderSet::standard(), config)
    }

    pub fn with_custom(loaders: LoaderSet, config: ConversionConfig) -> Self {
        Self { loaders, config }
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ConversionConfig) {
        self.config = config;
    }

    pub fn loaders(&self) -> &LoaderSet {
        &self.loaders
    }

    fn pipeline(&self) -> Result<FilterPipeline> {
        let mut pipeline = FilterPipeline::new();
        if let Some((width, height)) = self.config.resize {
            let params = FilterParams::new()
                .with("width", width as i64)
                .with("height", height as i64)
                .with("aspect", "keep");
            pipeline.push("resize", FilterRegistry::global().create_filter_with("resize", 1, &params)?);
        }
        Ok(pipeline)
    }

    /// Applies the configured resize and depth change to a decoded image.
    pub fn process(
        &self,
        image: PixelBuffer,
        observer: Option<&dyn LoaderObserver>,
    ) -> Result<(PixelBuffer, PipelineTimings)> {
        let mut pipeline = self.pipeline()?;
        let ctx = FilterContext::new(CancelToken::new(), observer);
        let (mut image, mut timings) = if pipeline.is_empty() {
            (image, PipelineTimings::new())
        } else {
            let (mut processed, timings) = pipeline.run(&image, &ctx)?;
            processed.copy_metadata_from(&image);
            (processed, timings)
        };

        if let Some(depth) = self.config.output_depth {
            if depth != image.depth() {
                let timer = Timer::start("convert_depth");
                let mut converted = image.convert_depth(depth)?;
                converted.copy_metadata_from(&image);
                image = converted;
                timings.record(timer);
            }
        }
        Ok((image, timings))
    }

    #[instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
    pub fn convert_file(
        &self,
        input: &Path,
        output: &Path,
        observer: Option<&dyn LoaderObserver>,
    ) -> Result<PipelineTimings> {
        info!("Starting conversion");
        if !input.is_file() {
            return Err(PipelineError::InputReadError(format!("{}: not a file", input.display())));
        }
        let mut timings = PipelineTimings::new();

        let image = {
            let _span = info_span!("decode").entered();
            let timer = Timer::start("decode");
            let image = self.loaders.load(input, &self.config.decode, observer)?;
            timings.record(timer);
            image
        };

        let image = {
            let _span = info_span!("post_process").entered();
            let (image, stages) = self.process(image, observer)?;
            timings.merge("post_process", &stages);
            image
        };

        {
            let _span = info_span!("encode").entered();
            let timer = Timer::start("encode");
            self.loaders.save(&image, output, &self.config.encode)?;
            timings.record(timer);
        }

        timings.log_summary();
        info!(
            width = image.width(),
            height = image.height(),
            bits = image.depth().bits(),
            "Conversion complete"
        );
        Ok(timings)
    }
}
