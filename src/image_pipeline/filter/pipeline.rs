//! Sequential filter chains with shared cancellation and aggregated progress.

use tracing::{debug, info, info_span};

use crate::image_pipeline::buffer::PixelBuffer;
use crate::image_pipeline::common::error::Result;
use crate::image_pipeline::filter::params::FilterParams;
use crate::image_pipeline::filter::registry::FilterRegistry;
use crate::image_pipeline::filter::threaded::{FilterContext, ThreadedFilter};
use crate::image_pipeline::filter::timing::{PipelineTimings, Timer};
use crate::image_pipeline::raw::RawDecodingSettings;

/// Identifiers of the RAW post-processing stages, in execution order.
pub const RAW_POST_PROCESSING: [&str; 4] = ["whitebalance", "bcg", "curves", "levels"];

struct PipelineStage {
    name: String,
    filter: Box<dyn ThreadedFilter>,
}

/// Ordered list of filters. Each stage reads the previous stage's output and
/// runs as a slave of the caller's context over an even share of its range.
#[derive(Default)]
pub struct FilterPipeline {
    stages: Vec<PipelineStage>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, filter: Box<dyn ThreadedFilter>) {
        self.stages.push(PipelineStage {
            name: name.into(),
            filter,
        });
    }

    pub fn with_stage(mut self, name: impl Into<String>, filter: Box<dyn ThreadedFilter>) -> Self {
        self.push(name, filter);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Runs every stage in order. Returns a copy of `src` when empty.
    pub fn run(&mut self, src: &PixelBuffer, ctx: &FilterContext<'_>) -> Result<(PixelBuffer, PipelineTimings)> {
        let mut timings = PipelineTimings::new();
        if self.stages.is_empty() {
            return Ok((src.copy()?, timings));
        }

        let steps = self.stages.len() as f32;
        let mut current: Option<PixelBuffer> = None;
        for (i, stage) in self.stages.iter_mut().enumerate() {
            ctx.check()?;
            let _span = info_span!("pipeline_stage", stage = %stage.name).entered();
            let slave = ctx.slave(i as f32 * 100.0 / steps, (i + 1) as f32 * 100.0 / steps);
            let input = current.as_ref().unwrap_or(src);

            let timer = Timer::start(stage.name.clone());
            stage.filter.validate(input)?;
            let output = stage.filter.filter_image(input, &slave)?;
            timings.record(timer);

            slave.post_progress(100.0);
            current = Some(output);
        }
        ctx.check()?;
        timings.log_summary();
        match current {
            Some(out) => Ok((out, timings)),
            None => Ok((src.copy()?, timings)),
        }
    }

    /// RAW post-processing chain for `settings`: white balance, then
    /// brightness/contrast/gamma, then tone curve, then levels. Each stage is
    /// added only when its own knobs are dirty.
    pub fn raw_post_processing(settings: &RawDecodingSettings, registry: &FilterRegistry) -> Result<Self> {
        let mut pipeline = FilterPipeline::new();

        if settings.white_balance_dirty() {
            let params = FilterParams::new()
                .with("exposure", settings.exposure_comp)
                .with("saturation", settings.saturation);
            pipeline.push(RAW_POST_PROCESSING[0], registry.create_filter_with(RAW_POST_PROCESSING[0], 1, &params)?);
        }
        if settings.bcg_dirty() {
            let params = FilterParams::new()
                .with("brightness", settings.lightness)
                .with("contrast", settings.contrast)
                .with("gamma", settings.gamma);
            pipeline.push(RAW_POST_PROCESSING[1], registry.create_filter_with(RAW_POST_PROCESSING[1], 1, &params)?);
        }
        if settings.curve_dirty() {
            let params = FilterParams::new().with("points", settings.curve_adjust.clone());
            pipeline.push(RAW_POST_PROCESSING[2], registry.create_filter_with(RAW_POST_PROCESSING[2], 1, &params)?);
        }
        if let Some(levels) = &settings.levels_adjust {
            let values: Vec<f64> = levels.to_flat().into_iter().map(f64::from).collect();
            let params = FilterParams::new().with("values", values);
            pipeline.push(RAW_POST_PROCESSING[3], registry.create_filter_with(RAW_POST_PROCESSING[3], 1, &params)?);
        }

        debug!(stages = ?pipeline.stage_names(), "RAW post-processing chain");
        if !pipeline.is_empty() {
            info!(summary = %settings.summary(), "Post-processing enabled");
        }
        Ok(pipeline)
    }
}
