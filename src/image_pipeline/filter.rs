//! Threaded filter framework
//!
//! The [`ThreadedFilter`] contract with cooperative cancellation and slave-mode
//! progress, background execution, the process-wide [`FilterRegistry`],
//! sequential [`FilterPipeline`]s and the built-in colour and geometry filters.

mod bcg;
mod curves;
mod kernel;
mod lens;
mod levels;
mod params;
mod pipeline;
mod registry;
mod resize;
mod runner;
mod threaded;
mod timing;
mod white_balance;

#[cfg(test)]
mod tests;

pub use bcg::{BcgFilter, BcgSettings};
pub use curves::{
    CurveChannel, CurveType, CurvesFilter, CurvesSettings, MULTIPLIER_16BIT, points_from_eight_bit,
    points_to_eight_bit,
};
pub use lens::{DistortionStage, LensCorrectionFilter, LensProfile, TcaModel, TcaStage, VignettingStage};
pub use levels::{LevelsChannel, LevelsFilter, LevelsSettings};
pub use params::{FilterParams, ParamValue};
pub use pipeline::{FilterPipeline, RAW_POST_PROCESSING};
pub use registry::{BasicFilterGenerator, FilterGenerator, FilterRegistry, RegisteredFilter};
pub use resize::ResizeFilter;
pub use runner::{FilterEvent, FilterHandle, spawn};
pub use threaded::{FilterContext, FilterState, FilterTask, ThreadedFilter};
pub use timing::{PipelineTimings, StepTiming, Timer};
pub use white_balance::{NEUTRAL_TEMPERATURE, WhiteBalanceFilter, WhiteBalanceSettings};
