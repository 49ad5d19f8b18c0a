//! Common utilities module
//!
//! Error taxonomy and the cancellation/progress contracts shared across the pipeline.

pub mod error;
pub mod observer;

pub use error::{PipelineError, Result};
pub use observer::{CancelToken, LoaderObserver, ProgressReporter, ScanlineProgress};
