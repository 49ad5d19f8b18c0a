//! The filter contract, its execution context and lifecycle.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, info_span, warn};

use crate::image_pipeline::buffer::PixelBuffer;
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::common::observer::{CancelToken, LoaderObserver};

/// Smallest percentage step forwarded to the observer.
const PROGRESS_STEP: f32 = 0.5;

/// CPU-bound transformation of a [`PixelBuffer`].
///
/// `filter_image` reads `src` and returns a new destination buffer. It must
/// call [`FilterContext::check`] (or [`FilterContext::scanline`]) at bounded
/// intervals and never hand back a partially processed result.
pub trait ThreadedFilter: Send {
    fn id(&self) -> &'static str;

    fn version(&self) -> u32 {
        1
    }

    /// Rejects parameters that cannot apply to `src`.
    fn validate(&self, src: &PixelBuffer) -> Result<()> {
        let _ = src;
        Ok(())
    }

    fn filter_image(&mut self, src: &PixelBuffer, ctx: &FilterContext<'_>) -> Result<PixelBuffer>;
}

/// Cancellation flag plus progress range for one filter run.
///
/// Progress is expressed in percent. A context created by [`slave`](Self::slave)
/// maps its `[0, 100]` into a sub-range of the parent, shares the parent's
/// cancellation flag and never reports below what the parent already reported.
pub struct FilterContext<'a> {
    cancel: CancelToken,
    observer: Option<&'a dyn LoaderObserver>,
    begin: f32,
    end: f32,
    last: Rc<Cell<f32>>,
}

impl<'a> FilterContext<'a> {
    pub fn new(cancel: CancelToken, observer: Option<&'a dyn LoaderObserver>) -> Self {
        Self {
            cancel,
            observer,
            begin: 0.0,
            end: 100.0,
            last: Rc::new(Cell::new(0.0)),
        }
    }

    /// Context with a private flag and no observer, for synchronous one-off runs.
    pub fn detached() -> FilterContext<'static> {
        FilterContext::new(CancelToken::new(), None)
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn range(&self) -> (f32, f32) {
        (self.begin, self.end)
    }

    /// Last overall percentage reported through this context family.
    pub fn last_progress(&self) -> f32 {
        self.last.get()
    }

    fn map(&self, percent: f32) -> f32 {
        self.begin + (self.end - self.begin) * percent.clamp(0.0, 100.0) / 100.0
    }

    /// Child context occupying `[begin, end]` of this context's range.
    pub fn slave(&self, begin: f32, end: f32) -> FilterContext<'a> {
        FilterContext {
            cancel: self.cancel.clone(),
            observer: self.observer,
            begin: self.map(begin),
            end: self.map(end.max(begin)),
            last: Rc::clone(&self.last),
        }
    }

    /// False once the flag is set or the observer declines to continue.
    /// An observer refusal is latched into the shared flag.
    pub fn is_running(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        match self.observer {
            Some(observer) if !observer.continue_query() => {
                self.cancel.cancel();
                false
            }
            _ => true,
        }
    }

    pub fn check(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(PipelineError::Cancelled)
        }
    }

    pub fn post_progress(&self, percent: f32) {
        let mapped = self.map(percent);
        if mapped - self.last.get() < PROGRESS_STEP && mapped < self.end {
            return;
        }
        if mapped <= self.last.get() {
            return;
        }
        self.last.set(mapped);
        if let Some(observer) = self.observer {
            observer.progress_info(mapped / 100.0);
        }
    }

    /// Row checkpoint: polls cancellation and reports `y / rows` of this range.
    pub fn scanline(&self, y: u32, rows: u32) -> Result<()> {
        self.check()?;
        self.post_progress(y as f32 * 100.0 / rows.max(1) as f32);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    Constructed,
    /// Parameters validated against the source buffer.
    Initialized,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl FilterState {
    pub fn is_finished(self) -> bool {
        matches!(self, FilterState::Completed | FilterState::Cancelled | FilterState::Failed)
    }
}

/// A filter bound to its source buffer, tracking the run state.
pub struct FilterTask {
    filter: Box<dyn ThreadedFilter>,
    source: Option<Arc<PixelBuffer>>,
    state: FilterState,
}

impl FilterTask {
    pub fn new(filter: Box<dyn ThreadedFilter>) -> Self {
        Self {
            filter,
            source: None,
            state: FilterState::Constructed,
        }
    }

    pub fn id(&self) -> &'static str {
        self.filter.id()
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    pub fn source(&self) -> Option<&Arc<PixelBuffer>> {
        self.source.as_ref()
    }

    pub fn init(&mut self, source: Arc<PixelBuffer>) -> Result<()> {
        if self.state != FilterState::Constructed {
            return Err(PipelineError::Failed(format!(
                "filter {} initialised twice",
                self.filter.id()
            )));
        }
        self.filter.validate(&source)?;
        self.source = Some(source);
        self.state = FilterState::Initialized;
        Ok(())
    }

    /// Runs the filter on the calling thread. Whatever the outcome, the source
    /// buffer is left untouched and no partial result escapes.
    pub fn run(&mut self, ctx: &FilterContext<'_>) -> Result<PixelBuffer> {
        let source = match (&self.state, &self.source) {
            (FilterState::Initialized, Some(source)) => Arc::clone(source),
            _ => {
                return Err(PipelineError::Failed(format!(
                    "filter {} run from state {:?}",
                    self.filter.id(),
                    self.state
                )));
            }
        };

        let _span = info_span!("filter", id = self.filter.id(), version = self.filter.version()).entered();
        self.state = FilterState::Running;
        let outcome = self.filter.filter_image(&source, ctx).and_then(|dest| {
            // A flag raised after the last checkpoint still voids the result.
            ctx.check()?;
            Ok(dest)
        });

        self.state = match &outcome {
            Ok(_) => {
                ctx.post_progress(100.0);
                FilterState::Completed
            }
            Err(e) if e.is_cancelled() => FilterState::Cancelled,
            Err(e) => {
                warn!(id = self.filter.id(), error = %e, "Filter failed");
                FilterState::Failed
            }
        };
        debug!(id = self.filter.id(), state = ?self.state, "Filter finished");
        outcome
    }
}
