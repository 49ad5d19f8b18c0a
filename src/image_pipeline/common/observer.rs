//! Cancellation and progress contracts shared by loaders and filters.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::image_pipeline::common::error::{PipelineError, Result};

/// Smallest progress delta forwarded to an observer between scanlines.
const REPORT_STEP: f32 = 0.01;

/// Callback contract polled by long-running decodes and filters.
///
/// `continue_query` returning `false` asks the operation to stop at its next
/// checkpoint. `progress_info` receives a fraction in `[0, 1]`.
pub trait LoaderObserver: Send + Sync {
    fn continue_query(&self) -> bool {
        true
    }

    fn progress_info(&self, fraction: f32) {
        let _ = fraction;
    }
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl LoaderObserver for CancelToken {
    fn continue_query(&self) -> bool {
        !self.is_cancelled()
    }
}

/// Forwards progress to an optional observer, never letting it go backwards.
pub struct ProgressReporter<'a> {
    observer: Option<&'a dyn LoaderObserver>,
    last: f32,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(observer: Option<&'a dyn LoaderObserver>) -> Self {
        Self {
            observer,
            last: 0.0,
        }
    }

    pub fn observer(&self) -> Option<&'a dyn LoaderObserver> {
        self.observer
    }

    pub fn last(&self) -> f32 {
        self.last
    }

    /// Returns `Err(Cancelled)` once the observer asks to stop.
    pub fn check(&self) -> Result<()> {
        match self.observer {
            Some(observer) if !observer.continue_query() => Err(PipelineError::Cancelled),
            _ => Ok(()),
        }
    }

    pub fn report(&mut self, fraction: f32) {
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction < self.last {
            return;
        }
        self.last = fraction;
        if let Some(observer) = self.observer {
            observer.progress_info(fraction);
        }
    }
}

/// Per-scanline checkpoint: polls cancellation on every row and maps row
/// position into the `[begin, end]` slice of overall progress.
pub struct ScanlineProgress<'r, 'a> {
    reporter: &'r mut ProgressReporter<'a>,
    rows: u32,
    begin: f32,
    end: f32,
    last_sent: f32,
}

impl<'r, 'a> ScanlineProgress<'r, 'a> {
    pub fn new(reporter: &'r mut ProgressReporter<'a>, rows: u32, begin: f32, end: f32) -> Self {
        Self {
            reporter,
            rows: rows.max(1),
            begin,
            end,
            last_sent: f32::NEG_INFINITY,
        }
    }

    pub fn row(&mut self, y: u32) -> Result<()> {
        if self.reporter.observer().is_none() {
            return Ok(());
        }
        self.reporter.check()?;
        let fraction = self.begin + (self.end - self.begin) * (y as f32 / self.rows as f32);
        if fraction - self.last_sent >= REPORT_STEP {
            self.reporter.report(fraction);
            self.last_sent = fraction;
        }
        Ok(())
    }

    pub fn finish(self) {
        self.reporter.report(self.end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<f32>>,
    }

    impl LoaderObserver for Recorder {
        fn progress_info(&self, fraction: f32) {
            self.seen.lock().unwrap().push(fraction);
        }
    }

    #[test]
    fn test_reporter_is_monotonic() {
        let recorder = Recorder::default();
        let mut reporter = ProgressReporter::new(Some(&recorder));
        reporter.report(0.4);
        reporter.report(0.2);
        reporter.report(0.9);
        reporter.report(1.7);
        assert_eq!(*recorder.seen.lock().unwrap(), vec![0.4, 0.9, 1.0]);
    }

    #[test]
    fn test_cancel_token_stops_scanlines() {
        let token = CancelToken::new();
        let mut reporter = ProgressReporter::new(Some(&token));
        let mut rows = ScanlineProgress::new(&mut reporter, 10, 0.0, 1.0);
        assert!(rows.row(0).is_ok());
        token.cancel();
        assert!(matches!(rows.row(1), Err(PipelineError::Cancelled)));
    }

    #[test]
    fn test_no_observer_never_cancels() {
        let mut reporter = ProgressReporter::new(None);
        let mut rows = ScanlineProgress::new(&mut reporter, 3, 0.0, 1.0);
        for y in 0..3 {
            assert!(rows.row(y).is_ok());
        }
    }
}
