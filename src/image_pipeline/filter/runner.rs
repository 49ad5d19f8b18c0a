//! Background execution of a [`FilterTask`] on its own worker thread.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, error};

use crate::image_pipeline::buffer::PixelBuffer;
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::common::observer::{CancelToken, LoaderObserver};
use crate::image_pipeline::filter::threaded::{FilterContext, FilterState, FilterTask};

/// Notifications sent from the worker to the owning thread.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterEvent {
    /// Overall progress in percent.
    Progress(u8),
    /// Sent once; `true` when a destination buffer is available.
    Done(bool),
}

/// Bridges worker progress onto the event channel and an optional caller observer.
struct ChannelObserver {
    events: Sender<FilterEvent>,
    forward: Option<Arc<dyn LoaderObserver>>,
}

impl LoaderObserver for ChannelObserver {
    fn continue_query(&self) -> bool {
        self.forward.as_ref().is_none_or(|o| o.continue_query())
    }

    fn progress_info(&self, fraction: f32) {
        let _ = self
            .events
            .send(FilterEvent::Progress((fraction * 100.0).round() as u8));
        if let Some(o) = &self.forward {
            o.progress_info(fraction);
        }
    }
}

/// Owning side of a running filter.
pub struct FilterHandle {
    cancel: CancelToken,
    events: Receiver<FilterEvent>,
    worker: Option<JoinHandle<(FilterState, Result<PixelBuffer>)>>,
}

/// Starts `task` on a dedicated thread. The task must already be initialised.
pub fn spawn(mut task: FilterTask, observer: Option<Arc<dyn LoaderObserver>>) -> Result<FilterHandle> {
    if task.state() != FilterState::Initialized {
        return Err(PipelineError::Failed(format!(
            "filter {} spawned from state {:?}",
            task.id(),
            task.state()
        )));
    }
    let cancel = CancelToken::new();
    let (tx, rx) = mpsc::channel();
    let worker_cancel = cancel.clone();

    let worker = thread::Builder::new()
        .name(format!("filter-{}", task.id()))
        .spawn(move || {
            let bridge = ChannelObserver {
                events: tx.clone(),
                forward: observer,
            };
            let ctx = FilterContext::new(worker_cancel, Some(&bridge));
            let result = task.run(&ctx);
            let _ = tx.send(FilterEvent::Done(result.is_ok()));
            (task.state(), result)
        })?;

    debug!("Filter worker started");
    Ok(FilterHandle {
        cancel,
        events: rx,
        worker: Some(worker),
    })
}

impl FilterHandle {
    /// Raises the cooperative cancellation flag; the worker stops at its next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().is_none_or(|w| w.is_finished())
    }

    /// Next pending event without blocking.
    pub fn try_event(&self) -> Option<FilterEvent> {
        self.events.try_recv().ok()
    }

    /// Blocks until the worker sends its next event.
    pub fn next_event(&self) -> Option<FilterEvent> {
        self.events.recv().ok()
    }

    /// Blocks until the worker exits and returns its final state and result.
    pub fn wait(mut self) -> (FilterState, Result<PixelBuffer>) {
        let Some(worker) = self.worker.take() else {
            return (
                FilterState::Failed,
                Err(PipelineError::Failed("filter already joined".to_string())),
            );
        };
        match worker.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("Filter worker panicked");
                (
                    FilterState::Failed,
                    Err(PipelineError::Failed("filter worker panicked".to_string())),
                )
            }
        }
    }
}

impl Drop for FilterHandle {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.cancel.cancel();
            let _ = worker.join();
        }
    }
}
