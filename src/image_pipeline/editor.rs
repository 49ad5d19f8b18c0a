//! Image editor session module
//!
//! Holds the image being edited, applies geometry and filter actions by
//! swapping in finished buffers, and keeps titled undo/redo histories.

mod session;


pub use session::{DEFAULT_UNDO_LEVELS, EditSession};
