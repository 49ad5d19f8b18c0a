//! Image processing pipeline module
//!
//! A bit-depth polymorphic image buffer, loaders that decode on-disk encodings
//! into it with progress and cancellation, a threaded filter framework with a
//! process-wide registry, and the editing and conversion drivers built on them.

pub mod buffer;
pub mod color;
pub mod common;
pub mod conversions;
pub mod editor;
pub mod filter;
pub mod loader;
pub mod raw;
pub mod tiff;

pub use common::{CancelToken, LoaderObserver, PipelineError, Result};

pub use buffer::{AspectMode, BitDepth, Color, Flip, PixelBuffer, Rect, Rotation};

pub use color::{AssignProfileOnly, ColorProfile, ColorTransform, RenderingIntent};

pub use raw::{OutputColorSpace, RawDecoder, RawDecodingSettings, RawLoaderReader};

pub use loader::{DecodeOptions, EncodeOptions, ImageFormat, ImageInfo, ImageLoader, LoaderSet};

pub use filter::{FilterPipeline, FilterRegistry, FilterTask, ThreadedFilter};

pub use editor::EditSession;

pub use conversions::{ConversionConfig, Converter};
