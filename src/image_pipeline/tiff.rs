//! TIFF reading and writing module
//!
//! Reading and writing of 8/16-bit RGB(A) and grayscale TIFF files with
//! selectable compression.

mod reader;
mod standard_tiff_writer;
pub mod types;
mod writer;

pub use reader::{TiffHeader, read_tiff, read_tiff_header};
pub use standard_tiff_writer::StandardTiffWriter;
pub use types::{TiffCompression, TiffOptions};
pub use writer::TiffWriter;
