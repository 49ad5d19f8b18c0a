//! Generic image buffer module
//!
//! A bit-depth polymorphic (8/16-bit) BGR(A) pixel container with colour profile
//! and loader attributes, plus geometry helpers.

mod geometry;
mod pixel_buffer;
pub mod types;

#[cfg(test)]
mod tests;

pub use geometry::{Flip, Rotation};
pub use pixel_buffer::{PixelBuffer, PixelSamples};
pub use types::{AspectMode, AttributeValue, BitDepth, Color, Rect};

pub(crate) use pixel_buffer::try_alloc;
