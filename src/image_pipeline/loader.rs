//! Image loader module
//!
//! Turns on-disk encodings into [`PixelBuffer`](crate::image_pipeline::buffer::PixelBuffer)s
//! and back: camera RAW, JPEG, PNG, TIFF, the `image` crate's other codecs,
//! and a content-sniffing fallback, selected through a [`LoaderSet`].

mod codec_loader;
mod image_loader;
mod raw_loader;
mod select;
mod tiff_loader;
pub mod types;


pub use codec_loader::CodecLoader;
pub use image_loader::{ImageLoader, SIGNATURE_LEN, extension_of, read_signature};
pub use raw_loader::{RAW_EXTENSIONS, RawLoader};
pub use select::LoaderSet;
pub use tiff_loader::TiffLoader;
pub use types::{DecodeOptions, EncodeOptions, EncodeOptionsBuilder, ImageFormat, ImageInfo, color_model};
