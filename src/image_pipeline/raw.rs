//! RAW image reading module
//!
//! Format-agnostic access to camera RAW files: a black-box [`RawDecoder`] that
//! demosaics into interleaved RGB, and the settings that drive decoding and
//! post-processing.

mod debayer;
mod rawloader_reader;
mod reader;
pub mod types;

#[cfg(test)]
mod tests;

pub use debayer::demosaic;
pub use rawloader_reader::RawLoaderReader;
pub use reader::RawDecoder;
pub use types::{
    ChannelLevels, DecodedRaw, LevelsAdjust, OutputColorSpace, RawDecodingSettings, RawImageData,
    RawInfo, RawSamples,
};
