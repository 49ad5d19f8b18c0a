use std::path::Path;

use crate::image_pipeline::common::error::Result;
use crate::image_pipeline::raw::types::{DecodedRaw, RawDecodingSettings, RawInfo};

/// External demosaicing routine used by the RAW loader.
///
/// `decode` is a blocking call and is not expected to poll for cancellation;
/// the loader checks between its own scanlines instead.
pub trait RawDecoder: Send + Sync {
    /// Reads dimensions and camera identity without decoding pixels.
    fn identify(&self, path: &Path) -> Result<RawInfo>;

    /// Demosaics `path` into interleaved RGB samples scaled to `rgbmax`.
    fn decode(&self, path: &Path, settings: &RawDecodingSettings) -> Result<DecodedRaw>;
}
