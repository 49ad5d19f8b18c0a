//! RAW decoder implementation using the rawloader library.
//!
//! rawloader handles container parsing and sensor unpacking for the supported
//! formats (ARW, CR2, NEF, DNG, RAF, ...); demosaicing and colour are done by
//! [`demosaic`](super::demosaic).

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;

use rawloader::{RawImage, RawImageData as RawloaderImageData, RawLoader};
use tracing::{debug, instrument};

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::raw::debayer::demosaic;
use crate::image_pipeline::raw::reader::RawDecoder;
use crate::image_pipeline::raw::types::{DecodedRaw, RawDecodingSettings, RawImageData, RawInfo};

/// Default bit depth when no white level information is available from the RAW file.
const DEFAULT_BITS_PER_SAMPLE: u32 = 16;

/// The bit width of the u16 data type, used for calculating actual bits per sample.
const U16_BITS: u32 = 16;

/// RAW decoder backed by rawloader plus the `bayer` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawLoaderReader;

fn bits_per_sample(whitelevels: &[u16; 4]) -> u32 {
    let max_white_level = whitelevels.iter().max().copied().unwrap_or(u16::MAX);
    if max_white_level == 0 {
        DEFAULT_BITS_PER_SAMPLE
    } else {
        // e.g. 4095 -> 12 bits, 16383 -> 14 bits
        U16_BITS - max_white_level.leading_zeros()
    }
}

impl RawLoaderReader {
    pub fn new() -> Self {
        Self
    }

    /// Decodes sensor data from an in-memory RAW file.
    pub fn read_raw(&self, data: &[u8]) -> Result<RawImageData> {
        debug!("Decoding RAW image, {} bytes", data.len());
        let decoded = RawLoader::new()
            .decode(&mut Cursor::new(data), false)
            .map_err(|e| PipelineError::DecodeFailed(e.to_string()))?;
        Ok(Self::sensor_data(decoded))
    }

    fn sensor_data(decoded: RawImage) -> RawImageData {
        let cam_to_xyz = decoded.cam_to_xyz();
        let bits_per_sample = bits_per_sample(&decoded.whitelevels);
        debug!(
            width = decoded.width,
            height = decoded.height,
            bits_per_sample,
            cfa = %decoded.cfa.name,
            "Decoded sensor data"
        );

        // Float data is normalised to 0.0-1.0
        let data: Vec<u16> = match decoded.data {
            RawloaderImageData::Integer(values) => values,
            RawloaderImageData::Float(values) => values
                .iter()
                .map(|&v| (v.clamp(0.0, 1.0) * u16::MAX as f32) as u16)
                .collect(),
        };

        RawImageData {
            width: decoded.width,
            height: decoded.height,
            data,
            bits_per_sample,
            wb_coeffs: decoded.wb_coeffs,
            blacklevels: decoded.blacklevels,
            whitelevels: decoded.whitelevels,
            cfa: decoded.cfa.name.clone(),
            cpp: decoded.cpp,
            cam_to_xyz,
        }
    }
}

impl RawDecoder for RawLoaderReader {
    #[instrument(skip(self), fields(path = %path.display()))]
    fn identify(&self, path: &Path) -> Result<RawInfo> {
        let file = File::open(path).map_err(|e| PipelineError::InputReadError(e.to_string()))?;
        // Dummy mode parses the container without unpacking sensor data.
        let image = RawLoader::new()
            .decode(&mut BufReader::new(file), true)
            .map_err(|e| PipelineError::DecodeFailed(e.to_string()))?;
        Ok(RawInfo {
            width: image.width as u32,
            height: image.height as u32,
            make: image.clean_make.clone(),
            model: image.clean_model.clone(),
            bits_per_sample: bits_per_sample(&image.whitelevels),
        })
    }

    #[instrument(skip(self, settings), fields(path = %path.display()))]
    fn decode(&self, path: &Path, settings: &RawDecodingSettings) -> Result<DecodedRaw> {
        let bytes = std::fs::read(path).map_err(|e| PipelineError::InputReadError(e.to_string()))?;
        let sensor = self.read_raw(&bytes)?;
        demosaic(&sensor, settings)
    }
}
