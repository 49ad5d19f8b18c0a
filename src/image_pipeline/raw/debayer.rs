//! Sensor data to RGB: demosaic, black level, white balance and colour matrix.

use std::io::Cursor;

use bayer::{BayerDepth, CFA, Demosaic, RasterDepth, RasterMut};
use tracing::{debug, info};

use crate::image_pipeline::buffer::try_alloc;
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::raw::types::{
    DecodedRaw, OutputColorSpace, RawDecodingSettings, RawImageData, RawSamples,
};

const XYZ_TO_SRGB: [[f32; 3]; 3] = [
    [3.2404542, -1.5371385, -0.4985314],
    [-0.9692660, 1.8760108, 0.0415560],
    [0.0556434, -0.2040259, 1.0572252],
];

const XYZ_TO_ADOBE_RGB: [[f32; 3]; 3] = [
    [2.0413690, -0.5649464, -0.3446944],
    [-0.9692660, 1.8760108, 0.0415560],
    [0.0134474, -0.1183897, 1.0154096],
];

const XYZ_TO_WIDE_GAMUT: [[f32; 3]; 3] = [
    [1.4628067, -0.1840623, -0.2743606],
    [-0.5217933, 1.4472381, 0.0677227],
    [0.0349342, -0.0968930, 1.2884099],
];

const XYZ_TO_PROPHOTO: [[f32; 3]; 3] = [
    [1.3459433, -0.2556075, -0.0511118],
    [-0.5445989, 1.5081673, 0.0205351],
    [0.0, 0.0, 1.2118128],
];

fn cfa_pattern(name: &str) -> Result<CFA> {
    match name {
        "RGGB" => Ok(CFA::RGGB),
        "BGGR" => Ok(CFA::BGGR),
        "GRBG" => Ok(CFA::GRBG),
        "GBRG" => Ok(CFA::GBRG),
        other => Err(PipelineError::UnsupportedFormat(format!(
            "colour filter array {:?}",
            other
        ))),
    }
}

fn output_matrix(space: OutputColorSpace) -> Option<&'static [[f32; 3]; 3]> {
    match space {
        OutputColorSpace::Raw => None,
        OutputColorSpace::Srgb | OutputColorSpace::Custom => Some(&XYZ_TO_SRGB),
        OutputColorSpace::AdobeRgb => Some(&XYZ_TO_ADOBE_RGB),
        OutputColorSpace::WideGamut => Some(&XYZ_TO_WIDE_GAMUT),
        OutputColorSpace::ProPhoto => Some(&XYZ_TO_PROPHOTO),
    }
}

/// Combined camera to output matrix, normalised so camera white maps to output white.
fn camera_matrix(raw: &RawImageData, space: OutputColorSpace) -> Option<[[f32; 3]; 3]> {
    let xyz_to_out = output_matrix(space)?;
    if raw.cam_to_xyz.iter().flatten().all(|&v| v == 0.0) {
        return None;
    }
    let mut m = [[0.0f32; 3]; 3];
    for r in 0..3 {
        for c in 0..3 {
            m[r][c] = (0..3).map(|k| xyz_to_out[r][k] * raw.cam_to_xyz[k][c]).sum();
        }
        let row_sum: f32 = m[r].iter().sum();
        if row_sum.abs() > f32::EPSILON {
            for v in m[r].iter_mut() {
                *v /= row_sum;
            }
        }
    }
    Some(m)
}

/// BT.709 transfer curve, as applied by dcraw for 8-bit output.
fn bt709(v: f32) -> f32 {
    if v < 0.018 {
        v * 4.5
    } else {
        1.099 * v.powf(0.45) - 0.099
    }
}

/// Runs the mosaic through the `bayer` crate and returns 16-bit RGB triplets.
fn interpolate(raw: &RawImageData) -> Result<Vec<u16>> {
    let (width, height) = (raw.width, raw.height);
    if raw.cpp == 3 {
        return Ok(raw.data.clone());
    }
    let cfa = cfa_pattern(&raw.cfa)?;
    let bayer_bytes: Vec<u8> = raw.data.iter().flat_map(|&val| val.to_le_bytes()).collect();
    let mut output_buf = try_alloc::<u8>(width * height * 3 * 2)?;

    info!(width, height, cfa = %raw.cfa, "Running linear demosaic");
    {
        let mut output_raster = RasterMut::new(width, height, RasterDepth::Depth16, &mut output_buf);
        bayer::run_demosaic(
            &mut Cursor::new(&bayer_bytes[..]),
            BayerDepth::Depth16LE,
            cfa,
            Demosaic::Linear,
            &mut output_raster,
        )
        .map_err(|e| PipelineError::DecodeFailed(format!("demosaic failed: {:?}", e)))?;
    }

    Ok(output_buf
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect())
}

/// Turns sensor data into interleaved RGB at the depth `settings` asks for.
///
/// 16-bit output keeps linear sensor values and reports `rgbmax` as the usable
/// sensor range; 8-bit output is gamma encoded to 0..=255.
pub fn demosaic(raw: &RawImageData, settings: &RawDecodingSettings) -> Result<DecodedRaw> {
    let pixels = raw
        .width
        .checked_mul(raw.height)
        .filter(|&n| n > 0)
        .ok_or(PipelineError::InvalidDimensions(raw.width as u32, raw.height as u32))?;
    let expected = pixels * raw.cpp.max(1);
    if raw.data.len() < expected {
        return Err(PipelineError::DecodeFailed(format!(
            "sensor data holds {} samples, expected {}",
            raw.data.len(),
            expected
        )));
    }

    let rgb = interpolate(raw)?;

    let black = raw.blacklevels[0] as f32;
    let white = raw.whitelevels[0] as f32;
    let range = (white - black).max(1.0);
    let green = if raw.wb_coeffs[1] > 0.0 { raw.wb_coeffs[1] } else { 1.0 };
    let wb = [
        if raw.wb_coeffs[0].is_finite() && raw.wb_coeffs[0] > 0.0 { raw.wb_coeffs[0] / green } else { 1.0 },
        1.0,
        if raw.wb_coeffs[2].is_finite() && raw.wb_coeffs[2] > 0.0 { raw.wb_coeffs[2] / green } else { 1.0 },
    ];
    let matrix = camera_matrix(raw, settings.output_color_space);
    debug!(black, white, ?wb, matrix = matrix.is_some(), "Colour pipeline");

    let normalise = |px: &[u16]| -> [f32; 3] {
        let mut lin = [0.0f32; 3];
        for c in 0..3 {
            lin[c] = (((px[c] as f32 - black).max(0.0) / range) * wb[c]).min(1.0);
        }
        match &matrix {
            Some(m) => {
                let mut out = [0.0f32; 3];
                for r in 0..3 {
                    out[r] = (m[r][0] * lin[0] + m[r][1] * lin[1] + m[r][2] * lin[2]).clamp(0.0, 1.0);
                }
                out
            }
            None => lin,
        }
    };

    let (samples, rgbmax) = if settings.sixteen_bits_image {
        let mut out = try_alloc::<u16>(pixels * 3)?;
        for (dst, px) in out.chunks_exact_mut(3).zip(rgb.chunks_exact(3)) {
            let v = normalise(px);
            for c in 0..3 {
                dst[c] = (v[c] * range).round() as u16;
            }
        }
        (RawSamples::Sixteen(out), range as u32)
    } else {
        let mut out = try_alloc::<u8>(pixels * 3)?;
        for (dst, px) in out.chunks_exact_mut(3).zip(rgb.chunks_exact(3)) {
            let v = normalise(px);
            for c in 0..3 {
                dst[c] = (bt709(v[c]) * 255.0).round().clamp(0.0, 255.0) as u8;
            }
        }
        (RawSamples::Eight(out), 255)
    };

    Ok(DecodedRaw {
        width: raw.width as u32,
        height: raw.height as u32,
        samples,
        rgbmax,
    })
}
