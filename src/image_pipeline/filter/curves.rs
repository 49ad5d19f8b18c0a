//! Tone curves: control points interpolated into per-depth lookup tables.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::image_pipeline::buffer::{BitDepth, PixelBuffer};
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::filter::kernel::map_rows;
use crate::image_pipeline::filter::params::FilterParams;
use crate::image_pipeline::filter::registry::RegisteredFilter;
use crate::image_pipeline::filter::threaded::{FilterContext, ThreadedFilter};

/// Factor between 8-bit and persisted 16-bit control point values.
pub const MULTIPLIER_16BIT: i32 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveType {
    /// Monotone cubic through the control points.
    #[default]
    Smooth,
    /// Straight segments between the control points.
    Free,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveChannel {
    Luminosity,
    Red,
    Green,
    Blue,
}

/// Control points per channel, stored in 16-bit form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurvesSettings {
    pub curve_type: CurveType,
    pub luminosity: Vec<(i32, i32)>,
    pub red: Vec<(i32, i32)>,
    pub green: Vec<(i32, i32)>,
    pub blue: Vec<(i32, i32)>,
}

/// Rescales persisted 16-bit points for an 8-bit image.
pub fn points_to_eight_bit(points: &[(i32, i32)]) -> Vec<(i32, i32)> {
    points
        .iter()
        .map(|&(x, y)| ((x / MULTIPLIER_16BIT).clamp(0, 255), (y / MULTIPLIER_16BIT).clamp(0, 255)))
        .collect()
}

/// Rescales 8-bit points into the persisted 16-bit form.
pub fn points_from_eight_bit(points: &[(i32, i32)]) -> Vec<(i32, i32)> {
    points
        .iter()
        .map(|&(x, y)| (x * MULTIPLIER_16BIT, y * MULTIPLIER_16BIT))
        .collect()
}

/// Sorted, de-duplicated points as floats, clamped to `0..=max`.
fn prepare(points: &[(i32, i32)], max: f64) -> Vec<(f64, f64)> {
    let mut pts: Vec<(f64, f64)> = points
        .iter()
        .map(|&(x, y)| ((x as f64).clamp(0.0, max), (y as f64).clamp(0.0, max)))
        .collect();
    pts.sort_by(|a, b| a.0.total_cmp(&b.0));
    pts.dedup_by(|b, a| a.0 == b.0);
    pts
}

/// Fritsch-Carlson tangents for a monotone cubic Hermite spline.
fn monotone_tangents(pts: &[(f64, f64)]) -> Vec<f64> {
    let n = pts.len();
    let delta: Vec<f64> = pts
        .windows(2)
        .map(|w| (w[1].1 - w[0].1) / (w[1].0 - w[0].0))
        .collect();

    let mut m = vec![0.0; n];
    m[0] = delta[0];
    m[n - 1] = delta[n - 2];
    for i in 1..n - 1 {
        m[i] = if delta[i - 1] * delta[i] <= 0.0 {
            0.0
        } else {
            (delta[i - 1] + delta[i]) / 2.0
        };
    }
    for i in 0..n - 1 {
        if delta[i].abs() < 1e-9 {
            m[i] = 0.0;
            m[i + 1] = 0.0;
            continue;
        }
        let alpha = m[i] / delta[i];
        let beta = m[i + 1] / delta[i];
        let s = alpha * alpha + beta * beta;
        if s > 9.0 {
            let tau = 3.0 / s.sqrt();
            m[i] = tau * alpha * delta[i];
            m[i + 1] = tau * beta * delta[i];
        }
    }
    m
}

/// Evaluates the curve at every integer in `0..=max`. Fewer than two points
/// yields the identity.
fn evaluate(points: &[(i32, i32)], curve_type: CurveType, max: f64) -> Vec<f64> {
    let size = max as usize + 1;
    let pts = prepare(points, max);
    if pts.len() < 2 {
        return (0..size).map(|i| i as f64).collect();
    }
    let tangents = match curve_type {
        CurveType::Smooth => monotone_tangents(&pts),
        CurveType::Free => Vec::new(),
    };
    let (first, last) = (pts[0], pts[pts.len() - 1]);

    let mut seg = 0;
    (0..size)
        .map(|i| {
            let x = i as f64;
            if x <= first.0 {
                return first.1;
            }
            if x >= last.0 {
                return last.1;
            }
            while x > pts[seg + 1].0 {
                seg += 1;
            }
            let (x0, y0) = pts[seg];
            let (x1, y1) = pts[seg + 1];
            let h = x1 - x0;
            let t = (x - x0) / h;
            let value = match curve_type {
                CurveType::Free => y0 + (y1 - y0) * t,
                CurveType::Smooth => {
                    let t2 = t * t;
                    let t3 = t2 * t;
                    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
                    let h10 = t3 - 2.0 * t2 + t;
                    let h01 = -2.0 * t3 + 3.0 * t2;
                    let h11 = t3 - t2;
                    h00 * y0 + h10 * h * tangents[seg] + h01 * y1 + h11 * h * tangents[seg + 1]
                }
            };
            value.clamp(0.0, max)
        })
        .collect()
}

impl CurvesSettings {
    pub fn luminosity(points: Vec<(i32, i32)>) -> Self {
        Self {
            luminosity: points,
            ..Self::default()
        }
    }

    pub fn points(&self, channel: CurveChannel) -> &[(i32, i32)] {
        match channel {
            CurveChannel::Luminosity => &self.luminosity,
            CurveChannel::Red => &self.red,
            CurveChannel::Green => &self.green,
            CurveChannel::Blue => &self.blue,
        }
    }

    pub fn is_identity(&self) -> bool {
        [
            CurveChannel::Luminosity,
            CurveChannel::Red,
            CurveChannel::Green,
            CurveChannel::Blue,
        ]
        .iter()
        .all(|&c| self.points(c).len() < 2)
    }

    /// Points for `channel` in `depth`'s value range.
    pub fn points_for_depth(&self, channel: CurveChannel, depth: BitDepth) -> Vec<(i32, i32)> {
        match depth {
            BitDepth::Sixteen => self.points(channel).to_vec(),
            BitDepth::Eight => points_to_eight_bit(self.points(channel)),
        }
    }

    /// Luminosity curve composed with each colour curve, in blue, green, red order.
    fn composed(&self, depth: BitDepth) -> [Vec<f64>; 3] {
        let max = depth.max_value() as f64;
        let lum = evaluate(&self.points_for_depth(CurveChannel::Luminosity, depth), self.curve_type, max);
        [CurveChannel::Blue, CurveChannel::Green, CurveChannel::Red].map(|channel| {
            let own = evaluate(&self.points_for_depth(channel, depth), self.curve_type, max);
            lum.iter().map(|&v| own[v.round() as usize]).collect()
        })
    }

    pub fn lut8(&self) -> [Vec<u8>; 3] {
        self.composed(BitDepth::Eight)
            .map(|t| t.into_iter().map(|v| v.round() as u8).collect())
    }

    pub fn lut16(&self) -> [Vec<u16>; 3] {
        self.composed(BitDepth::Sixteen)
            .map(|t| t.into_iter().map(|v| v.round() as u16).collect())
    }
}

pub struct CurvesFilter {
    settings: CurvesSettings,
}

impl CurvesFilter {
    pub fn new(settings: CurvesSettings) -> Result<Self> {
        for channel in [
            CurveChannel::Luminosity,
            CurveChannel::Red,
            CurveChannel::Green,
            CurveChannel::Blue,
        ] {
            if settings.points(channel).iter().any(|&(x, y)| x < 0 || y < 0) {
                return Err(PipelineError::InvalidParameters(format!(
                    "negative control point in {:?} curve",
                    channel
                )));
            }
        }
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &CurvesSettings {
        &self.settings
    }
}

impl ThreadedFilter for CurvesFilter {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn filter_image(&mut self, src: &PixelBuffer, ctx: &FilterContext<'_>) -> Result<PixelBuffer> {
        debug!(curve_type = ?self.settings.curve_type, "Applying curves");
        let channels = src.channels();
        let (lut8, lut16) = if src.is_sixteen_bit() {
            (Default::default(), self.settings.lut16())
        } else {
            (self.settings.lut8(), Default::default())
        };
        let lut8: [Vec<u8>; 3] = lut8;
        let lut16: [Vec<u16>; 3] = lut16;
        map_rows(
            src,
            ctx,
            |row| {
                for px in row.chunks_exact_mut(channels) {
                    for c in 0..3 {
                        px[c] = lut8[c][px[c] as usize];
                    }
                }
            },
            |row| {
                for px in row.chunks_exact_mut(channels) {
                    for c in 0..3 {
                        px[c] = lut16[c][px[c] as usize];
                    }
                }
            },
        )
    }
}

impl RegisteredFilter for CurvesFilter {
    const ID: &'static str = "curves";
    const NAME: &'static str = "Adjust Curves";
    const VERSIONS: &'static [u32] = &[1];

    fn from_params(params: &FilterParams) -> Result<Self> {
        let curve_type = match params.text("type")? {
            None | Some("smooth") => CurveType::Smooth,
            Some("free") => CurveType::Free,
            Some(other) => {
                return Err(PipelineError::InvalidParameters(format!("curve type {:?}", other)));
            }
        };
        Self::new(CurvesSettings {
            curve_type,
            luminosity: params.points("points")?,
            red: params.points("red")?,
            green: params.points("green")?,
            blue: params.points("blue")?,
        })
    }
}
