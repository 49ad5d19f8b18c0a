//! Lens correction in three sequential stages: lateral chromatic aberration,
//! vignetting, then geometric distortion.
//!
//! Each stage is its own [`ThreadedFilter`] run in slave mode inside the
//! master filter, reading the previous stage's output and owning an even
//! share of the master's progress range.

use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use crate::image_pipeline::buffer::{PixelBuffer, PixelSamples, try_alloc};
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::filter::params::FilterParams;
use crate::image_pipeline::filter::registry::RegisteredFilter;
use crate::image_pipeline::filter::threaded::{FilterContext, ThreadedFilter};

/// Radial scale `k0 + k1 * r^2` applied to one colour plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TcaModel {
    pub red: [f64; 2],
    pub blue: [f64; 2],
}

/// Polynomial lens model. Radii are normalised to half the shorter image side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LensProfile {
    pub tca: Option<TcaModel>,
    /// `k1, k2, k3` of the falloff `1 + k1 r^2 + k2 r^4 + k3 r^6`.
    pub vignetting: Option<[f64; 3]>,
    /// PTLens `a, b, c`: `r_src = r (a r^3 + b r^2 + c r + 1 - a - b - c)`.
    pub distortion: Option<[f64; 3]>,
}

impl LensProfile {
    pub fn stage_count(&self) -> usize {
        [self.tca.is_some(), self.vignetting.is_some(), self.distortion.is_some()]
            .iter()
            .filter(|&&on| on)
            .count()
    }
}

/// Maps pixel coordinates to normalised offsets from the optical centre.
#[derive(Debug, Clone, Copy)]
struct Geometry {
    cx: f64,
    cy: f64,
    norm: f64,
}

impl Geometry {
    fn of(width: u32, height: u32) -> Self {
        let (w, h) = (width as f64, height as f64);
        Self {
            cx: (w - 1.0) / 2.0,
            cy: (h - 1.0) / 2.0,
            norm: (w.min(h) / 2.0).max(1.0),
        }
    }

    fn normalise(&self, x: u32, y: u32) -> (f64, f64) {
        ((x as f64 - self.cx) / self.norm, (y as f64 - self.cy) / self.norm)
    }

    /// Back to pixel coordinates after scaling the offset by `scale`.
    fn source(&self, nx: f64, ny: f64, scale: f64) -> (f32, f32) {
        (
            (self.cx + nx * scale * self.norm) as f32,
            (self.cy + ny * scale * self.norm) as f32,
        )
    }
}

/// Storage sample the stages read and write in place.
trait Sample: Copy + Default + Into<f32> {
    fn from_rounded(value: f64) -> Self;
}

impl Sample for u8 {
    fn from_rounded(value: f64) -> Self {
        value.round().clamp(0.0, u8::MAX as f64) as u8
    }
}

impl Sample for u16 {
    fn from_rounded(value: f64) -> Self {
        value.round().clamp(0.0, u16::MAX as f64) as u16
    }
}

/// Read-only view of the stage input at one depth.
struct Plane<'a, T> {
    data: &'a [T],
    width: u32,
    height: u32,
    channels: usize,
}

impl<T: Sample> Plane<'_, T> {
    fn at(&self, x: u32, y: u32, channel: usize) -> T {
        self.data[(y as usize * self.width as usize + x as usize) * self.channels + channel]
    }

    /// Bilinear sample of one channel; zero when `(x, y)` lies more than half
    /// a pixel outside the image.
    fn bilinear(&self, x: f32, y: f32, channel: usize) -> T {
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        if !(-0.5..=max_x + 0.5).contains(&x) || !(-0.5..=max_y + 0.5).contains(&y) {
            return T::default();
        }
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);
        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let at = |x, y| -> f32 { self.at(x, y, channel).into() };
        let top = at(x0, y0) + (at(x1, y0) - at(x0, y0)) * fx;
        let bottom = at(x0, y1) + (at(x1, y1) - at(x0, y1)) * fx;
        T::from_rounded(f64::from(top + (bottom - top) * fy))
    }
}

/// One correction, computed a destination row at a time.
///
/// `row` arrives holding the source row, so a stage only writes the samples
/// it changes.
trait RowStage {
    fn fill_row<T: Sample>(&self, src: &Plane<'_, T>, geo: &Geometry, y: u32, row: &mut [T]);
}

/// Runs `stage` over every row of `src` at its native depth, polling
/// cancellation once per row.
fn run_rows<S: RowStage>(stage: &S, src: &PixelBuffer, ctx: &FilterContext<'_>) -> Result<PixelBuffer> {
    let samples = match src.samples() {
        PixelSamples::Eight(data) => PixelSamples::Eight(fill_rows(stage, src, data, ctx)?),
        PixelSamples::Sixteen(data) => PixelSamples::Sixteen(fill_rows(stage, src, data, ctx)?),
    };
    let mut dest = PixelBuffer::from_samples(src.width(), src.height(), src.has_alpha(), samples)?;
    dest.copy_metadata_from(src);
    Ok(dest)
}

fn fill_rows<S: RowStage, T: Sample>(
    stage: &S,
    src: &PixelBuffer,
    data: &[T],
    ctx: &FilterContext<'_>,
) -> Result<Vec<T>> {
    let plane = Plane {
        data,
        width: src.width(),
        height: src.height(),
        channels: src.channels(),
    };
    let geo = Geometry::of(src.width(), src.height());
    let mut out = try_alloc::<T>(data.len())?;
    out.copy_from_slice(data);
    for (y, row) in out.chunks_exact_mut(src.row_len()).enumerate() {
        ctx.scanline(y as u32, src.height())?;
        stage.fill_row(&plane, &geo, y as u32, row);
    }
    Ok(out)
}

pub struct TcaStage(pub TcaModel);

impl RowStage for TcaStage {
    fn fill_row<T: Sample>(&self, src: &Plane<'_, T>, geo: &Geometry, y: u32, row: &mut [T]) {
        let model = self.0;
        for (x, px) in (0..).zip(row.chunks_exact_mut(src.channels)) {
            let (nx, ny) = geo.normalise(x, y);
            let r2 = nx * nx + ny * ny;
            let (rx, ry) = geo.source(nx, ny, model.red[0] + model.red[1] * r2);
            let (bx, by) = geo.source(nx, ny, model.blue[0] + model.blue[1] * r2);
            px[2] = src.bilinear(rx, ry, 2);
            px[0] = src.bilinear(bx, by, 0);
        }
    }
}

impl ThreadedFilter for TcaStage {
    fn id(&self) -> &'static str {
        "lenscorrection.tca"
    }

    fn filter_image(&mut self, src: &PixelBuffer, ctx: &FilterContext<'_>) -> Result<PixelBuffer> {
        run_rows(self, src, ctx)
    }
}

pub struct VignettingStage(pub [f64; 3]);

impl RowStage for VignettingStage {
    fn fill_row<T: Sample>(&self, src: &Plane<'_, T>, geo: &Geometry, y: u32, row: &mut [T]) {
        let [k1, k2, k3] = self.0;
        for (x, px) in (0..).zip(row.chunks_exact_mut(src.channels)) {
            let (nx, ny) = geo.normalise(x, y);
            let r2 = nx * nx + ny * ny;
            let falloff = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;
            let gain = if falloff > 1e-6 { 1.0 / falloff } else { 1.0 };
            for sample in &mut px[..3] {
                let value: f32 = (*sample).into();
                *sample = T::from_rounded(f64::from(value) * gain);
            }
        }
    }
}

impl ThreadedFilter for VignettingStage {
    fn id(&self) -> &'static str {
        "lenscorrection.vignetting"
    }

    fn filter_image(&mut self, src: &PixelBuffer, ctx: &FilterContext<'_>) -> Result<PixelBuffer> {
        run_rows(self, src, ctx)
    }
}

pub struct DistortionStage(pub [f64; 3]);

impl RowStage for DistortionStage {
    fn fill_row<T: Sample>(&self, src: &Plane<'_, T>, geo: &Geometry, y: u32, row: &mut [T]) {
        let [a, b, c] = self.0;
        let d = 1.0 - a - b - c;
        for (x, px) in (0..).zip(row.chunks_exact_mut(src.channels)) {
            let (nx, ny) = geo.normalise(x, y);
            let r = (nx * nx + ny * ny).sqrt();
            let scale = a * r * r * r + b * r * r + c * r + d;
            let (sx, sy) = geo.source(nx, ny, scale);
            for (channel, sample) in px.iter_mut().enumerate() {
                *sample = src.bilinear(sx, sy, channel);
            }
        }
    }
}

impl ThreadedFilter for DistortionStage {
    fn id(&self) -> &'static str {
        "lenscorrection.distortion"
    }

    fn filter_image(&mut self, src: &PixelBuffer, ctx: &FilterContext<'_>) -> Result<PixelBuffer> {
        run_rows(self, src, ctx)
    }
}

pub struct LensCorrectionFilter {
    profile: LensProfile,
}

impl LensCorrectionFilter {
    pub fn new(profile: LensProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &LensProfile {
        &self.profile
    }

    fn stages(&self) -> Vec<Box<dyn ThreadedFilter>> {
        let mut stages: Vec<Box<dyn ThreadedFilter>> = Vec::new();
        if let Some(tca) = self.profile.tca {
            stages.push(Box::new(TcaStage(tca)));
        }
        if let Some(vignetting) = self.profile.vignetting {
            stages.push(Box::new(VignettingStage(vignetting)));
        }
        if let Some(distortion) = self.profile.distortion {
            stages.push(Box::new(DistortionStage(distortion)));
        }
        stages
    }
}

impl ThreadedFilter for LensCorrectionFilter {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn filter_image(&mut self, src: &PixelBuffer, ctx: &FilterContext<'_>) -> Result<PixelBuffer> {
        let stages = self.stages();
        if stages.is_empty() {
            debug!("Lens profile has no corrections");
            return src.copy();
        }
        let steps = stages.len() as f32;
        let mut current: Option<PixelBuffer> = None;
        for (i, mut stage) in stages.into_iter().enumerate() {
            let _span = info_span!("lens_stage", stage = stage.id()).entered();
            let slave = ctx.slave(i as f32 * 100.0 / steps, (i + 1) as f32 * 100.0 / steps);
            let input = current.as_ref().unwrap_or(src);
            current = Some(stage.filter_image(input, &slave)?);
        }
        current.ok_or_else(|| PipelineError::Failed("lens correction produced no image".to_string()))
    }
}

fn pair(params: &FilterParams, key: &str) -> Result<Option<[f64; 2]>> {
    match params.list(key)?.as_slice() {
        [] => Ok(None),
        [a, b] => Ok(Some([*a, *b])),
        _ => Err(PipelineError::InvalidParameters(format!("{} needs 2 coefficients", key))),
    }
}

fn triple(params: &FilterParams, key: &str) -> Result<Option<[f64; 3]>> {
    match params.list(key)?.as_slice() {
        [] => Ok(None),
        [a, b, c] => Ok(Some([*a, *b, *c])),
        _ => Err(PipelineError::InvalidParameters(format!("{} needs 3 coefficients", key))),
    }
}

impl RegisteredFilter for LensCorrectionFilter {
    const ID: &'static str = "lenscorrection";
    const NAME: &'static str = "Lens Auto-Correction Tool";
    const VERSIONS: &'static [u32] = &[1];

    fn from_params(params: &FilterParams) -> Result<Self> {
        let tca = match (pair(params, "tca_red")?, pair(params, "tca_blue")?) {
            (None, None) => None,
            (red, blue) => Some(TcaModel {
                red: red.unwrap_or([1.0, 0.0]),
                blue: blue.unwrap_or([1.0, 0.0]),
            }),
        };
        Ok(Self::new(LensProfile {
            tca,
            vignetting: triple(params, "vignetting")?,
            distortion: triple(params, "distortion")?,
        }))
    }
}
