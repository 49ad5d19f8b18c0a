//! Geometry operations. Each one builds a fresh buffer and leaves the source untouched.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Pixel, Rgb, Rgba};
use tracing::debug;

use crate::image_pipeline::buffer::pixel_buffer::{PixelBuffer, PixelSamples, try_alloc};
use crate::image_pipeline::buffer::types::{AspectMode, Color, Rect};
use crate::image_pipeline::common::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Rotate90,
    Rotate180,
    Rotate270,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flip {
    Horizontal,
    Vertical,
}

/// Lanczos3 over a single line of `len` pixels.
fn resample_line<P>(data: &[P::Subpixel], len: u32, new_len: u32) -> Result<Vec<P::Subpixel>>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    let view = ImageBuffer::<P, &[P::Subpixel]>::from_raw(len, 1, data)
        .ok_or_else(|| PipelineError::Failed("resampler rejected buffer layout".to_string()))?;
    Ok(imageops::resize(&view, new_len, 1, FilterType::Lanczos3).into_raw())
}

/// Separable resampling: every source row horizontally, then every
/// destination column vertically. `checkpoint(line, lines)` runs before
/// each line of either pass.
fn resample<P, C>(
    width: u32,
    height: u32,
    data: &[P::Subpixel],
    nw: u32,
    nh: u32,
    checkpoint: &mut C,
) -> Result<Vec<P::Subpixel>>
where
    P: Pixel + 'static,
    P::Subpixel: 'static + Default,
    C: FnMut(u32, u32) -> Result<()>,
{
    let channels = usize::from(P::CHANNEL_COUNT);
    let lines = height.saturating_add(nw);
    let (src_row, wide_row) = (width as usize * channels, nw as usize * channels);

    let mut wide = try_alloc::<P::Subpixel>(wide_row * height as usize)?;
    for (y, (src, dst)) in data
        .chunks_exact(src_row)
        .zip(wide.chunks_exact_mut(wide_row))
        .enumerate()
    {
        checkpoint(y as u32, lines)?;
        dst.copy_from_slice(&resample_line::<P>(src, width, nw)?);
    }

    let mut out = try_alloc::<P::Subpixel>(wide_row * nh as usize)?;
    let mut column = Vec::with_capacity(height as usize * channels);
    for x in 0..nw as usize {
        checkpoint(height + x as u32, lines)?;
        column.clear();
        for row in wide.chunks_exact(wide_row) {
            column.extend_from_slice(&row[x * channels..(x + 1) * channels]);
        }
        let scaled = resample_line::<P>(&column, height, nh)?;
        for (row, px) in out.chunks_exact_mut(wide_row).zip(scaled.chunks_exact(channels)) {
            row[x * channels..(x + 1) * channels].copy_from_slice(px);
        }
    }
    Ok(out)
}

/// Copies pixels into a `nw`x`nh` target, `map` giving the source coordinate
/// for every destination coordinate.
fn remap<T, F>(src: &[T], width: u32, channels: usize, nw: u32, nh: u32, map: F) -> Result<Vec<T>>
where
    T: Copy + Default,
    F: Fn(u32, u32) -> (u32, u32),
{
    let mut out = try_alloc::<T>(nw as usize * nh as usize * channels)?;
    for y in 0..nh {
        for x in 0..nw {
            let (sx, sy) = map(x, y);
            let s = (sy as usize * width as usize + sx as usize) * channels;
            let d = (y as usize * nw as usize + x as usize) * channels;
            out[d..d + channels].copy_from_slice(&src[s..s + channels]);
        }
    }
    Ok(out)
}

impl PixelBuffer {
    /// Target dimensions for a scale request, honouring the aspect mode.
    pub fn scaled_size(&self, width: u32, height: u32, mode: AspectMode) -> (u32, u32) {
        match mode {
            AspectMode::Free => (width, height),
            AspectMode::KeepAspect => {
                let sx = width as f64 / self.width() as f64;
                let sy = height as f64 / self.height() as f64;
                let scale = sx.min(sy);
                (
                    ((self.width() as f64 * scale).round() as u32).max(1),
                    ((self.height() as f64 * scale).round() as u32).max(1),
                )
            }
        }
    }

    /// High-quality (Lanczos3) resampling into a new buffer.
    pub fn smooth_scale(&self, width: u32, height: u32, mode: AspectMode) -> Result<PixelBuffer> {
        self.smooth_scale_with(width, height, mode, &mut |_, _| Ok(()))
    }

    /// [`smooth_scale`](Self::smooth_scale) calling `checkpoint(line, lines)`
    /// before each resampled line; an error from it aborts the scale.
    pub fn smooth_scale_with<C>(&self, width: u32, height: u32, mode: AspectMode, checkpoint: &mut C) -> Result<PixelBuffer>
    where
        C: FnMut(u32, u32) -> Result<()>,
    {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidDimensions(width, height));
        }
        let (nw, nh) = self.scaled_size(width, height, mode);
        debug!(from_w = self.width(), from_h = self.height(), nw, nh, "Smooth scaling");

        let (w, h) = (self.width(), self.height());
        let samples = match (self.samples(), self.has_alpha()) {
            (PixelSamples::Eight(data), true) => {
                PixelSamples::Eight(resample::<Rgba<u8>, C>(w, h, data, nw, nh, checkpoint)?)
            }
            (PixelSamples::Eight(data), false) => {
                PixelSamples::Eight(resample::<Rgb<u8>, C>(w, h, data, nw, nh, checkpoint)?)
            }
            (PixelSamples::Sixteen(data), true) => {
                PixelSamples::Sixteen(resample::<Rgba<u16>, C>(w, h, data, nw, nh, checkpoint)?)
            }
            (PixelSamples::Sixteen(data), false) => {
                PixelSamples::Sixteen(resample::<Rgb<u16>, C>(w, h, data, nw, nh, checkpoint)?)
            }
        };

        let mut out = PixelBuffer::from_samples(nw, nh, self.has_alpha(), samples)?;
        out.copy_metadata_from(self);
        Ok(out)
    }

    /// Bilinear sample at fractional coordinates.
    ///
    /// Coordinates more than half a pixel outside the image yield transparent
    /// black; anything closer is clamped onto the border.
    pub fn sub_pixel(&self, x: f32, y: f32) -> Color {
        let max_x = (self.width() - 1) as f32;
        let max_y = (self.height() - 1) as f32;
        if !(-0.5..=max_x + 0.5).contains(&x) || !(-0.5..=max_y + 0.5).contains(&y) {
            return Color {
                sixteen_bit: self.is_sixteen_bit(),
                ..Color::default()
            };
        }
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);
        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(self.width() - 1);
        let y1 = (y0 + 1).min(self.height() - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let p00 = self.pixel(x0, y0);
        let p10 = self.pixel(x1, y0);
        let p01 = self.pixel(x0, y1);
        let p11 = self.pixel(x1, y1);
        let lerp = |a: u16, b: u16, c: u16, d: u16| {
            let top = a as f32 + (b as f32 - a as f32) * fx;
            let bottom = c as f32 + (d as f32 - c as f32) * fx;
            (top + (bottom - top) * fy).round() as u16
        };
        Color {
            blue: lerp(p00.blue, p10.blue, p01.blue, p11.blue),
            green: lerp(p00.green, p10.green, p01.green, p11.green),
            red: lerp(p00.red, p10.red, p01.red, p11.red),
            alpha: lerp(p00.alpha, p10.alpha, p01.alpha, p11.alpha),
            sixteen_bit: self.is_sixteen_bit(),
        }
    }

    pub fn crop(&self, rect: Rect) -> Result<PixelBuffer> {
        self.copy_region(rect)
    }

    pub fn rotate(&self, rotation: Rotation) -> Result<PixelBuffer> {
        let (w, h) = (self.width(), self.height());
        let (nw, nh) = match rotation {
            Rotation::Rotate180 => (w, h),
            Rotation::Rotate90 | Rotation::Rotate270 => (h, w),
        };
        let map = move |x: u32, y: u32| match rotation {
            Rotation::Rotate90 => (y, h - 1 - x),
            Rotation::Rotate180 => (w - 1 - x, h - 1 - y),
            Rotation::Rotate270 => (w - 1 - y, x),
        };
        self.remapped(nw, nh, map)
    }

    pub fn flip(&self, flip: Flip) -> Result<PixelBuffer> {
        let (w, h) = (self.width(), self.height());
        let map = move |x: u32, y: u32| match flip {
            Flip::Horizontal => (w - 1 - x, y),
            Flip::Vertical => (x, h - 1 - y),
        };
        self.remapped(w, h, map)
    }

    fn remapped<F>(&self, nw: u32, nh: u32, map: F) -> Result<PixelBuffer>
    where
        F: Fn(u32, u32) -> (u32, u32),
    {
        let channels = self.channels();
        let samples = match self.samples() {
            PixelSamples::Eight(src) => PixelSamples::Eight(remap(src, self.width(), channels, nw, nh, map)?),
            PixelSamples::Sixteen(src) => PixelSamples::Sixteen(remap(src, self.width(), channels, nw, nh, map)?),
        };
        let mut out = PixelBuffer::from_samples(nw, nh, self.has_alpha(), samples)?;
        out.copy_metadata_from(self);
        Ok(out)
    }
}
