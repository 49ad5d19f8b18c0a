use std::collections::BTreeMap;

use tracing::debug;

use crate::image_pipeline::buffer::types::{AttributeValue, BitDepth, Color, Rect, narrow, widen};
use crate::image_pipeline::color::ColorProfile;
use crate::image_pipeline::common::error::{PipelineError, Result};

/// Channel storage, one variant per bit depth.
///
/// Samples are interleaved blue, green, red and, when present, alpha.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelSamples {
    Eight(Vec<u8>),
    Sixteen(Vec<u16>),
}

impl PixelSamples {
    pub fn len(&self) -> usize {
        match self {
            PixelSamples::Eight(data) => data.len(),
            PixelSamples::Sixteen(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bit-depth polymorphic in-memory image.
///
/// The sample vector always holds exactly `width * height * channels` values,
/// so `byte_size()` is `width * height * bytes_per_pixel()`. Operations that
/// change geometry or depth build a new buffer and never resize this one.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    has_alpha: bool,
    samples: PixelSamples,
    icc_profile: Option<ColorProfile>,
    attributes: BTreeMap<String, AttributeValue>,
}

/// Reserves and zero-fills `len` elements, reporting allocation failure
/// instead of aborting.
pub(crate) fn try_alloc<T: Clone + Default>(len: usize) -> Result<Vec<T>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|_| {
        PipelineError::OutOfMemory(len.saturating_mul(std::mem::size_of::<T>()))
    })?;
    data.resize(len, T::default());
    Ok(data)
}

fn sample_count(width: u32, height: u32, has_alpha: bool) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(PipelineError::InvalidDimensions(width, height));
    }
    let channels = if has_alpha { 4usize } else { 3 };
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(channels))
        .ok_or(PipelineError::OutOfMemory(usize::MAX))
}

impl PixelBuffer {
    pub fn allocate(width: u32, height: u32, depth: BitDepth, has_alpha: bool) -> Result<Self> {
        let len = sample_count(width, height, has_alpha)?;
        let samples = match depth {
            BitDepth::Eight => PixelSamples::Eight(try_alloc(len)?),
            BitDepth::Sixteen => PixelSamples::Sixteen(try_alloc(len)?),
        };
        debug!(width, height, bits = depth.bits(), has_alpha, "Allocated pixel buffer");
        Ok(Self {
            width,
            height,
            has_alpha,
            samples,
            icc_profile: None,
            attributes: BTreeMap::new(),
        })
    }

    /// Wraps already interleaved BGR(A) samples, validating their length.
    pub fn from_samples(
        width: u32,
        height: u32,
        has_alpha: bool,
        samples: PixelSamples,
    ) -> Result<Self> {
        let len = sample_count(width, height, has_alpha)?;
        if samples.len() != len {
            return Err(PipelineError::InvalidParameters(format!(
                "expected {} samples for {}x{}, got {}",
                len,
                width,
                height,
                samples.len()
            )));
        }
        Ok(Self {
            width,
            height,
            has_alpha,
            samples,
            icc_profile: None,
            attributes: BTreeMap::new(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    pub fn depth(&self) -> BitDepth {
        match self.samples {
            PixelSamples::Eight(_) => BitDepth::Eight,
            PixelSamples::Sixteen(_) => BitDepth::Sixteen,
        }
    }

    pub fn is_sixteen_bit(&self) -> bool {
        self.depth().is_sixteen()
    }

    pub fn channels(&self) -> usize {
        if self.has_alpha { 4 } else { 3 }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.channels() * self.depth().bytes_per_channel()
    }

    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_pixel()
    }

    /// Samples per row.
    pub fn row_len(&self) -> usize {
        self.width as usize * self.channels()
    }

    pub fn samples(&self) -> &PixelSamples {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut PixelSamples {
        &mut self.samples
    }

    /// Raw bytes in native endianness, for painting and encoders.
    pub fn bytes(&self) -> &[u8] {
        match &self.samples {
            PixelSamples::Eight(data) => data,
            PixelSamples::Sixteen(data) => bytemuck::cast_slice(data),
        }
    }

    pub fn icc_profile(&self) -> Option<&ColorProfile> {
        self.icc_profile.as_ref()
    }

    pub fn set_icc_profile(&mut self, profile: Option<ColorProfile>) {
        self.icc_profile = profile;
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    /// Carries profile and attributes over from the buffer this one was derived from.
    pub fn copy_metadata_from(&mut self, other: &PixelBuffer) {
        self.icc_profile = other.icc_profile.clone();
        self.attributes = other.attributes.clone();
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.channels()
    }

    /// Pixel at `(x, y)`. Buffers without alpha report a fully opaque alpha.
    pub fn pixel(&self, x: u32, y: u32) -> Color {
        let i = self.offset(x, y);
        match &self.samples {
            PixelSamples::Eight(data) => Color {
                blue: data[i] as u16,
                green: data[i + 1] as u16,
                red: data[i + 2] as u16,
                alpha: if self.has_alpha { data[i + 3] as u16 } else { 255 },
                sixteen_bit: false,
            },
            PixelSamples::Sixteen(data) => Color {
                blue: data[i],
                green: data[i + 1],
                red: data[i + 2],
                alpha: if self.has_alpha { data[i + 3] } else { 65535 },
                sixteen_bit: true,
            },
        }
    }

    /// Writes a pixel, rescaling the colour if its depth differs from the buffer's.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Color) {
        let color = color.to_depth(self.depth());
        let i = self.offset(x, y);
        let has_alpha = self.has_alpha;
        match &mut self.samples {
            PixelSamples::Eight(data) => {
                data[i] = color.blue as u8;
                data[i + 1] = color.green as u8;
                data[i + 2] = color.red as u8;
                if has_alpha {
                    data[i + 3] = color.alpha as u8;
                }
            }
            PixelSamples::Sixteen(data) => {
                data[i] = color.blue;
                data[i + 1] = color.green;
                data[i + 2] = color.red;
                if has_alpha {
                    data[i + 3] = color.alpha;
                }
            }
        }
    }

    pub fn fill(&mut self, color: Color) {
        let color = color.to_depth(self.depth());
        let channels = self.channels();
        match &mut self.samples {
            PixelSamples::Eight(data) => {
                let px = [
                    color.blue as u8,
                    color.green as u8,
                    color.red as u8,
                    color.alpha as u8,
                ];
                for chunk in data.chunks_exact_mut(channels) {
                    chunk.copy_from_slice(&px[..channels]);
                }
            }
            PixelSamples::Sixteen(data) => {
                let px = [color.blue, color.green, color.red, color.alpha];
                for chunk in data.chunks_exact_mut(channels) {
                    chunk.copy_from_slice(&px[..channels]);
                }
            }
        }
    }

    /// Deep copy, reporting allocation failure.
    pub fn copy(&self) -> Result<PixelBuffer> {
        let samples = match &self.samples {
            PixelSamples::Eight(data) => {
                let mut out = try_alloc::<u8>(data.len())?;
                out.copy_from_slice(data);
                PixelSamples::Eight(out)
            }
            PixelSamples::Sixteen(data) => {
                let mut out = try_alloc::<u16>(data.len())?;
                out.copy_from_slice(data);
                PixelSamples::Sixteen(out)
            }
        };
        Ok(PixelBuffer {
            width: self.width,
            height: self.height,
            has_alpha: self.has_alpha,
            samples,
            icc_profile: self.icc_profile.clone(),
            attributes: self.attributes.clone(),
        })
    }

    pub fn copy_region(&self, rect: Rect) -> Result<PixelBuffer> {
        if rect.width == 0
            || rect.height == 0
            || rect.right() > self.width as u64
            || rect.bottom() > self.height as u64
        {
            return Err(PipelineError::InvalidParameters(format!(
                "region {:?} outside {}x{} image",
                rect, self.width, self.height
            )));
        }
        let mut out = PixelBuffer::allocate(rect.width, rect.height, self.depth(), self.has_alpha)?;
        out.copy_metadata_from(self);
        let src_row = self.row_len();
        let dst_row = out.row_len();
        let x0 = rect.x as usize * self.channels();
        match (&self.samples, &mut out.samples) {
            (PixelSamples::Eight(src), PixelSamples::Eight(dst)) => {
                for (row, dst_line) in dst.chunks_exact_mut(dst_row).enumerate() {
                    let start = (rect.y as usize + row) * src_row + x0;
                    dst_line.copy_from_slice(&src[start..start + dst_row]);
                }
            }
            (PixelSamples::Sixteen(src), PixelSamples::Sixteen(dst)) => {
                for (row, dst_line) in dst.chunks_exact_mut(dst_row).enumerate() {
                    let start = (rect.y as usize + row) * src_row + x0;
                    dst_line.copy_from_slice(&src[start..start + dst_row]);
                }
            }
            _ => unreachable!("region copy keeps the source depth"),
        }
        Ok(out)
    }

    /// Alpha-aware blit of `self` onto `dest` with its top-left corner at `(x, y)`.
    ///
    /// Parts falling outside `dest` are clipped. Depths are reconciled per pixel.
    pub fn composite_into(&self, dest: &mut PixelBuffer, x: i64, y: i64) {
        let dest_max = dest.depth().max_value() as u32;
        for sy in 0..self.height {
            let dy = y + sy as i64;
            if dy < 0 || dy >= dest.height as i64 {
                continue;
            }
            for sx in 0..self.width {
                let dx = x + sx as i64;
                if dx < 0 || dx >= dest.width as i64 {
                    continue;
                }
                let src = self.pixel(sx, sy).to_depth(dest.depth());
                if !self.has_alpha || src.alpha as u32 == dest_max {
                    dest.set_pixel(dx as u32, dy as u32, src);
                    continue;
                }
                let dst = dest.pixel(dx as u32, dy as u32);
                let a = src.alpha as u32;
                let inv = dest_max - a;
                let blend = |s: u16, d: u16| ((s as u32 * a + d as u32 * inv) / dest_max) as u16;
                let out = Color {
                    blue: blend(src.blue, dst.blue),
                    green: blend(src.green, dst.green),
                    red: blend(src.red, dst.red),
                    alpha: (a + dst.alpha as u32 * inv / dest_max) as u16,
                    sixteen_bit: dest.is_sixteen_bit(),
                };
                dest.set_pixel(dx as u32, dy as u32, out);
            }
        }
    }

    /// Rescales every sample to `target` depth into a new buffer.
    ///
    /// 8 to 16 multiplies by 257; 16 to 8 truncates precision. An 8-bit buffer
    /// survives 8 -> 16 -> 8 unchanged, a 16-bit one does not survive 16 -> 8 -> 16.
    pub fn convert_depth(&self, target: BitDepth) -> Result<PixelBuffer> {
        if target == self.depth() {
            return self.copy();
        }
        let samples = match &self.samples {
            PixelSamples::Eight(src) => {
                let mut out = try_alloc::<u16>(src.len())?;
                for (d, &s) in out.iter_mut().zip(src) {
                    *d = widen(s as u16);
                }
                PixelSamples::Sixteen(out)
            }
            PixelSamples::Sixteen(src) => {
                let mut out = try_alloc::<u8>(src.len())?;
                for (d, &s) in out.iter_mut().zip(src) {
                    *d = narrow(s) as u8;
                }
                PixelSamples::Eight(out)
            }
        };
        let mut out = PixelBuffer::from_samples(self.width, self.height, self.has_alpha, samples)?;
        out.copy_metadata_from(self);
        Ok(out)
    }
}
