//! Value types shared by pixel buffers and filters.

use serde::{Deserialize, Serialize};

/// Bits stored per colour channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitDepth {
    Eight,
    Sixteen,
}

impl BitDepth {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(BitDepth::Eight),
            16 => Some(BitDepth::Sixteen),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
        }
    }

    pub fn bytes_per_channel(self) -> usize {
        match self {
            BitDepth::Eight => 1,
            BitDepth::Sixteen => 2,
        }
    }

    /// Largest representable channel value.
    pub fn max_value(self) -> u16 {
        match self {
            BitDepth::Eight => 255,
            BitDepth::Sixteen => 65535,
        }
    }

    pub fn is_sixteen(self) -> bool {
        self == BitDepth::Sixteen
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectMode {
    /// Stretch to exactly the requested size.
    #[default]
    Free,
    /// Fit inside the requested size, preserving aspect ratio.
    KeepAspect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }
}

/// A single pixel in internal blue-green-red-alpha order.
///
/// Channel values are in the range of the depth named by `sixteen_bit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub blue: u16,
    pub green: u16,
    pub red: u16,
    pub alpha: u16,
    pub sixteen_bit: bool,
}

impl Color {
    pub fn new(red: u16, green: u16, blue: u16, alpha: u16, sixteen_bit: bool) -> Self {
        Self {
            blue,
            green,
            red,
            alpha,
            sixteen_bit,
        }
    }

    pub fn opaque(red: u16, green: u16, blue: u16, depth: BitDepth) -> Self {
        Self::new(red, green, blue, depth.max_value(), depth.is_sixteen())
    }

    pub fn depth(&self) -> BitDepth {
        if self.sixteen_bit {
            BitDepth::Sixteen
        } else {
            BitDepth::Eight
        }
    }

    /// Rescales the colour to another depth using the 257 multiplier.
    pub fn to_depth(self, depth: BitDepth) -> Color {
        match (self.depth(), depth) {
            (BitDepth::Eight, BitDepth::Sixteen) => Color::new(
                widen(self.red),
                widen(self.green),
                widen(self.blue),
                widen(self.alpha),
                true,
            ),
            (BitDepth::Sixteen, BitDepth::Eight) => Color::new(
                narrow(self.red),
                narrow(self.green),
                narrow(self.blue),
                narrow(self.alpha),
                false,
            ),
            _ => self,
        }
    }
}

/// 8-bit to 16-bit channel widening: 255 maps to 65535 exactly.
pub(crate) fn widen(value: u16) -> u16 {
    value.min(255) * 257
}

/// 16-bit to 8-bit channel narrowing, truncating.
pub(crate) fn narrow(value: u16) -> u16 {
    ((value as u32 * 255) / 65535) as u16
}

/// Free-form attribute values attached by loaders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        AttributeValue::Int(value as i64)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}
