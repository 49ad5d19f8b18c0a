//! Colour-profile tags and the colour-management seam.
//!
//! ICC maths is delegated to a [`ColorTransform`] implementation. The crate
//! ships [`AssignProfileOnly`], which re-tags buffers without touching pixels.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::image_pipeline::buffer::PixelBuffer;
use crate::image_pipeline::common::{LoaderObserver, Result};

/// Profile attached to a [`PixelBuffer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorProfile {
    Srgb,
    AdobeRgb,
    WideGamut,
    ProPhoto,
    /// ICC profile on disk.
    File(PathBuf),
    /// ICC bytes embedded in the source file.
    Embedded(Vec<u8>),
}

const BUILTIN_FILES: [(&str, ColorProfile); 4] = [
    ("srgb.icm", ColorProfile::Srgb),
    ("adobergb.icm", ColorProfile::AdobeRgb),
    ("widegamut.icm", ColorProfile::WideGamut),
    ("prophoto.icm", ColorProfile::ProPhoto),
];

impl ColorProfile {
    /// File name the colour-management store uses for the built-in profiles.
    pub fn builtin_file_name(&self) -> Option<&'static str> {
        BUILTIN_FILES
            .iter()
            .find(|(_, profile)| profile == self)
            .map(|(name, _)| *name)
    }

    /// Maps a profile path back onto one of the four built-ins, if it is one.
    pub fn match_builtin(path: &Path) -> Option<ColorProfile> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        BUILTIN_FILES
            .iter()
            .find(|(file, _)| *file == name)
            .map(|(_, profile)| profile.clone())
    }

    pub fn is_builtin(&self) -> bool {
        self.builtin_file_name().is_some()
    }

    pub fn description(&self) -> String {
        match self {
            ColorProfile::Srgb => "sRGB".to_string(),
            ColorProfile::AdobeRgb => "Adobe RGB".to_string(),
            ColorProfile::WideGamut => "Wide Gamut RGB".to_string(),
            ColorProfile::ProPhoto => "ProPhoto RGB".to_string(),
            ColorProfile::File(path) => path.display().to_string(),
            ColorProfile::Embedded(bytes) => format!("embedded ICC ({} bytes)", bytes.len()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenderingIntent {
    #[default]
    Perceptual,
    RelativeColorimetric,
    Saturation,
    AbsoluteColorimetric,
}

/// Colour-management collaborator.
pub trait ColorTransform: Send + Sync {
    fn apply(
        &self,
        buffer: &mut PixelBuffer,
        source: &ColorProfile,
        dest: &ColorProfile,
        intent: RenderingIntent,
        observer: Option<&dyn LoaderObserver>,
    ) -> Result<()>;
}

/// Re-tags the buffer with the destination profile and leaves pixels untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssignProfileOnly;

impl ColorTransform for AssignProfileOnly {
    fn apply(
        &self,
        buffer: &mut PixelBuffer,
        source: &ColorProfile,
        dest: &ColorProfile,
        intent: RenderingIntent,
        _observer: Option<&dyn LoaderObserver>,
    ) -> Result<()> {
        warn!(
            source = %source.description(),
            dest = %dest.description(),
            ?intent,
            "No ICC engine configured, assigning profile without conversion"
        );
        buffer.set_icc_profile(Some(dest.clone()));
        Ok(())
    }
}
