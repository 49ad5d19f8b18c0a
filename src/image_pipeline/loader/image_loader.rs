use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use tempfile::Builder;
use tracing::debug;

use crate::image_pipeline::buffer::PixelBuffer;
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::common::observer::LoaderObserver;
use crate::image_pipeline::loader::types::{DecodeOptions, EncodeOptions, ImageFormat, ImageInfo};

/// Bytes read from the start of a file for signature sniffing.
pub const SIGNATURE_LEN: usize = 16;

/// One on-disk encoding, turned into a [`PixelBuffer`] and, unless the
/// loader is read-only, back again.
pub trait ImageLoader: Send + Sync {
    fn format(&self) -> ImageFormat;

    /// Lower-case file extensions, without the dot.
    fn extensions(&self) -> &'static [&'static str];

    /// Whether `header`, the first bytes of a file, carries this encoding's magic.
    fn matches_signature(&self, header: &[u8]) -> bool;

    /// Signature check, falling back to the extension. Never decodes.
    fn probe(&self, path: &Path) -> bool {
        match read_signature(path) {
            Ok(header) if self.matches_signature(&header) => true,
            _ => extension_of(path).is_some_and(|ext| self.extensions().contains(&ext.as_str())),
        }
    }

    fn identify(&self, path: &Path) -> Result<ImageInfo>;

    /// Decodes `path`, polling `observer` for cancellation and reporting
    /// progress in `[0, 1]`. A failed or cancelled decode returns no buffer.
    fn decode(
        &self,
        path: &Path,
        options: &DecodeOptions,
        observer: Option<&dyn LoaderObserver>,
    ) -> Result<PixelBuffer>;

    fn encode(&self, buffer: &PixelBuffer, path: &Path, options: &EncodeOptions) -> Result<()> {
        let _ = (buffer, path, options);
        Err(PipelineError::ReadOnly(self.format().name()))
    }

    fn is_read_only(&self) -> bool {
        false
    }
}

pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Up to [`SIGNATURE_LEN`] leading bytes of `path`.
pub fn read_signature(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path)
        .map_err(|e| PipelineError::InputReadError(format!("{}: {}", path.display(), e)))?;
    let mut header = Vec::with_capacity(SIGNATURE_LEN);
    file.take(SIGNATURE_LEN as u64).read_to_end(&mut header)?;
    Ok(header)
}

/// Runs `write` against a temporary file next to `path`, then renames it over
/// `path`. On any failure the temporary is removed and `path` is untouched.
pub(crate) fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<()>,
{
    let output_error = |e: std::io::Error| PipelineError::OutputWriteError(format!("{}: {}", path.display(), e));
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut builder = Builder::new();
    builder.prefix(".dimg-").suffix(".part");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Same mode a plain create would get once the umask applies.
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    let mut temp = builder.tempfile_in(dir).map_err(output_error)?;

    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        write(&mut writer)?;
        writer.flush().map_err(output_error)?;
    }
    debug!(temp = %temp.path().display(), "Replacing output");
    temp.persist(path).map_err(|e| output_error(e.error))?;
    Ok(())
}
