use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, info_span, instrument};

use crate::image_pipeline::buffer::{AspectMode, BitDepth, Flip, PixelBuffer, Rect, Rotation};
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::common::observer::{CancelToken, LoaderObserver};
use crate::image_pipeline::filter::{BcgFilter, BcgSettings, FilterContext, FilterTask, ThreadedFilter};
use crate::image_pipeline::loader::{DecodeOptions, EncodeOptions, LoaderSet};

/// Undo levels kept before the oldest snapshot is dropped.
pub const DEFAULT_UNDO_LEVELS: usize = 32;

#[derive(Debug, Clone)]
struct Snapshot {
    title: String,
    image: Arc<PixelBuffer>,
}

/// One image open for editing.
///
/// Every edit builds a new buffer from the current one and swaps it in only
/// on success; the replaced buffer goes onto the undo stack under the
/// action's title.
pub struct EditSession {
    loaders: LoaderSet,
    path: Option<PathBuf>,
    read_only: bool,
    original: Option<Arc<PixelBuffer>>,
    current: Option<Arc<PixelBuffer>>,
    undo: Vec<Snapshot>,
    redo: Vec<Snapshot>,
    undo_levels: usize,
    modified: bool,
    selection: Option<Rect>,
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new(LoaderSet::standard())
    }
}

impl EditSession {
    pub fn new(loaders: LoaderSet) -> Self {
        Self {
            loaders,
            path: None,
            read_only: false,
            original: None,
            current: None,
            undo: Vec::new(),
            redo: Vec::new(),
            undo_levels: DEFAULT_UNDO_LEVELS,
            modified: false,
            selection: None,
        }
    }

    pub fn with_undo_levels(mut self, levels: usize) -> Self {
        self.undo_levels = levels.max(1);
        self
    }

    /// Replaces the session's image with `image`, as if it had just been loaded.
    pub fn open(&mut self, image: PixelBuffer, path: Option<PathBuf>, read_only: bool) {
        let image = Arc::new(image);
        self.original = Some(Arc::clone(&image));
        self.current = Some(image);
        self.path = path;
        self.read_only = read_only;
        self.undo.clear();
        self.redo.clear();
        self.modified = false;
        self.selection = None;
    }

    /// On failure the previously open image stays open.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(&mut self, path: &Path, options: &DecodeOptions, observer: Option<&dyn LoaderObserver>) -> Result<()> {
        let loader = self.loaders.for_reading(path);
        let read_only = loader.is_read_only();
        let image = loader.decode(path, options, observer)?;
        info!(width = image.width(), height = image.height(), read_only, "Image loaded");
        self.open(image, Some(path.to_path_buf()), read_only);
        Ok(())
    }

    pub fn image(&self) -> Option<&PixelBuffer> {
        self.current.as_deref()
    }

    pub fn original(&self) -> Option<&PixelBuffer> {
        self.original.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether the image came from a loader that cannot write its format back.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Titles of undoable actions, most recent first.
    pub fn undo_history(&self) -> Vec<String> {
        self.undo.iter().rev().map(|s| s.title.clone()).collect()
    }

    /// Titles of redoable actions, next redo first.
    pub fn redo_history(&self) -> Vec<String> {
        self.redo.iter().rev().map(|s| s.title.clone()).collect()
    }

    fn current_arc(&self) -> Result<Arc<PixelBuffer>> {
        self.current
            .clone()
            .ok_or_else(|| PipelineError::InvalidParameters("no image open".to_string()))
    }

    /// Runs `edit` on the current image and swaps the result in.
    pub fn apply<F>(&mut self, title: &str, edit: F) -> Result<()>
    where
        F: FnOnce(&PixelBuffer) -> Result<PixelBuffer>,
    {
        let _span = info_span!("edit", action = title).entered();
        let current = self.current_arc()?;
        let mut result = edit(&current)?;
        if result.attributes().is_empty() {
            result.copy_metadata_from(&current);
        }
        self.push_undo(title, current);
        self.redo.clear();
        self.current = Some(Arc::new(result));
        self.modified = true;
        self.drop_stale_selection();
        debug!(undo = self.undo.len(), "Edit applied");
        Ok(())
    }

    fn push_undo(&mut self, title: &str, image: Arc<PixelBuffer>) {
        self.undo.push(Snapshot {
            title: title.to_string(),
            image,
        });
        if self.undo.len() > self.undo_levels {
            self.undo.remove(0);
        }
    }

    /// Runs `filter` through its init/run lifecycle on the current image.
    pub fn apply_filter(
        &mut self,
        title: &str,
        filter: Box<dyn ThreadedFilter>,
        observer: Option<&dyn LoaderObserver>,
    ) -> Result<()> {
        let source = self.current_arc()?;
        let mut task = FilterTask::new(filter);
        task.init(source)?;
        self.apply(title, |_| {
            let ctx = FilterContext::new(CancelToken::new(), observer);
            task.run(&ctx)
        })
    }

    pub fn rotate(&mut self, rotation: Rotation) -> Result<()> {
        let title = match rotation {
            Rotation::Rotate90 => "Rotate 90",
            Rotation::Rotate180 => "Rotate 180",
            Rotation::Rotate270 => "Rotate 270",
        };
        self.apply(title, |image| image.rotate(rotation))
    }

    pub fn flip(&mut self, flip: Flip) -> Result<()> {
        let title = match flip {
            Flip::Horizontal => "Flip Horizontal",
            Flip::Vertical => "Flip Vertical",
        };
        self.apply(title, |image| image.flip(flip))
    }

    pub fn crop(&mut self, rect: Rect) -> Result<()> {
        self.apply("Crop", |image| image.crop(rect))
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.apply("Resize", |image| image.smooth_scale(width, height, AspectMode::Free))
    }

    pub fn convert_depth(&mut self, depth: BitDepth) -> Result<()> {
        let title = match depth {
            BitDepth::Eight => "Convert to 8 bits",
            BitDepth::Sixteen => "Convert to 16 bits",
        };
        self.apply(title, |image| image.convert_depth(depth))
    }

    pub fn set_bcg(&mut self, brightness: f64, contrast: f64, gamma: f64) -> Result<()> {
        let filter = BcgFilter::new(BcgSettings {
            brightness,
            contrast,
            gamma,
        })?;
        self.apply_filter("Brightness / Contrast / Gamma", Box::new(filter), None)
    }

    pub fn undo(&mut self) -> bool {
        let (Some(snapshot), Some(current)) = (self.undo.pop(), self.current.take()) else {
            return false;
        };
        self.redo.push(Snapshot {
            title: snapshot.title,
            image: current,
        });
        self.current = Some(snapshot.image);
        self.modified = !self.undo.is_empty();
        self.drop_stale_selection();
        true
    }

    pub fn redo(&mut self) -> bool {
        let (Some(snapshot), Some(current)) = (self.redo.pop(), self.current.take()) else {
            return false;
        };
        self.undo.push(Snapshot {
            title: snapshot.title,
            image: current,
        });
        self.current = Some(snapshot.image);
        self.modified = true;
        self.drop_stale_selection();
        true
    }

    /// Back to the image as loaded, dropping both histories.
    pub fn restore(&mut self) {
        if let Some(original) = &self.original {
            self.current = Some(Arc::clone(original));
        }
        self.undo.clear();
        self.redo.clear();
        self.modified = false;
        self.drop_stale_selection();
    }

    /// Restricts region edits to `area`; `None` selects the whole image.
    pub fn set_selected_area(&mut self, area: Option<Rect>) -> Result<()> {
        if let Some(rect) = area {
            let image = self.current_arc()?;
            if !fits(&rect, &image) {
                return Err(PipelineError::InvalidParameters(format!(
                    "selection {:?} outside {}x{} image",
                    rect,
                    image.width(),
                    image.height()
                )));
            }
        }
        self.selection = area;
        Ok(())
    }

    pub fn selected_area(&self) -> Option<Rect> {
        self.selection
    }

    /// The selection, or the whole image when nothing is selected.
    fn target_area(&self, image: &PixelBuffer) -> Rect {
        self.selection
            .unwrap_or_else(|| Rect::new(0, 0, image.width(), image.height()))
    }

    /// Copy of the selected pixels.
    pub fn image_selection(&self) -> Result<PixelBuffer> {
        let image = self.current_arc()?;
        image.copy_region(self.target_area(&image))
    }

    /// Composites `piece` over the selected area as one undoable edit.
    /// `piece` must have the selection's dimensions.
    pub fn put_image_selection(&mut self, title: &str, piece: &PixelBuffer) -> Result<()> {
        let image = self.current_arc()?;
        let area = self.target_area(&image);
        if (piece.width(), piece.height()) != (area.width, area.height) {
            return Err(PipelineError::InvalidParameters(format!(
                "{}x{} buffer for a {}x{} selection",
                piece.width(),
                piece.height(),
                area.width,
                area.height
            )));
        }
        self.apply(title, |current| {
            let mut result = current.copy()?;
            piece.composite_into(&mut result, i64::from(area.x), i64::from(area.y));
            Ok(result)
        })
    }

    fn drop_stale_selection(&mut self) {
        let stale = match (&self.selection, &self.current) {
            (Some(rect), Some(image)) => !fits(rect, image),
            (Some(_), None) => true,
            _ => false,
        };
        if stale {
            debug!("Selection no longer fits the image; cleared");
            self.selection = None;
        }
    }

    pub fn save(&mut self, options: &EncodeOptions) -> Result<()> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| PipelineError::InvalidParameters("image has no file name".to_string()))?;
        self.save_as(&path, options)
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn save_as(&mut self, path: &Path, options: &EncodeOptions) -> Result<()> {
        let image = self.current_arc()?;
        self.loaders.save(&image, path, options)?;
        info!("Image saved");
        self.path = Some(path.to_path_buf());
        self.read_only = false;
        self.modified = false;
        Ok(())
    }
}

fn fits(rect: &Rect, image: &PixelBuffer) -> bool {
    rect.width > 0
        && rect.height > 0
        && rect.right() <= u64::from(image.width())
        && rect.bottom() <= u64::from(image.height())
}
