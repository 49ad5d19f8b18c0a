use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Invalid image dimensions: width={0}, height={1}")]
    InvalidDimensions(u32, u32),

    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),

    #[error("Failed to encode image: {0}")]
    EncodeFailed(String),

    #[error("Out of memory: could not allocate {0} bytes")]
    OutOfMemory(usize),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Filter failed: {0}")]
    Failed(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("{0} loader is read-only")]
    ReadOnly(&'static str),

    #[error("No filter registered for identifier '{0}'")]
    NotFound(String),

    #[error("Filter '{id}' does not support version {version}")]
    UnsupportedVersion { id: String, version: u32 },

    #[error("Failed to read input file: {0}")]
    InputReadError(String),

    #[error("Failed to write output file: {0}")]
    OutputWriteError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PipelineError {
    /// User-initiated aborts are not failures and should not be reported as such.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }

    /// Parameter problems detected before any allocation took place.
    pub fn is_invalid_parameters(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidParameters(_) | PipelineError::InvalidDimensions(_, _)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
