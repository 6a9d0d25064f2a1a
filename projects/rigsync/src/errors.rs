use std::path::PathBuf;
use thiserror::Error;

/// Marker printed by ffmpeg/ffprobe when a file is corrupt or not media at all.
pub const INVALID_DATA_MARKER: &str = "Invalid data found when processing input";

/// Errors raised while talking to the external media tools
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Invalid data found by {tool} in {}", path.display())]
    InvalidData { tool: String, path: PathBuf },

    #[error("Ran out of frames: expected {expected} bytes, got {got}")]
    OutOfFrames { expected: usize, got: usize },

    #[error("Malformed {tool} output for {}: {message}", path.display())]
    Malformed {
        tool: String,
        path: PathBuf,
        message: String,
    },

    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {output}")]
    ToolFailed {
        tool: String,
        status: std::process::ExitStatus,
        output: String,
    },

    #[error("Invalid frame request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),
}

impl MediaError {
    /// True for failures that mean the media itself is corrupt.
    pub fn is_integrity(&self) -> bool {
        matches!(self, MediaError::InvalidData { .. })
    }
}

/// Errors raised while building the session catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Cached video records reference files not in the current listing: {0:?}")]
    StaleCache(Vec<PathBuf>),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the clock aligner
#[derive(Debug, Error)]
pub enum AlignError {
    #[error("Need at least {needed} usable times inside the video, found {found}")]
    InsufficientTimes { needed: usize, found: usize },

    #[error("Cannot fit a line through {0} points")]
    TooFewPoints(usize),

    #[error("Cannot fit a line: all x values are equal")]
    Degenerate,

    #[error("Mismatched lengths: {x} x values, {y} y values")]
    LengthMismatch { x: usize, y: usize },

    #[error("Number of reference points must be positive")]
    ZeroPoints,
}

/// Errors raised by the spike loader
#[derive(Debug, Error)]
pub enum SpikeError {
    #[error("Malformed unit label: {0}")]
    BadLabel(String),

    #[error("No session like {0} found!")]
    UnknownSession(String),

    #[error("Trials table {} is missing column {column}", path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("Trials table {} line {line}: {message}", path.display())]
    TrialFormat {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
