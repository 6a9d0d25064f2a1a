pub mod calibration;
pub mod extract;
pub mod probe;
pub mod process;
pub mod processor;

use crate::errors::MediaError;
use process::ToolCommand;
use std::path::Path;

pub use extract::{Frame, SeekMode};
pub use probe::MediaInfo;

/// Anything that can describe a media file.
pub trait MediaProbe {
    fn describe(&self, path: &Path) -> Result<MediaInfo, MediaError>;
}

/// The external ffmpeg / ffprobe pair.
#[derive(Debug, Clone)]
pub struct MediaTools {
    pub ffmpeg: ToolCommand,
    pub ffprobe: ToolCommand,
}

impl Default for MediaTools {
    fn default() -> Self {
        Self {
            ffmpeg: ToolCommand::new("ffmpeg"),
            ffprobe: ToolCommand::new("ffprobe"),
        }
    }
}
