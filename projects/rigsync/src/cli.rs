use crate::align::LinearFit;
use crate::session::events::DEFAULT_EVENT_COLUMN;
use crate::spikes::fold::DEFAULT_LOCKING_EVENT;
use crate::spikes::PickerKind;
use crate::video::SeekMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Lab configuration (JSON); built-in tables when absent
    #[arg(long, env = "RIGSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// ffmpeg command, optionally with leading arguments
    #[arg(long, default_value = "ffmpeg")]
    pub ffmpeg: String,

    /// ffprobe command, optionally with leading arguments
    #[arg(long, default_value = "ffprobe")]
    pub ffprobe: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Match behavior sessions to videos and write sessions.csv
    Sessions {
        /// Root directory holding one subdirectory per rig
        #[arg(long, env = "RIGSYNC_BEHAVIOR_ROOT")]
        behavior_root: PathBuf,

        /// Directory holding the rig videos
        #[arg(long, env = "RIGSYNC_VIDEO_ROOT")]
        video_root: PathBuf,

        /// Root directory for output artifacts
        #[arg(long, env = "RIGSYNC_OUTPUT_ROOT")]
        output_root: PathBuf,

        /// Video duration cache, read and then rewritten
        #[arg(long)]
        cache: Option<PathBuf>,
    },

    /// Print video seek commands for a session and optionally refit
    Guess {
        /// Behavior file name as listed in sessions.csv
        behavior_file: String,

        /// Event table for the session (one row per trial)
        #[arg(long)]
        events: PathBuf,

        #[arg(long, default_value = DEFAULT_EVENT_COLUMN)]
        column: String,

        /// Initial guess as slope,intercept
        #[arg(long, default_value = "1.0,0.0")]
        initial: LinearFit,

        #[arg(long, default_value_t = 4)]
        n_points: usize,

        #[arg(long, default_value_t = 10.0)]
        buffer: f64,

        #[arg(long, default_value_t = 10.0)]
        pre_roll: f64,

        /// Video times found by eye, one per printed command
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        observed: Option<Vec<f64>>,

        #[arg(long, env = "RIGSYNC_OUTPUT_ROOT")]
        output_root: PathBuf,
    },

    /// Dump one frame per trial for every aligned session
    DumpFrames {
        /// Directory holding `<behavior file>.csv` event tables
        #[arg(long)]
        events_dir: PathBuf,

        #[arg(long, default_value = DEFAULT_EVENT_COLUMN)]
        column: String,

        /// Defaults to `<output_root>/frames`
        #[arg(long)]
        frame_root: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = SeekMode::Fast)]
        seek: SeekMode,

        #[arg(long, env = "RIGSYNC_OUTPUT_ROOT")]
        output_root: PathBuf,
    },

    /// Extract a single frame as PNG
    Frame {
        video: PathBuf,

        /// Time in seconds
        time: f64,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, value_enum, default_value_t = SeekMode::Fast)]
        seek: SeekMode,

        /// Let ffmpeg write the image instead of decoding gray pixels
        #[arg(long)]
        direct: bool,
    },

    /// Print duration and geometry of media files
    Probe { paths: Vec<PathBuf> },

    /// Fold a unit's spikes around trial events
    Fold {
        /// Unit label, `<session>-<unit>`
        unit: String,

        #[arg(long, value_enum, default_value_t = PickerKind::RandomHits)]
        picker: PickerKind,

        #[arg(long, default_value = DEFAULT_LOCKING_EVENT)]
        event: String,

        #[arg(long, default_value_t = -0.25, allow_hyphen_values = true)]
        dstart: f64,

        #[arg(long, default_value_t = 0.3)]
        dstop: f64,

        /// Print the folds as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
