// Filename parsing for behavior logs and rig videos
//
// Behavior logs live at <root>/<rig>/ardulines.<YYYYMMDDHHMMSS>.<mouse>,
// videos at <root>/<rig>.<YYYYMMDDHHMMSS>.<ext>. Anything else is skipped.

use crate::config::{LabConfig, VideoTimestamp};
use chrono::{DateTime, Local, NaiveDateTime, TimeDelta};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

lazy_static::lazy_static! {
    static ref BEHAVIOR_NAME: Regex = Regex::new(r"^ardulines\.(\d{14})\.(\S+)$").unwrap();
    static ref VIDEO_NAME: Regex = Regex::new(r"^([^./\s]+)\.(\d{14})\.(\w+)$").unwrap();
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()
}

fn file_name_str(path: &Path) -> Option<&str> {
    path.file_name().and_then(|s| s.to_str())
}

/// Structured fields of a behavior log filename, mouse name as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorFileName {
    pub rig: String,
    pub timestamp: NaiveDateTime,
    pub mouse: String,
}

impl BehaviorFileName {
    pub fn parse(path: &Path) -> Option<Self> {
        let caps = BEHAVIOR_NAME.captures(file_name_str(path)?)?;
        let rig = path.parent().and_then(file_name_str)?.to_string();
        Some(Self {
            rig,
            timestamp: parse_timestamp(&caps[1])?,
            mouse: caps[2].to_string(),
        })
    }

    /// Relative path `<rig>/ardulines.<timestamp>.<mouse>`.
    pub fn to_relative_path(&self) -> PathBuf {
        Path::new(&self.rig).join(format!(
            "ardulines.{}.{}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.mouse
        ))
    }
}

/// Structured fields of a video filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFileName {
    pub rig: String,
    pub timestamp: NaiveDateTime,
    pub extension: String,
}

impl VideoFileName {
    pub fn parse(path: &Path) -> Option<Self> {
        let caps = VIDEO_NAME.captures(file_name_str(path)?)?;
        Some(Self {
            rig: caps[1].to_string(),
            timestamp: parse_timestamp(&caps[2])?,
            extension: caps[3].to_string(),
        })
    }
}

/// A behavior session parsed from an ardulines file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BehaviorSession {
    pub dir: PathBuf,
    pub rig: String,
    pub mouse: String,
    pub start: NaiveDateTime,
    /// Modification time of the log, in local time.
    pub end: NaiveDateTime,
    pub path: PathBuf,
}

impl BehaviorSession {
    /// Builds a session from a path and its end time.
    ///
    /// Returns `None` for filenames that don't match, rigs that are not
    /// configured, and mice that are not on the canonical list.
    pub fn from_parts(path: &Path, end: NaiveDateTime, config: &LabConfig) -> Option<Self> {
        let parsed = BehaviorFileName::parse(path)?;
        if !config.is_rig(&parsed.rig) {
            tracing::debug!("Skipping {}: unknown rig {}", path.display(), parsed.rig);
            return None;
        }
        let Some(mouse) = config.normalize_mouse(&parsed.mouse) else {
            tracing::debug!("Skipping {}: unknown mouse {}", path.display(), parsed.mouse);
            return None;
        };
        let dir = path
            .parent()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Some(Self {
            dir,
            rig: parsed.rig,
            mouse,
            start: parsed.timestamp,
            end,
            path: path.to_path_buf(),
        })
    }

    /// Reads the modification time from disk and parses the session.
    pub fn from_path(path: &Path, config: &LabConfig) -> std::io::Result<Option<Self>> {
        if BehaviorFileName::parse(path).is_none() {
            return Ok(None);
        }
        let modified = fs::metadata(path)?.modified()?;
        let end = DateTime::<Local>::from(modified).naive_local();
        Ok(Self::from_parts(path, end, config))
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// File name of the log, used to name per-session output directories.
    pub fn file_name(&self) -> String {
        file_name_str(&self.path).unwrap_or("unknown").to_string()
    }
}

/// A video recording. `start` and `duration` are absent when probing failed.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSession {
    pub rig: String,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub duration: Option<TimeDelta>,
    pub path: PathBuf,
}

impl VideoSession {
    /// Builds a session from a filename and the probed duration.
    pub fn from_parts(
        path: &Path,
        duration: Option<TimeDelta>,
        config: &LabConfig,
    ) -> Option<Self> {
        let parsed = VideoFileName::parse(path)?;
        let duration = duration.filter(|d| *d >= TimeDelta::zero());
        let other_end = duration.and_then(|d| match config.video_timestamp {
            VideoTimestamp::End => parsed.timestamp.checked_sub_signed(d),
            VideoTimestamp::Start => parsed.timestamp.checked_add_signed(d),
        });
        if duration.is_some() && other_end.is_none() {
            tracing::warn!("Duration of {} is out of range, ignoring it", path.display());
        }
        let duration = duration.filter(|_| other_end.is_some());
        let (start, end) = match config.video_timestamp {
            VideoTimestamp::End => (other_end, Some(parsed.timestamp)),
            VideoTimestamp::Start => (Some(parsed.timestamp), other_end),
        };

        Some(Self {
            rig: parsed.rig,
            start,
            end,
            duration,
            path: path.to_path_buf(),
        })
    }

    /// Start and end, if both are known.
    pub fn interval(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        Some((self.start?, self.end?))
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.duration.map(secs)
    }
}

/// Seconds in a `TimeDelta`, with microsecond resolution.
pub fn secs(delta: TimeDelta) -> f64 {
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1e6,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}

/// `TimeDelta` from fractional seconds, rounded to microseconds.
pub fn delta_from_secs(s: f64) -> TimeDelta {
    TimeDelta::microseconds((s * 1e6).round() as i64)
}
