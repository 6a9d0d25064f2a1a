use crate::errors::MediaError;
use crate::session::filename::{delta_from_secs, secs};
use crate::video::process::run_blocking;
use crate::video::{MediaProbe, MediaTools};
use chrono::TimeDelta;
use regex::Regex;
use std::ffi::OsString;
use std::path::Path;

lazy_static::lazy_static! {
    static ref DURATION: Regex =
        Regex::new(r"Duration: (\d+):(\d{2}):(\d{2}(?:\.\d+)?),").unwrap();
    static ref GEOMETRY: Regex = Regex::new(r"^(\d+)x(\d+)$").unwrap();
}

/// What ffprobe tells us about a file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    pub duration: TimeDelta,
    /// (width, height) of the first video stream.
    pub geometry: Option<(u32, u32)>,
}

impl MediaInfo {
    pub fn duration_secs(&self) -> f64 {
        secs(self.duration)
    }

    pub fn frame_size(&self, path: &Path) -> Result<(u32, u32), MediaError> {
        self.geometry.ok_or_else(|| MediaError::Malformed {
            tool: "ffprobe".to_string(),
            path: path.to_path_buf(),
            message: "no video stream geometry".to_string(),
        })
    }
}

/// Parses `Duration: HH:MM:SS.ffffff,`. Out-of-range values give `None`.
pub fn parse_duration(text: &str) -> Option<TimeDelta> {
    let caps = DURATION.captures(text)?;
    let hours: i64 = caps[1].parse().ok()?;
    let minutes: i64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    TimeDelta::try_hours(hours)?
        .checked_add(&TimeDelta::try_minutes(minutes)?)?
        .checked_add(&delta_from_secs(seconds))
}

/// Parses `WIDTHxHEIGHT` from the first video stream line.
pub fn parse_geometry(text: &str) -> Option<(u32, u32)> {
    let mut found = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if !line.starts_with("Stream #") {
            continue;
        }
        let mut groups = line.split(',');
        if !groups.next().is_some_and(|g| g.contains(" Video: ")) {
            continue;
        }
        let size = groups.find_map(|group| {
            let token = group.split_whitespace().next()?;
            let caps = GEOMETRY.captures(token)?;
            Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
        });
        if let Some(size) = size {
            found.push(size);
        }
    }

    if found.len() > 1 {
        tracing::warn!("Multiple video streams found, using the first");
    }
    found.first().copied()
}

/// Interprets the text of `ffprobe <path>`.
pub fn parse_describe(text: &str, path: &Path) -> Result<MediaInfo, MediaError> {
    if text.contains(crate::errors::INVALID_DATA_MARKER) {
        return Err(MediaError::InvalidData {
            tool: "ffprobe".to_string(),
            path: path.to_path_buf(),
        });
    }
    let duration = parse_duration(text).ok_or_else(|| MediaError::Malformed {
        tool: "ffprobe".to_string(),
        path: path.to_path_buf(),
        message: "no Duration line".to_string(),
    })?;

    Ok(MediaInfo {
        duration,
        geometry: parse_geometry(text),
    })
}

impl MediaProbe for MediaTools {
    fn describe(&self, path: &Path) -> Result<MediaInfo, MediaError> {
        let output = run_blocking(&self.ffprobe, &[OsString::from(path)])?;
        parse_describe(&output.text(), path)
    }
}
