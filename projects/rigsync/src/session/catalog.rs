// Session catalog
//
// Finds behavior logs and videos on disk, probes video durations (with an
// optional CSV cache so long recordings are probed once), and joins each
// behavior session with its best overlapping video.

use crate::config::LabConfig;
use crate::errors::{CatalogError, MediaError};
use crate::session::filename::{
    delta_from_secs, secs, BehaviorSession, VideoFileName, VideoSession,
};
use crate::session::matcher::{match_sessions, SessionMatch};
use crate::video::MediaProbe;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

fn files_in(dir: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
}

/// All `ardulines.*` files directly under `root/<rig>` for each configured rig.
pub fn discover_behavior_files(root: &Path, config: &LabConfig) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = config
        .rigs
        .iter()
        .flat_map(|rig| files_in(&root.join(rig)))
        .filter(|p| {
            p.file_name()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s.starts_with("ardulines."))
        })
        .collect();
    files.sort();
    files
}

/// All `.mp4` files directly under `root`.
pub fn discover_video_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = files_in(root)
        .filter(|p| {
            p.extension()
                .and_then(|s| s.to_str())
                .map(|s| s.to_lowercase() == "mp4")
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

pub fn parse_behavior_files(
    files: &[PathBuf],
    config: &LabConfig,
) -> Result<Vec<BehaviorSession>, CatalogError> {
    let mut sessions = Vec::new();
    for path in files {
        if let Some(session) = BehaviorSession::from_path(path, config)? {
            sessions.push(session);
        }
    }
    Ok(sessions)
}

/// Probes every video not already in `cache` and returns the new records
/// followed by the cached ones.
///
/// A cache that names files missing from `files` is rejected. Files the
/// probe reports as corrupt or unreadable become partial records; failing
/// to run the probe at all is an error.
pub fn parse_video_files(
    files: &[PathBuf],
    probe: &dyn MediaProbe,
    config: &LabConfig,
    cache: &[VideoSession],
) -> Result<Vec<VideoSession>, CatalogError> {
    let listed: HashSet<&Path> = files.iter().map(PathBuf::as_path).collect();
    let stale: Vec<PathBuf> = cache
        .iter()
        .filter(|v| !listed.contains(v.path.as_path()))
        .map(|v| v.path.clone())
        .collect();
    if !stale.is_empty() {
        return Err(CatalogError::StaleCache(stale));
    }

    let cached: HashSet<&Path> = cache.iter().map(|v| v.path.as_path()).collect();
    let mut records = Vec::new();
    for path in files {
        if cached.contains(path.as_path()) {
            continue;
        }
        if VideoFileName::parse(path).is_none() {
            tracing::debug!("Skipping {}: not a rig video name", path.display());
            continue;
        }

        let duration = match probe.describe(path) {
            Ok(info) => Some(info.duration),
            Err(e @ (MediaError::InvalidData { .. } | MediaError::Malformed { .. })) => {
                tracing::warn!("Cannot probe {}: {}", path.display(), e);
                None
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(video) = VideoSession::from_parts(path, duration, config) {
            records.push(video);
        }
    }

    tracing::info!(
        "Probed {} new videos, {} from cache",
        records.len(),
        cache.len()
    );
    records.extend(cache.iter().cloned());
    Ok(records)
}

/// One row of the video cache table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheRecord {
    pub path: PathBuf,
    pub rig: String,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub duration_secs: Option<f64>,
}

impl From<&VideoSession> for CacheRecord {
    fn from(video: &VideoSession) -> Self {
        Self {
            path: video.path.clone(),
            rig: video.rig.clone(),
            start: video.start,
            end: video.end,
            duration_secs: video.duration_secs(),
        }
    }
}

impl From<CacheRecord> for VideoSession {
    fn from(record: CacheRecord) -> Self {
        Self {
            rig: record.rig,
            start: record.start,
            end: record.end,
            duration: record.duration_secs.map(delta_from_secs),
            path: record.path,
        }
    }
}

/// Reads the video cache. A missing file is an empty cache.
pub fn load_cache(path: &Path) -> Result<Vec<VideoSession>, CatalogError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path)?;
    let mut videos = Vec::new();
    for record in reader.deserialize::<CacheRecord>() {
        videos.push(record?.into());
    }
    Ok(videos)
}

pub fn save_cache(path: &Path, videos: &[VideoSession]) -> Result<(), CatalogError> {
    let mut writer = csv::Writer::from_path(path)?;
    for video in videos {
        writer.serialize(CacheRecord::from(video))?;
    }
    writer.flush()?;
    Ok(())
}

/// A behavior session joined with its best video.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionRow {
    pub filename: String,
    pub path: PathBuf,
    pub dir: PathBuf,
    pub rig: String,
    pub mouse: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub duration_secs: f64,
    pub best_video_index: Option<usize>,
    pub best_video_overlap: f64,
    pub video_path: Option<PathBuf>,
    pub video_start: Option<NaiveDateTime>,
    pub video_end: Option<NaiveDateTime>,
    pub video_duration_secs: Option<f64>,
}

impl SessionRow {
    pub fn join(behavior: &BehaviorSession, m: SessionMatch, videos: &[VideoSession]) -> Self {
        let video = m.video_index.and_then(|i| videos.get(i));
        Self {
            filename: behavior.file_name(),
            path: behavior.path.clone(),
            dir: behavior.dir.clone(),
            rig: behavior.rig.clone(),
            mouse: behavior.mouse.clone(),
            start: behavior.start,
            end: behavior.end,
            duration_secs: secs(behavior.duration()),
            best_video_index: m.video_index,
            best_video_overlap: m.overlap_secs,
            video_path: video.map(|v| v.path.clone()),
            video_start: video.and_then(|v| v.start),
            video_end: video.and_then(|v| v.end),
            video_duration_secs: video.and_then(|v| v.duration_secs()),
        }
    }

    /// Video start minus behavior start, in seconds.
    pub fn video_offset_secs(&self) -> Option<f64> {
        self.video_start.map(|vs| secs(vs - self.start))
    }
}

/// Discovers, parses and matches everything under the two roots.
pub fn search(
    behavior_root: &Path,
    video_root: &Path,
    probe: &dyn MediaProbe,
    config: &LabConfig,
    cache: &[VideoSession],
) -> Result<(Vec<SessionRow>, Vec<VideoSession>), CatalogError> {
    let behavior_files = discover_behavior_files(behavior_root, config);
    if behavior_files.is_empty() {
        tracing::warn!("No behavior files found in {}", behavior_root.display());
    }
    let video_files = discover_video_files(video_root);
    if video_files.is_empty() {
        tracing::warn!("No video files found in {}", video_root.display());
    }

    let behaviors = parse_behavior_files(&behavior_files, config)?;
    let videos = parse_video_files(&video_files, probe, config, cache)?;
    let matches = match_sessions(&behaviors, &videos);

    let rows = behaviors
        .iter()
        .zip(matches)
        .map(|(b, m)| SessionRow::join(b, m, &videos))
        .collect();
    Ok((rows, videos))
}

pub fn write_rows(path: &Path, rows: &[SessionRow]) -> Result<(), CatalogError> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_rows(path: &Path) -> Result<Vec<SessionRow>, CatalogError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VideoTimestamp;
    use crate::video::MediaInfo;
    use chrono::{Local, NaiveDate, TimeZone};
    use std::cell::RefCell;
    use std::fs::{self, File};
    use std::time::SystemTime;

    /// Answers with fixed durations and remembers what it was asked.
    struct FakeProbe {
        duration_secs: f64,
        corrupt: Vec<PathBuf>,
        asked: RefCell<Vec<PathBuf>>,
    }

    impl FakeProbe {
        fn new(duration_secs: f64) -> Self {
            Self {
                duration_secs,
                corrupt: Vec::new(),
                asked: RefCell::new(Vec::new()),
            }
        }
    }

    impl MediaProbe for FakeProbe {
        fn describe(&self, path: &Path) -> Result<MediaInfo, MediaError> {
            self.asked.borrow_mut().push(path.to_path_buf());
            if self.corrupt.iter().any(|p| p == path) {
                return Err(MediaError::InvalidData {
                    tool: "ffprobe".to_string(),
                    path: path.to_path_buf(),
                });
            }
            Ok(MediaInfo {
                duration: delta_from_secs(self.duration_secs),
                geometry: Some((640, 480)),
            })
        }
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn touch(path: &Path, modified: Option<NaiveDateTime>) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = File::create(path).unwrap();
        if let Some(modified) = modified {
            let local = Local.from_local_datetime(&modified).single().unwrap();
            file.set_modified(SystemTime::from(local)).unwrap();
        }
    }

    #[test]
    fn test_search_matches_overlapping_video_on_same_rig() {
        let behavior_root = tempfile::tempdir().unwrap();
        let video_root = tempfile::tempdir().unwrap();
        touch(
            &behavior_root.path().join("L1/ardulines.20190101120500.KF13"),
            Some(at(13, 5, 0)),
        );
        touch(&behavior_root.path().join("L1/notes.txt"), None);
        touch(&video_root.path().join("L1.20190101120000.mp4"), None);
        touch(&video_root.path().join("L2.20190101120000.mp4"), None);

        let config = LabConfig {
            video_timestamp: VideoTimestamp::Start,
            ..LabConfig::default()
        };
        let probe = FakeProbe::new(3600.0);
        let (rows, videos) =
            search(behavior_root.path(), video_root.path(), &probe, &config, &[]).unwrap();

        assert_eq!(videos.len(), 2);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.mouse, "KF13");
        assert_eq!(row.best_video_overlap, 3300.0);
        let matched = &videos[row.best_video_index.unwrap()];
        assert_eq!(matched.rig, "L1");
        assert_eq!(row.video_path.as_deref(), Some(matched.path.as_path()));
        assert_eq!(row.video_offset_secs(), Some(-300.0));
    }

    #[test]
    fn test_end_anchored_video_before_session_does_not_match() {
        let behavior_root = tempfile::tempdir().unwrap();
        let video_root = tempfile::tempdir().unwrap();
        touch(
            &behavior_root.path().join("L1/ardulines.20190101120500.KF13"),
            Some(at(13, 5, 0)),
        );
        touch(&video_root.path().join("L1.20190101120000.mp4"), None);

        // Default config reads the filename timestamp as the end: 11:00 to 12:00.
        let probe = FakeProbe::new(3600.0);
        let (rows, videos) = search(
            behavior_root.path(),
            video_root.path(),
            &probe,
            &LabConfig::default(),
            &[],
        )
        .unwrap();

        assert_eq!(videos[0].interval(), Some((at(11, 0, 0), at(12, 0, 0))));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].best_video_index, None);
        assert_eq!(rows[0].best_video_overlap, 0.0);
        assert_eq!(rows[0].video_path, None);
        assert_eq!(rows[0].video_offset_secs(), None);
    }

    #[test]
    fn test_corrupt_video_becomes_partial_record() {
        let video_root = tempfile::tempdir().unwrap();
        let good = video_root.path().join("L1.20190101120000.mp4");
        let bad = video_root.path().join("L2.20190101120000.mp4");
        touch(&good, None);
        touch(&bad, None);

        let mut probe = FakeProbe::new(60.0);
        probe.corrupt.push(bad.clone());
        let files = discover_video_files(video_root.path());
        let videos = parse_video_files(&files, &probe, &LabConfig::default(), &[]).unwrap();

        let bad_record = videos.iter().find(|v| v.path == bad).unwrap();
        assert_eq!(bad_record.duration, None);
        assert_eq!(bad_record.start, None);
        assert_eq!(bad_record.end, Some(at(12, 0, 0)));
        let good_record = videos.iter().find(|v| v.path == good).unwrap();
        assert_eq!(good_record.start, Some(at(11, 59, 0)));
    }

    #[test]
    fn test_cached_videos_are_not_probed_again() {
        let video_root = tempfile::tempdir().unwrap();
        let first = video_root.path().join("L1.20190101120000.mp4");
        let second = video_root.path().join("L2.20190101130000.mp4");
        touch(&first, None);
        touch(&second, None);
        let config = LabConfig::default();
        let files = discover_video_files(video_root.path());

        let cache = parse_video_files(&files[..1], &FakeProbe::new(60.0), &config, &[]).unwrap();
        let cache_path = video_root.path().join("cache.csv");
        save_cache(&cache_path, &cache).unwrap();
        let cache = load_cache(&cache_path).unwrap();

        let probe = FakeProbe::new(60.0);
        let videos = parse_video_files(&files, &probe, &config, &cache).unwrap();
        assert_eq!(*probe.asked.borrow(), vec![second.clone()]);
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].path, second);
        assert_eq!(videos[1].path, first);
        assert_eq!(videos[1].duration_secs(), Some(60.0));
    }

    #[test]
    fn test_stale_cache_is_rejected() {
        let config = LabConfig::default();
        let stale = VideoSession::from_parts(
            Path::new("/gone/L1.20190101120000.mp4"),
            None,
            &config,
        )
        .unwrap();
        let err = parse_video_files(&[], &FakeProbe::new(1.0), &config, &[stale]).unwrap_err();
        match err {
            CatalogError::StaleCache(paths) => {
                assert_eq!(paths, vec![PathBuf::from("/gone/L1.20190101120000.mp4")])
            }
            other => panic!("unexpected {}", other),
        }
    }

    #[test]
    fn test_missing_cache_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_cache(&dir.path().join("none.csv")).unwrap().is_empty());
    }

    #[test]
    fn test_discovery_filters() {
        let root = tempfile::tempdir().unwrap();
        touch(&root.path().join("L1/ardulines.20190101120000.KF13"), None);
        touch(&root.path().join("L9/ardulines.20190101120000.KF13"), None);
        touch(&root.path().join("L2/other.txt"), None);
        touch(&root.path().join("A.20190101120000.MP4"), None);
        touch(&root.path().join("nested/B.20190101120000.mp4"), None);

        let behavior = discover_behavior_files(root.path(), &LabConfig::default());
        assert_eq!(
            behavior,
            vec![root.path().join("L1/ardulines.20190101120000.KF13")]
        );
        assert_eq!(
            discover_video_files(root.path()),
            vec![root.path().join("A.20190101120000.MP4")]
        );
    }

    #[test]
    fn test_rows_survive_csv() {
        let dir = tempfile::tempdir().unwrap();
        let behavior = BehaviorSession {
            dir: PathBuf::from("/b"),
            rig: "L1".to_string(),
            mouse: "KF13".to_string(),
            start: at(12, 5, 0),
            end: at(13, 5, 0),
            path: PathBuf::from("/b/L1/ardulines.20190101120500.KF13"),
        };
        let rows = vec![
            SessionRow::join(&behavior, SessionMatch::NONE, &[]),
            SessionRow::join(
                &behavior,
                SessionMatch {
                    video_index: Some(0),
                    overlap_secs: 3300.0,
                },
                &[VideoSession {
                    rig: "L1".to_string(),
                    start: Some(at(12, 0, 0)),
                    end: Some(at(13, 0, 0)),
                    duration: Some(chrono::TimeDelta::seconds(3600)),
                    path: PathBuf::from("/v/L1.20190101130000.mp4"),
                }],
            ),
        ];
        let path = dir.path().join("sessions.csv");
        write_rows(&path, &rows).unwrap();
        let back = read_rows(&path).unwrap();
        assert_eq!(back, rows);
        assert_eq!(back[0].video_offset_secs(), None);
        assert_eq!(back[1].filename, "ardulines.20190101120500.KF13");
    }
}
