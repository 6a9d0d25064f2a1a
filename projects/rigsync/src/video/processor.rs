use crate::run_artifacts::AlignmentRecord;
use crate::run_context::create_session_frame_dir;
use crate::video::calibration::{dump_frames_at_times, session_video_times};
use crate::video::{MediaTools, SeekMode};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct DumpStats {
    pub sessions_dumped: usize,
    pub sessions_skipped: usize,
    pub frames_written: usize,
    pub duration: Duration,
}

/// Anything that can produce event times for a session's behavior file.
pub trait EventSource {
    fn event_times(&self, record: &AlignmentRecord) -> Result<Vec<Option<f64>>>;
}

impl<F> EventSource for F
where
    F: Fn(&AlignmentRecord) -> Result<Vec<Option<f64>>>,
{
    fn event_times(&self, record: &AlignmentRecord) -> Result<Vec<Option<f64>>> {
        self(record)
    }
}

/// Dumps trial frames for every aligned session under `frame_root/<session>`.
///
/// Sessions whose directory already exists are skipped. Errors from one
/// session stop the batch and leave no directory behind for it.
pub fn dump_sessions<E>(
    tools: &MediaTools,
    records: &[AlignmentRecord],
    events: E,
    frame_root: &Path,
    seek: SeekMode,
) -> Result<DumpStats>
where
    E: EventSource,
{
    std::fs::create_dir_all(frame_root)?;
    let start_time = Instant::now();
    let mut stats = DumpStats::default();

    let pb = ProgressBar::new(records.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg} ({eta})")?
            .progress_chars("#>-"),
    );

    for record in records {
        pb.set_message(record.behavior_file.clone());
        if frame_root.join(&record.behavior_file).exists() {
            tracing::info!("Frames already dumped for {}, skipping", record.behavior_file);
            stats.sessions_skipped += 1;
            pb.inc(1);
            continue;
        }

        let times = session_video_times(record, &events.event_times(record)?);
        let out_dir = create_session_frame_dir(frame_root, &record.behavior_file)?
            .with_context(|| format!("{} appeared while dumping", record.behavior_file))?;
        let written: Vec<PathBuf> =
            match dump_frames_at_times(tools, &record.video_path, &times, &out_dir, seek) {
                Ok(written) => written,
                Err(e) => {
                    // A partial directory would be skipped on the next run.
                    if let Err(rm) = std::fs::remove_dir_all(&out_dir) {
                        tracing::warn!("Failed to remove {}: {}", out_dir.display(), rm);
                    }
                    return Err(e);
                }
            };
        stats.frames_written += written.len();
        stats.sessions_dumped += 1;
        pb.inc(1);
    }

    pb.finish_with_message("Done");
    stats.duration = start_time.elapsed();
    Ok(stats)
}
