use crate::align::{behavior_to_video, plan::mask_by_buffer_from_end};
use crate::run_artifacts::AlignmentRecord;
use crate::video::{MediaTools, SeekMode};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Seconds kept clear of both ends of the video when dumping trial frames.
pub const DUMP_BUFFER_SECS: f64 = 10.0;

/// Video times for a session's behavior events, masked to the video.
pub fn session_video_times(record: &AlignmentRecord, events: &[Option<f64>]) -> Vec<Option<f64>> {
    let times = behavior_to_video(events, record.video_offset_secs, &record.fit);
    mask_by_buffer_from_end(&times, record.video_duration_secs, DUMP_BUFFER_SECS)
}

/// Writes `trial%03d.png` into `output_dir` for every defined time.
///
/// Trial numbers follow the index in `times`, so undefined trials leave
/// gaps in the numbering.
pub fn dump_frames_at_times(
    tools: &MediaTools,
    video_path: &Path,
    times: &[Option<f64>],
    output_dir: &Path,
    seek: SeekMode,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)?;

    let mut frame_paths = Vec::new();
    for (trial, time) in times.iter().enumerate() {
        let Some(time) = *time else {
            continue;
        };
        let output_path = output_dir.join(format!("trial{:03}.png", trial));
        tools
            .dump_frame(video_path, time, seek, &output_path)
            .with_context(|| {
                format!(
                    "Failed to dump trial {} at {:.2}s from {}",
                    trial,
                    time,
                    video_path.display()
                )
            })?;
        frame_paths.push(output_path);
    }

    Ok(frame_paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::LinearFit;
    use chrono::Utc;

    #[test]
    fn test_session_video_times_apply_offset_fit_and_mask() {
        let record = AlignmentRecord {
            behavior_file: "ardulines.20190101120500.KF13".to_string(),
            video_path: PathBuf::from("v.mp4"),
            video_offset_secs: 100.0,
            video_duration_secs: 1000.0,
            initial: LinearFit::IDENTITY,
            correction: None,
            fit: LinearFit::new(1.0, 5.0),
            points: Vec::new(),
            residuals: Vec::new(),
            created_at: Utc::now(),
        };
        let events = [Some(50.0), Some(200.0), None, Some(1090.0)];
        // 50 - 100 + 5 is before the video; 1090 - 100 + 5 is inside the end buffer
        assert_eq!(
            session_video_times(&record, &events),
            vec![None, Some(105.0), None, None]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_dump_frames_names_files_by_trial() {
        use crate::video::process::ToolCommand;

        let dir = tempfile::tempdir().unwrap();
        // Writes its last argument, like ffmpeg writing the output image.
        let script = dir.path().join("ffmpeg.sh");
        std::fs::write(&script, "for last; do :; done\nprintf png > \"$last\"\n").unwrap();
        let tools = MediaTools {
            ffmpeg: ToolCommand {
                program: "sh".to_string(),
                args: vec![script.to_string_lossy().into_owned()],
            },
            ..MediaTools::default()
        };

        let out = dir.path().join("frames");
        let written = dump_frames_at_times(
            &tools,
            Path::new("v.mp4"),
            &[Some(12.0), None, Some(30.0)],
            &out,
            SeekMode::Fast,
        )
        .unwrap();
        assert_eq!(written, vec![out.join("trial000.png"), out.join("trial002.png")]);
        assert!(written.iter().all(|p| p.exists()));
    }
}
