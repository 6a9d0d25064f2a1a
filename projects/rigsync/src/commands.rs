use crate::align::{AlignParams, AlignmentPlan, LinearFit};
use crate::cli::{Args, Command};
use crate::config::LabConfig;
use crate::run_artifacts::AlignmentRecord;
use crate::run_context::{list_alignments, save_alignment};
use crate::session::catalog::{self, load_cache, save_cache, write_rows, SessionRow};
use crate::session::events::load_event_times;
use crate::spikes::{
    fold_unit, load_trials, CsvSpikeStore, FoldWindow, PickerKind, SessionRegistry, TrialPicker,
    UnitLabel,
};
use crate::video::process::ToolCommand;
use crate::video::processor::dump_sessions;
use crate::video::{MediaProbe, MediaTools, SeekMode};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

pub const SESSIONS_FILE: &str = "sessions.csv";

fn media_tools(args: &Args) -> Result<MediaTools> {
    let tool = |s: &str| {
        ToolCommand::parse(s).ok_or_else(|| anyhow::anyhow!("Empty tool command {:?}", s))
    };
    Ok(MediaTools {
        ffmpeg: tool(&args.ffmpeg)?,
        ffprobe: tool(&args.ffprobe)?,
    })
}

pub fn run(args: Args) -> Result<()> {
    let config = LabConfig::load(args.config.as_deref())?;
    let tools = media_tools(&args)?;

    match args.command {
        Command::Sessions {
            behavior_root,
            video_root,
            output_root,
            cache,
        } => run_sessions(&tools, &config, &behavior_root, &video_root, &output_root, cache),
        Command::Guess {
            behavior_file,
            events,
            column,
            initial,
            n_points,
            buffer,
            pre_roll,
            observed,
            output_root,
        } => {
            let params = AlignParams {
                n_points,
                buffer,
                pre_roll,
            };
            run_guess(
                &output_root,
                &behavior_file,
                &events,
                &column,
                initial,
                params,
                observed.as_deref(),
            )
        }
        Command::DumpFrames {
            events_dir,
            column,
            frame_root,
            seek,
            output_root,
        } => {
            let frame_root = frame_root.unwrap_or_else(|| output_root.join("frames"));
            run_dump_frames(&tools, &output_root, &events_dir, &column, &frame_root, seek)
        }
        Command::Frame {
            video,
            time,
            output,
            seek,
            direct,
        } => run_frame(&tools, &video, time, &output, seek, direct),
        Command::Probe { paths } => run_probe(&tools, &paths),
        Command::Fold {
            unit,
            picker,
            event,
            dstart,
            dstop,
            json,
        } => run_fold(&config, &unit, picker, &event, FoldWindow { dstart, dstop }, json),
    }
}

fn run_sessions(
    tools: &MediaTools,
    config: &LabConfig,
    behavior_root: &Path,
    video_root: &Path,
    output_root: &Path,
    cache: Option<PathBuf>,
) -> Result<()> {
    let cached = match &cache {
        Some(path) => load_cache(path)
            .with_context(|| format!("Failed to read video cache {}", path.display()))?,
        None => Vec::new(),
    };

    let (rows, videos) = catalog::search(behavior_root, video_root, tools, config, &cached)?;
    if let Some(path) = &cache {
        save_cache(path, &videos)?;
    }

    std::fs::create_dir_all(output_root)?;
    let out = output_root.join(SESSIONS_FILE);
    write_rows(&out, &rows)?;

    let matched = rows.iter().filter(|r| r.best_video_index.is_some()).count();
    info!(
        "Matched {} of {} behavior sessions against {} videos",
        matched,
        rows.len(),
        videos.len()
    );
    println!("{}", out.display());
    Ok(())
}

fn find_row(output_root: &Path, behavior_file: &str) -> Result<SessionRow> {
    let path = output_root.join(SESSIONS_FILE);
    let rows = catalog::read_rows(&path)
        .with_context(|| format!("Failed to read {}; run `sessions` first", path.display()))?;
    rows.into_iter()
        .find(|r| r.filename == behavior_file)
        .ok_or_else(|| anyhow::anyhow!("{} not found in {}", behavior_file, path.display()))
}

fn run_guess(
    output_root: &Path,
    behavior_file: &str,
    events: &Path,
    column: &str,
    initial: LinearFit,
    params: AlignParams,
    observed: Option<&[f64]>,
) -> Result<()> {
    let row = find_row(output_root, behavior_file)?;
    let mut record = AlignmentRecord::for_row(&row, initial).ok_or_else(|| {
        anyhow::anyhow!("{} has no fully probed matching video", behavior_file)
    })?;

    let candidates: Vec<f64> = load_event_times(events, column)?
        .into_iter()
        .map(|t| t.map_or(f64::NAN, |v| v - record.video_offset_secs))
        .collect();
    let plan = AlignmentPlan::new(&candidates, record.video_duration_secs, initial, params)?;

    for command in plan.seek_commands(&record.video_path) {
        println!("{}", command);
    }

    let Some(observed) = observed else {
        return Ok(());
    };
    let Some(refit) = plan.refit(observed) else {
        return Ok(());
    };

    println!("{}", behavior_file);
    println!("{}", record.video_path.display());
    println!("combined_fit: {}", refit.combined);
    println!("resids: {:?}", refit.residuals);

    record.apply_refit(&refit, &plan.guessed_times(), observed);
    let path = save_alignment(output_root, &record)?;
    info!("Saved alignment to {}", path.display());
    Ok(())
}

fn run_dump_frames(
    tools: &MediaTools,
    output_root: &Path,
    events_dir: &Path,
    column: &str,
    frame_root: &Path,
    seek: SeekMode,
) -> Result<()> {
    let records = list_alignments(output_root)?;
    if records.is_empty() {
        tracing::warn!("No alignments under {}", output_root.display());
        return Ok(());
    }

    let events = |record: &AlignmentRecord| -> Result<Vec<Option<f64>>> {
        let path = events_dir.join(format!("{}.csv", record.behavior_file));
        load_event_times(&path, column)
    };
    let stats = dump_sessions(tools, &records, events, frame_root, seek)?;
    info!(
        "Dumped {} frames from {} sessions ({} skipped) in {:.1?}",
        stats.frames_written, stats.sessions_dumped, stats.sessions_skipped, stats.duration
    );
    Ok(())
}

fn run_frame(
    tools: &MediaTools,
    video: &Path,
    time: f64,
    output: &Path,
    seek: SeekMode,
    direct: bool,
) -> Result<()> {
    if direct {
        tools.dump_frame(video, time, seek, output)?;
        if !output.exists() {
            tracing::warn!("ffmpeg wrote nothing; {:.3}s may be past the end", time);
        }
        return Ok(());
    }

    match tools.get_frame(video, time, seek)? {
        Some(frame) => {
            frame.save_png(output)?;
            println!(
                "{} {}x{} mean {:.1}",
                output.display(),
                frame.width(),
                frame.height(),
                frame.mean()
            );
        }
        None => println!("no frame at {:.3}s", time),
    }
    Ok(())
}

fn run_probe(tools: &MediaTools, paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        let info = tools.describe(path)?;
        let geometry = info
            .geometry
            .map(|(w, h)| format!("{}x{}", w, h))
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "{}\t{:.3}s\t{}",
            path.display(),
            info.duration_secs(),
            geometry
        );
    }
    Ok(())
}

fn run_fold(
    config: &LabConfig,
    unit: &str,
    picker: PickerKind,
    event: &str,
    window: FoldWindow,
    json: bool,
) -> Result<()> {
    let unit = UnitLabel::parse(unit)?;
    let registry = SessionRegistry::from_config(config);
    let trials = load_trials(&registry.recording_dir(&unit.session)?)?;
    let store = CsvSpikeStore::new(registry);
    let picker = TrialPicker::preset(picker, &config.stimuli);

    let folds = fold_unit(&store, &unit, &trials, &picker, event, window)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&folds)?);
        return Ok(());
    }
    for folded in &folds {
        let rate = folded
            .mean_rate()
            .map(|r| format!("{:.2} Hz", r))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}\t{} trials\t{} spikes\t{}",
            folded.label,
            folded.centers.len(),
            folded.total_spikes(),
            rate
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_context::load_alignment;
    use crate::session::events::DEFAULT_EVENT_COLUMN;
    use chrono::{NaiveDate, NaiveDateTime};

    const BEHAVIOR_FILE: &str = "ardulines.20190101120500.KF13";

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    /// Behavior session starting five minutes after its video.
    fn write_session(output_root: &Path) {
        let row = SessionRow {
            filename: BEHAVIOR_FILE.to_string(),
            path: PathBuf::from("/data/L1").join(BEHAVIOR_FILE),
            dir: PathBuf::from("/data"),
            rig: "L1".to_string(),
            mouse: "KF13".to_string(),
            start: at(12, 5, 0),
            end: at(13, 5, 0),
            duration_secs: 3600.0,
            best_video_index: Some(0),
            best_video_overlap: 3300.0,
            video_path: Some(PathBuf::from("/v/L1.20190101120000.mp4")),
            video_start: Some(at(12, 0, 0)),
            video_end: Some(at(13, 0, 0)),
            video_duration_secs: Some(3600.0),
        };
        write_rows(&output_root.join(SESSIONS_FILE), &[row]).unwrap();
    }

    /// Trials every 20 s with a few long pauses, in behavior time.
    fn trial_times() -> Vec<f64> {
        let mut t = 0.0;
        let mut out = Vec::new();
        for i in 0..60 {
            t += if i % 15 == 7 { 95.0 } else { 20.0 };
            out.push(t);
        }
        out
    }

    fn write_events(path: &Path) {
        let mut text = String::from("trial,time_retract\n");
        for (i, t) in trial_times().iter().enumerate() {
            text.push_str(&format!("{},{}\n", i, t));
        }
        text.push_str("60,nan\n");
        std::fs::write(path, text).unwrap();
    }

    #[test]
    fn test_guess_saves_alignment_only_after_refit() {
        let dir = tempfile::tempdir().unwrap();
        let events = dir.path().join("events.csv");
        write_session(dir.path());
        write_events(&events);

        let initial = LinearFit::new(1.0, 5.0);
        let params = AlignParams::default();
        let guess = |observed: Option<&[f64]>| {
            run_guess(
                dir.path(),
                BEHAVIOR_FILE,
                &events,
                DEFAULT_EVENT_COLUMN,
                initial,
                params,
                observed,
            )
        };

        guess(None).unwrap();
        guess(Some(&[1.0, 2.0, 3.0][..])).unwrap();
        assert!(load_alignment(dir.path(), BEHAVIOR_FILE).unwrap().is_none());

        // Event times are shifted into the video by the 300 s offset.
        let candidates: Vec<f64> = trial_times().iter().map(|t| t + 300.0).collect();
        let plan = AlignmentPlan::new(&candidates, 3600.0, initial, params).unwrap();
        let guessed = plan.guessed_times();
        let observed: Vec<f64> = guessed.iter().map(|g| 1.01 * g + 2.0).collect();
        guess(Some(observed.as_slice())).unwrap();

        let saved = load_alignment(dir.path(), BEHAVIOR_FILE).unwrap().unwrap();
        let correction = saved.correction.unwrap();
        assert!((correction.slope - 1.01).abs() < 1e-9);
        assert!((correction.intercept - 2.0).abs() < 1e-6);
        assert_eq!(saved.fit, initial.then(&correction));
        assert_eq!(saved.video_offset_secs, -300.0);
        assert_eq!(saved.points.len(), params.n_points);
        assert_eq!(saved.points[0].guessed, guessed[0]);
    }
}
