use crate::run_artifacts::AlignmentRecord;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const ALIGNMENTS_DIR: &str = "alignments";

fn alignment_path(output_root: &Path, behavior_file: &str) -> PathBuf {
    output_root
        .join(ALIGNMENTS_DIR)
        .join(format!("{}.json", behavior_file))
}

/// Writes `<output_root>/alignments/<behavior_file>.json`, replacing any
/// earlier alignment of the same session.
pub fn save_alignment(output_root: &Path, record: &AlignmentRecord) -> Result<PathBuf> {
    let path = alignment_path(output_root, &record.behavior_file);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(record)?;
    fs::write(&path, content)
        .with_context(|| format!("Failed to write alignment {}", path.display()))?;
    Ok(path)
}

pub fn load_alignment(output_root: &Path, behavior_file: &str) -> Result<Option<AlignmentRecord>> {
    let path = alignment_path(output_root, behavior_file);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)?;
    let record = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse alignment {}", path.display()))?;
    Ok(Some(record))
}

pub fn list_alignments(output_root: &Path) -> Result<Vec<AlignmentRecord>> {
    let mut records = Vec::new();
    let dir = output_root.join(ALIGNMENTS_DIR);
    if !dir.exists() {
        return Ok(records);
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    paths.sort();

    for path in paths {
        let content = fs::read_to_string(&path)?;
        match serde_json::from_str::<AlignmentRecord>(&content) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("Skipping {}: {}", path.display(), e),
        }
    }
    Ok(records)
}

/// Creates the frame directory for one session.
///
/// Returns `None` when it already exists, so finished sessions are not
/// dumped twice.
pub fn create_session_frame_dir(frame_root: &Path, session: &str) -> Result<Option<PathBuf>> {
    let dir = frame_root.join(session);
    if dir.exists() {
        return Ok(None);
    }
    fs::create_dir_all(&dir)?;
    Ok(Some(dir))
}
