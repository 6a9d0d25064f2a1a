use anyhow::{Context, Result};
use std::path::Path;

/// Column of retraction times in per-session event tables.
pub const DEFAULT_EVENT_COLUMN: &str = "time_retract";

/// Reads one column of event times, one row per trial.
///
/// Empty cells and `nan` are undefined events; anything else must parse as
/// a number.
pub fn load_event_times(path: &Path, column: &str) -> Result<Vec<Option<f64>>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open events {}", path.display()))?;
    let idx = reader
        .headers()?
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| anyhow::anyhow!("{} has no column {}", path.display(), column))?;

    let mut times = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let cell = record.get(idx).unwrap_or("").trim();
        if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
            times.push(None);
            continue;
        }
        let value: f64 = cell
            .parse()
            .with_context(|| format!("{} row {}: bad time {:?}", path.display(), line + 1, cell))?;
        times.push(Some(value));
    }
    Ok(times)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_event_times() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "trial,time_retract\n1,12.5\n2,\n3,NaN\n4,40\n").unwrap();
        file.flush().unwrap();
        let times = load_event_times(file.path(), DEFAULT_EVENT_COLUMN).unwrap();
        assert_eq!(times, vec![Some(12.5), None, None, Some(40.0)]);
    }

    #[test]
    fn test_missing_column_and_bad_value() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "trial,time_retract\n1,soon\n").unwrap();
        file.flush().unwrap();
        assert!(load_event_times(file.path(), "time_stim").is_err());
        assert!(load_event_times(file.path(), DEFAULT_EVENT_COLUMN).is_err());
    }
}
