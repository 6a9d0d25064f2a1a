use crate::config::{AnimalEntry, LabConfig};
use crate::errors::SpikeError;
use crate::spikes::ulabel::UnitLabel;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const SPIKES_FILE: &str = "spikes.csv";

/// Source of spike times for a unit in a session.
pub trait SpikeServer {
    fn spike_times(&self, session: &str, unit: u32) -> Result<Vec<f64>, SpikeError>;

    /// Spike times for a unit label, sorted ascending when `sort` is set.
    fn unit_spikes(&self, label: &UnitLabel, sort: bool) -> Result<Vec<f64>, SpikeError> {
        let mut spikes = self.spike_times(&label.session, label.unit)?;
        if sort {
            spikes.sort_by(f64::total_cmp);
        }
        Ok(spikes)
    }
}

/// Which animal each recording session belongs to.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    animals: Vec<AnimalEntry>,
}

impl SessionRegistry {
    pub fn new(animals: Vec<AnimalEntry>) -> Self {
        Self { animals }
    }

    pub fn from_config(config: &LabConfig) -> Self {
        Self::new(config.animals.clone())
    }

    pub fn locate(&self, session: &str) -> Result<&AnimalEntry, SpikeError> {
        self.animals
            .iter()
            .find(|a| a.sessions.iter().any(|s| s == session))
            .ok_or_else(|| SpikeError::UnknownSession(session.to_string()))
    }

    /// `<data_dir>/<session>` of the animal that recorded `session`.
    pub fn recording_dir(&self, session: &str) -> Result<PathBuf, SpikeError> {
        Ok(self.locate(session)?.data_dir.join(session))
    }
}

#[derive(Debug, Deserialize)]
struct SpikeRow {
    unit: u32,
    time: f64,
}

/// Reads spikes from `<recording_dir>/spikes.csv`.
#[derive(Debug, Clone)]
pub struct CsvSpikeStore {
    pub registry: SessionRegistry,
}

impl CsvSpikeStore {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }
}

fn read_unit(path: &Path, unit: u32) -> Result<Vec<f64>, SpikeError> {
    let mut reader = csv::Reader::from_path(path)?;
    for column in ["unit", "time"] {
        if !reader.headers()?.iter().any(|h| h == column) {
            return Err(SpikeError::MissingColumn {
                path: path.to_path_buf(),
                column: column.to_string(),
            });
        }
    }

    let mut times = Vec::new();
    for row in reader.deserialize::<SpikeRow>() {
        let row = row?;
        if row.unit == unit {
            times.push(row.time);
        }
    }
    Ok(times)
}

impl SpikeServer for CsvSpikeStore {
    fn spike_times(&self, session: &str, unit: u32) -> Result<Vec<f64>, SpikeError> {
        let path = self.registry.recording_dir(session)?.join(SPIKES_FILE);
        let times = read_unit(&path, unit)?;
        tracing::debug!(
            "Loaded {} spikes for {}-{} from {}",
            times.len(),
            session,
            unit,
            path.display()
        );
        Ok(times)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn registry(data_dir: &Path) -> SessionRegistry {
        SessionRegistry::new(vec![
            AnimalEntry {
                name: "CR20B".to_string(),
                data_dir: data_dir.join("CR20B"),
                sessions: vec!["CR20B_120613_001_behaving".to_string()],
            },
            AnimalEntry {
                name: "YT6A".to_string(),
                data_dir: data_dir.join("YT6A"),
                sessions: vec!["YT6A_120201_behaving".to_string()],
            },
        ])
    }

    #[test]
    fn test_locate_session() {
        let registry = registry(Path::new("/data"));
        assert_eq!(registry.locate("YT6A_120201_behaving").unwrap().name, "YT6A");
        assert_eq!(
            registry.recording_dir("CR20B_120613_001_behaving").unwrap(),
            PathBuf::from("/data/CR20B/CR20B_120613_001_behaving")
        );
        let err = registry.locate("CR99_behaving").unwrap_err();
        assert_eq!(err.to_string(), "No session like CR99_behaving found!");
    }

    #[test]
    fn test_csv_store_filters_and_sorts_unit() {
        let root = tempfile::tempdir().unwrap();
        let session_dir = root.path().join("CR20B/CR20B_120613_001_behaving");
        fs::create_dir_all(&session_dir).unwrap();
        fs::write(
            session_dir.join(SPIKES_FILE),
            "unit,time\n3,2.5\n4,0.1\n3,1.25\n3,7.0\n",
        )
        .unwrap();

        let store = CsvSpikeStore::new(registry(root.path()));
        let label = UnitLabel::parse("CR20B_120613_001_behaving-3").unwrap();
        assert_eq!(store.unit_spikes(&label, false).unwrap(), vec![2.5, 1.25, 7.0]);
        assert_eq!(store.unit_spikes(&label, true).unwrap(), vec![1.25, 2.5, 7.0]);

        let unknown = UnitLabel::parse("YT6A_120201_behaving-1").unwrap();
        assert!(store.unit_spikes(&unknown, true).is_err());
    }

    #[test]
    fn test_missing_column() {
        let root = tempfile::tempdir().unwrap();
        let session_dir = root.path().join("CR20B/CR20B_120613_001_behaving");
        fs::create_dir_all(&session_dir).unwrap();
        fs::write(session_dir.join(SPIKES_FILE), "unit,t\n3,2.5\n").unwrap();
        let store = CsvSpikeStore::new(registry(root.path()));
        let err = store.spike_times("CR20B_120613_001_behaving", 3).unwrap_err();
        assert!(matches!(err, SpikeError::MissingColumn { column, .. } if column == "time"));
    }
}
