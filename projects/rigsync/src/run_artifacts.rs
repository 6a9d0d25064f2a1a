// Alignment artifacts
//
// Persisted as JSON under the output root, one per behavior session, and
// read back by the frame dumper.

use crate::align::{LinearFit, Refit};
use crate::session::SessionRow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Reference point confirmed by the user.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub guessed: f64,
    pub observed: f64,
}

/// Time-base correction from a behavior session to its video.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AlignmentRecord {
    pub behavior_file: String,
    pub video_path: PathBuf,
    /// Video start minus behavior start, in seconds.
    pub video_offset_secs: f64,
    pub video_duration_secs: f64,
    pub initial: LinearFit,
    /// Correction fitted on top of `initial`, when the user refit.
    #[serde(default)]
    pub correction: Option<LinearFit>,
    /// `initial` followed by `correction`; what downstream tools apply.
    pub fit: LinearFit,
    #[serde(default)]
    pub points: Vec<Correspondence>,
    #[serde(default)]
    pub residuals: Vec<f64>,
    pub created_at: DateTime<Utc>,
}

impl AlignmentRecord {
    /// Record for `row`, using `initial` until a refit is attached.
    ///
    /// Returns `None` for rows without a fully probed video.
    pub fn for_row(row: &SessionRow, initial: LinearFit) -> Option<Self> {
        Some(Self {
            behavior_file: row.filename.clone(),
            video_path: row.video_path.clone()?,
            video_offset_secs: row.video_offset_secs()?,
            video_duration_secs: row.video_duration_secs?,
            initial,
            correction: None,
            fit: initial,
            points: Vec::new(),
            residuals: Vec::new(),
            created_at: Utc::now(),
        })
    }

    pub fn apply_refit(&mut self, refit: &Refit, guessed: &[f64], observed: &[f64]) {
        self.correction = Some(refit.correction);
        self.fit = refit.combined;
        self.residuals = refit.residuals.clone();
        self.points = guessed
            .iter()
            .zip(observed)
            .map(|(&guessed, &observed)| Correspondence { guessed, observed })
            .collect();
    }
}
