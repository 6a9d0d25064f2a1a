use crate::errors::SpikeError;
use crate::spikes::store::SpikeServer;
use crate::spikes::trials::{TrialPicker, TrialRecord};
use crate::spikes::ulabel::UnitLabel;
use serde::{Deserialize, Serialize};

/// Event the folds are locked to unless another one is asked for.
pub const DEFAULT_LOCKING_EVENT: &str = "stim_onset";

/// Window around each event, in seconds relative to it: `[dstart, dstop)`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct FoldWindow {
    pub dstart: f64,
    pub dstop: f64,
}

impl Default for FoldWindow {
    fn default() -> Self {
        Self {
            dstart: -0.25,
            dstop: 0.3,
        }
    }
}

/// Spikes around a set of events, relative to each event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Folded {
    pub label: String,
    pub window: FoldWindow,
    pub centers: Vec<f64>,
    /// One entry per center.
    pub spikes: Vec<Vec<f64>>,
}

impl Folded {
    pub fn total_spikes(&self) -> usize {
        self.spikes.iter().map(Vec::len).sum()
    }

    /// Mean firing rate over the window, in Hz.
    pub fn mean_rate(&self) -> Option<f64> {
        let width = self.window.dstop - self.window.dstart;
        if self.centers.is_empty() || width <= 0.0 {
            return None;
        }
        Some(self.total_spikes() as f64 / (self.centers.len() as f64 * width))
    }
}

/// Folds sorted `spikes` around each of `centers`.
pub fn fold(label: &str, spikes: &[f64], centers: &[f64], window: FoldWindow) -> Folded {
    let folded = centers
        .iter()
        .map(|&c| {
            let lo = spikes.partition_point(|&s| s < c + window.dstart);
            let hi = spikes.partition_point(|&s| s < c + window.dstop);
            spikes[lo..hi.max(lo)].iter().map(|s| s - c).collect::<Vec<f64>>()
        })
        .collect();

    Folded {
        label: label.to_string(),
        window,
        centers: centers.to_vec(),
        spikes: folded,
    }
}

/// Folds one unit's spikes for each group of picked trials, locked on
/// `event`. Trials without that event are left out.
pub fn fold_unit(
    server: &dyn SpikeServer,
    unit: &UnitLabel,
    trials: &[TrialRecord],
    picker: &TrialPicker,
    event: &str,
    window: FoldWindow,
) -> Result<Vec<Folded>, SpikeError> {
    let spikes = server.unit_spikes(unit, true)?;

    let folds = picker
        .pick(trials)
        .into_iter()
        .map(|(label, picked)| {
            let centers: Vec<f64> = picked.iter().filter_map(|t| t.event(event)).collect();
            if centers.len() < picked.len() {
                tracing::debug!(
                    "{}: {} of {} trials have no {}",
                    label,
                    picked.len() - centers.len(),
                    picked.len(),
                    event
                );
            }
            fold(&label, &spikes, &centers, window)
        })
        .collect();
    Ok(folds)
}
