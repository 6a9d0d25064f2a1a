// Spike loading and trial folding for recorded units
//
// Units are named `<session>-<unit>`. Sessions are found through the
// animal table in the lab config; each session directory holds a
// `spikes.csv` (unit,time) and a `trials_info.csv`.

pub mod fold;
pub mod store;
pub mod trials;
pub mod ulabel;

pub use fold::{fold, fold_unit, FoldWindow, Folded};
pub use store::{CsvSpikeStore, SessionRegistry, SpikeServer};
pub use trials::{load_trials, Outcome, PickerKind, TrialFilter, TrialPicker, TrialRecord};
pub use ulabel::UnitLabel;
