use crate::config::StimulusNames;
use crate::errors::SpikeError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

pub const TRIALS_FILE: &str = "trials_info.csv";

const REQUIRED_COLUMNS: [&str; 4] = ["stim_name", "outcome", "block", "nonrandom"];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Hit,
    Error,
    WrongPort,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::Hit, Outcome::Error, Outcome::WrongPort];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Hit => "hit",
            Outcome::Error => "error",
            Outcome::WrongPort => "wrong_port",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.as_str() == s)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One behavioral trial of a recording session.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    pub trial: usize,
    pub stim_name: String,
    pub outcome: Outcome,
    pub block: u32,
    pub nonrandom: bool,
    /// Every other column, as event times in the neural timebase.
    pub events: BTreeMap<String, Option<f64>>,
}

impl TrialRecord {
    pub fn event(&self, name: &str) -> Option<f64> {
        self.events.get(name).copied().flatten()
    }
}

fn cell<'r>(headers: &csv::StringRecord, record: &'r csv::StringRecord, name: &str) -> &'r str {
    headers
        .iter()
        .position(|h| h == name)
        .and_then(|i| record.get(i))
        .unwrap_or("")
        .trim()
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

/// Reads `<recording_dir>/trials_info.csv`.
///
/// A `trial` column is optional; without it trials are numbered from 1.
pub fn load_trials(recording_dir: &Path) -> Result<Vec<TrialRecord>, SpikeError> {
    let path = recording_dir.join(TRIALS_FILE);
    let mut reader = csv::Reader::from_path(&path)?;
    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name);
    for name in REQUIRED_COLUMNS {
        if column(name).is_none() {
            return Err(SpikeError::MissingColumn {
                path: path.clone(),
                column: name.to_string(),
            });
        }
    }

    let mut trials = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let line = idx + 2;
        let bad = |message: String| SpikeError::TrialFormat {
            path: path.clone(),
            line,
            message,
        };

        let outcome_cell = cell(&headers, &record, "outcome");
        let block_cell = cell(&headers, &record, "block");
        let flag_cell = cell(&headers, &record, "nonrandom");
        let trial_cell = cell(&headers, &record, "trial");

        let outcome = Outcome::parse(outcome_cell)
            .ok_or_else(|| bad(format!("unknown outcome {:?}", outcome_cell)))?;
        let block = block_cell
            .parse()
            .map_err(|_| bad(format!("bad block {:?}", block_cell)))?;
        let nonrandom = parse_flag(flag_cell)
            .ok_or_else(|| bad(format!("bad nonrandom flag {:?}", flag_cell)))?;
        let trial = match column("trial") {
            Some(_) => trial_cell
                .parse()
                .map_err(|_| bad(format!("bad trial number {:?}", trial_cell)))?,
            None => idx + 1,
        };

        let mut events = BTreeMap::new();
        for (i, name) in headers.iter().enumerate() {
            if name == "trial" || REQUIRED_COLUMNS.iter().any(|c| *c == name) {
                continue;
            }
            let raw = record.get(i).unwrap_or("").trim();
            let value = if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
                None
            } else {
                Some(
                    raw.parse::<f64>()
                        .map_err(|_| bad(format!("bad {} time {:?}", name, raw)))?,
                )
            };
            events.insert(name.to_string(), value);
        }

        trials.push(TrialRecord {
            trial,
            stim_name: cell(&headers, &record, "stim_name").to_string(),
            outcome,
            block,
            nonrandom,
            events,
        });
    }
    Ok(trials)
}

/// Conditions a trial must meet; unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialFilter {
    pub stim_name: Option<String>,
    pub outcome: Option<Outcome>,
    pub block: Option<u32>,
    pub nonrandom: Option<bool>,
}

impl TrialFilter {
    pub fn matches(&self, trial: &TrialRecord) -> bool {
        self.stim_name.as_ref().map_or(true, |s| *s == trial.stim_name)
            && self.outcome.map_or(true, |o| o == trial.outcome)
            && self.block.map_or(true, |b| b == trial.block)
            && self.nonrandom.map_or(true, |n| n == trial.nonrandom)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelledFilter {
    pub label: String,
    pub filter: TrialFilter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RandomHitsParams {
    /// One label per stimulus; mixed-block stimuli by default.
    pub stimuli: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllParams {
    pub stimuli: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ByOutcomeParams {
    pub stimuli: Vec<String>,
    pub outcomes: Vec<Outcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ByBlockParams {
    /// (label, block number) pairs.
    pub blocks: Vec<(String, u32)>,
}

/// How trials are grouped before folding.
#[derive(Debug, Clone, PartialEq)]
pub enum TrialPicker {
    /// Random-block hits, one group per stimulus.
    RandomHits(RandomHitsParams),
    /// Every trial, one group per stimulus.
    All(AllParams),
    /// Random-block trials per stimulus and outcome, labelled `<stim>-<outcome>`.
    ByOutcome(ByOutcomeParams),
    /// Random-block hits per block.
    RandomHitsByBlock(ByBlockParams),
}

/// Preset names for the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PickerKind {
    #[default]
    RandomHits,
    All,
    ByOutcome,
    RandomHitsByBlock,
}

impl TrialPicker {
    pub fn preset(kind: PickerKind, stimuli: &StimulusNames) -> Self {
        match kind {
            PickerKind::RandomHits => TrialPicker::RandomHits(RandomHitsParams {
                stimuli: stimuli.mixed.clone(),
            }),
            PickerKind::All => TrialPicker::All(AllParams {
                stimuli: stimuli.all.clone(),
            }),
            PickerKind::ByOutcome => TrialPicker::ByOutcome(ByOutcomeParams {
                stimuli: stimuli.mixed.clone(),
                outcomes: Outcome::ALL.to_vec(),
            }),
            PickerKind::RandomHitsByBlock => TrialPicker::RandomHitsByBlock(ByBlockParams {
                blocks: vec![("LB".to_string(), 2), ("PB".to_string(), 4)],
            }),
        }
    }

    pub fn filters(&self) -> Vec<LabelledFilter> {
        let per_stim = |stimuli: &[String], outcome: Option<Outcome>, nonrandom: Option<bool>| {
            stimuli
                .iter()
                .map(|s| LabelledFilter {
                    label: s.clone(),
                    filter: TrialFilter {
                        stim_name: Some(s.clone()),
                        outcome,
                        nonrandom,
                        ..TrialFilter::default()
                    },
                })
                .collect::<Vec<_>>()
        };

        match self {
            TrialPicker::RandomHits(p) => per_stim(p.stimuli.as_slice(), Some(Outcome::Hit), Some(false)),
            TrialPicker::All(p) => per_stim(p.stimuli.as_slice(), None, None),
            TrialPicker::ByOutcome(p) => p
                .stimuli
                .iter()
                .flat_map(|s| {
                    p.outcomes.iter().map(move |o| LabelledFilter {
                        label: format!("{}-{}", s, o),
                        filter: TrialFilter {
                            stim_name: Some(s.clone()),
                            outcome: Some(*o),
                            nonrandom: Some(false),
                            ..TrialFilter::default()
                        },
                    })
                })
                .collect(),
            TrialPicker::RandomHitsByBlock(p) => p
                .blocks
                .iter()
                .map(|(label, block)| LabelledFilter {
                    label: label.clone(),
                    filter: TrialFilter {
                        outcome: Some(Outcome::Hit),
                        block: Some(*block),
                        nonrandom: Some(false),
                        ..TrialFilter::default()
                    },
                })
                .collect(),
        }
    }

    /// Groups matching trials under each label, in label order.
    pub fn pick<'a>(&self, trials: &'a [TrialRecord]) -> Vec<(String, Vec<&'a TrialRecord>)> {
        self.filters()
            .into_iter()
            .map(|lf| {
                let picked = trials.iter().filter(|t| lf.filter.matches(t)).collect();
                (lf.label, picked)
            })
            .collect()
    }
}
