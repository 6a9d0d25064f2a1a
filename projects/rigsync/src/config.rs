// Lab configuration
//
// Rig names, the canonical mouse list, mouse aliases and the spike session
// registry. Everything that used to be a hardcoded table is a field here so
// that several lab layouts can be used side by side.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Which end of the recording the timestamp in a video filename marks.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoTimestamp {
    /// Camera software stamps the file when recording stops.
    #[default]
    End,
    Start,
}

/// Stimulus names used by the trial picker presets.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StimulusNames {
    pub all: Vec<String>,
    /// Stimuli presented in the mixed (randomised) blocks.
    pub mixed: Vec<String>,
}

impl Default for StimulusNames {
    fn default() -> Self {
        let all: Vec<String> = [
            "lo_pc_go", "hi_pc_no", "le_lc_go", "ri_lc_no", "le_hi_lc", "ri_hi_lc", "le_lo_lc",
            "ri_lo_lc", "le_hi_pc", "ri_hi_pc", "le_lo_pc", "ri_lo_pc",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let mixed = all[4..].to_vec();
        Self { all, mixed }
    }
}

/// One animal in the spike data store.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AnimalEntry {
    pub name: String,
    pub data_dir: PathBuf,
    #[serde(default)]
    pub sessions: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LabConfig {
    pub rigs: Vec<String>,
    pub mice: Vec<String>,
    pub aliases: BTreeMap<String, String>,
    pub video_timestamp: VideoTimestamp,
    pub stimuli: StimulusNames,
    pub animals: Vec<AnimalEntry>,
}

impl Default for LabConfig {
    fn default() -> Self {
        let to_strings = |names: &[&str]| names.iter().map(|s| s.to_string()).collect();
        let aliases = [("KF13A", "KF13"), ("AM03A", "AM03")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self {
            rigs: to_strings(&["L1", "L2", "L3"]),
            mice: to_strings(&[
                "AM03", "AM05", "KF13", "KM14", "KF16", "KF17", "KF18", "KF19", "KM24", "KM25",
            ]),
            aliases,
            video_timestamp: VideoTimestamp::End,
            stimuli: StimulusNames::default(),
            animals: Vec::new(),
        }
    }
}

impl LabConfig {
    /// Loads a JSON config, or the built-in lab tables when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Every alias must point at a canonical mouse, and never at another alias.
    pub fn validate(&self) -> Result<()> {
        for (alias, target) in &self.aliases {
            if !self.mice.contains(target) {
                anyhow::bail!("Alias {} points at unknown mouse {}", alias, target);
            }
            if self.aliases.contains_key(target) {
                anyhow::bail!("Alias {} points at another alias {}", alias, target);
            }
        }
        Ok(())
    }

    pub fn is_rig(&self, rig: &str) -> bool {
        self.rigs.iter().any(|r| r == rig)
    }

    /// Upcases and applies the alias table.
    pub fn resolve_alias(&self, raw: &str) -> String {
        let upper = raw.to_uppercase();
        match self.aliases.get(&upper) {
            Some(target) => target.clone(),
            None => upper,
        }
    }

    /// Canonical mouse name, or `None` if the name is not on the list.
    pub fn normalize_mouse(&self, raw: &str) -> Option<String> {
        let name = self.resolve_alias(raw);
        if self.mice.contains(&name) {
            Some(name)
        } else {
            None
        }
    }
}
