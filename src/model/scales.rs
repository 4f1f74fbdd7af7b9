use crate::model::pitch::Pitch;
use anyhow::{Result, anyhow, bail};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;

const BUILTIN_SCALES: &str = include_str!("../../resources/scales.json");

/// One tuned instrument: the ding plus the tone fields around it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScaleDefinition {
    pub id: String,
    pub name: String,
    /// The ding, e.g. `D3`.
    pub root: String,
    pub top_notes: Vec<String>,
    #[serde(default)]
    pub bottom_notes: Vec<String>,
    #[serde(default)]
    pub popularity_score: f64,
    pub total_note_count: u32,
}

impl ScaleDefinition {
    pub fn root_pitch(&self) -> Option<Pitch> {
        Pitch::parse(&self.root)
    }

    fn note_names(&self) -> impl Iterator<Item = &String> {
        std::iter::once(&self.root)
            .chain(self.top_notes.iter())
            .chain(self.bottom_notes.iter())
    }

    /// Every pitch the instrument can sound (ding, top and bottom notes).
    /// Names that fail to parse are skipped here and reported when the library loads.
    pub fn playable_pitches(&self) -> BTreeSet<Pitch> {
        self.note_names().filter_map(|n| Pitch::parse(n)).collect()
    }

    pub fn pitch_classes(&self) -> [bool; 12] {
        let mut classes = [false; 12];
        for pitch in self.playable_pitches() {
            classes[pitch.class() as usize] = true;
        }
        classes
    }

    pub fn invalid_note_names(&self) -> Vec<&str> {
        self.note_names()
            .filter(|n| Pitch::parse(n).is_none())
            .map(|n| n.as_str())
            .collect()
    }
}

/// A versioned, read-only catalogue of scales.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScaleLibrary {
    pub version: String,
    pub scales: Vec<ScaleDefinition>,
}

impl ScaleLibrary {
    /// The catalogue shipped in `resources/scales.json`.
    pub fn builtin() -> Result<Self> {
        Self::from_json_str(BUILTIN_SCALES)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow!(
                "Failed to read scale library {}: {}",
                path.as_ref().display(),
                e
            )
        })?;

        Self::from_json_str(&data)
    }

    pub fn from_json_str(data: &str) -> Result<Self> {
        let library: ScaleLibrary = serde_json::from_str(data)
            .map_err(|e| anyhow!("Failed to parse scale library: {}", e))?;
        library.validate()?;

        debug!(
            "Loaded scale library v{} with {} scales",
            library.version,
            library.scales.len()
        );

        Ok(library)
    }

    pub fn get(&self, id: &str) -> Option<&ScaleDefinition> {
        self.scales.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.scales.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scales.is_empty()
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();

        for scale in &self.scales {
            if !seen.insert(scale.id.as_str()) {
                bail!("Duplicate scale id '{}' in library..!", scale.id);
            }

            if scale.root_pitch().is_none() {
                warn!(
                    "Scale '{}' has an unreadable root '{}', it will never earn a key bonus..!",
                    scale.id, scale.root
                );
            }

            let invalid = scale.invalid_note_names();
            if !invalid.is_empty() {
                warn!(
                    "Scale '{}' has unreadable notes {:?}, skipping them..!",
                    scale.id, invalid
                );
            }

            let listed = 1 + scale.top_notes.len() + scale.bottom_notes.len();
            if listed != scale.total_note_count as usize {
                warn!(
                    "Scale '{}' claims {} notes but lists {}..!",
                    scale.id, scale.total_note_count, listed
                );
            }
        }

        Ok(())
    }
}
