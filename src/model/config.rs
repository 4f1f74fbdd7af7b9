use anyhow::{Result, anyhow};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "HANDPAN_FIT",
    about = "Find the handpan scale that best fits a MIDI melody!"
)]
pub struct Args {
    /// Path to the target MIDI file.
    pub midi: PathBuf,

    /// Tie-break mode for the recommendation: standard|pro.
    #[arg(short, long, default_value = "standard")]
    pub mode: String,

    /// Load the scale catalogue from a JSON file instead of the built-in one.
    #[arg(short, long)]
    pub scales: Option<PathBuf>,

    /// JSON file overriding the analysis thresholds and weights.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Manually override a track's role after classification, e.g. `--role 2=melody`.
    /// May be passed more than once.
    #[arg(short, long = "role")]
    pub roles: Vec<String>,

    /// How many runner-up candidates to print.
    #[arg(short, long, default_value_t = 5)]
    pub top: usize,

    /// Print the full analysis as JSON instead of a summary.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Dry run (list the tracks and their roles, then exit).
    #[arg(short, long, default_value_t = false)]
    pub dry_run: bool,

    /// Prints extra information to the terminal.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Tunable thresholds and weights for every analysis stage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct AnalysisConfig {
    pub import: ImportConfig,
    pub classifier: ClassifierConfig,
    pub matcher: MatcherConfig,
    pub ranker: RankerConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ImportConfig {
    /// Notes past this count are dropped from a track.
    pub max_notes_per_track: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_notes_per_track: 20_000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Average number of sounding notes above which a track counts as chordal.
    pub harmony_polyphony: f64,
    /// Notes per second below which a track is considered sparse.
    pub sparse_density: f64,
    /// Widest pitch range (semitones) a sparse track may have and still be rhythm.
    pub rhythm_max_range: u8,
    pub min_melody_notes: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            harmony_polyphony: 1.5,
            sparse_density: 0.15,
            rhythm_max_range: 12,
            min_melody_notes: 4,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MatcherConfig {
    /// Candidates are scored for every shift in `-range..=range`.
    pub transposition_range: i32,
    pub exact_weight: f64,
    pub folded_weight: f64,
    /// Shifts (in absolute semitones) treated as fourths/fifths.
    pub natural_shifts: Vec<i32>,
    pub natural_penalty: f64,
    pub other_penalty: f64,
    pub key_bonus: f64,
    pub popularity_threshold: f64,
    pub popularity_bonus: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            transposition_range: 6,
            exact_weight: 1.0,
            folded_weight: 0.8,
            natural_shifts: vec![5, 7],
            natural_penalty: 5.0,
            other_penalty: 15.0,
            key_bonus: 10.0,
            popularity_threshold: 0.7,
            popularity_bonus: 3.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RankerConfig {
    /// Score distance from the best candidate that still counts as the top tier.
    pub tier_margin: f64,
    /// Instrument sizes preferred by standard mode.
    pub tier_one_sizes: Vec<u32>,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            tier_margin: 3.0,
            tier_one_sizes: vec![9, 10],
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AnalysisConfig> {
    let data = fs::read_to_string(path.as_ref()).map_err(|e| {
        anyhow!(
            "Failed to read config file {}: {}",
            path.as_ref().display(),
            e
        )
    })?;

    serde_json::from_str(&data).map_err(|e| anyhow!("Failed to parse config: {}", e))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let json = r#"{ "ranker": { "tier_margin": 5.0 }, "classifier": { "harmony_polyphony": 2.0 } }"#;
        let config: AnalysisConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.ranker.tier_margin, 5.0);
        assert_eq!(config.ranker.tier_one_sizes, vec![9, 10]);
        assert_eq!(config.classifier.harmony_polyphony, 2.0);
        assert_eq!(config.classifier.min_melody_notes, 4);
        assert_eq!(config.matcher, MatcherConfig::default());
    }

    #[test]
    fn cli_parses_repeated_roles() {
        let args = Args::parse_from([
            "HANDPAN_FIT",
            "song.mid",
            "--mode",
            "pro",
            "--role",
            "1=melody",
            "--role",
            "2=ignore",
        ]);

        assert_eq!(args.mode, "pro");
        assert_eq!(args.roles, vec!["1=melody", "2=ignore"]);
        assert_eq!(args.top, 5);
        assert!(!args.json);
    }
}
