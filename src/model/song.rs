use crate::model::pitch::Pitch;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The musical job a track does in the arrangement.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Melody,
    Rhythm,
    Harmony,
    #[default]
    Ignore,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Melody => "melody",
            Role::Rhythm => "rhythm",
            Role::Harmony => "harmony",
            Role::Ignore => "ignore",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the ranker breaks near-ties between scale candidates.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Prefer beginner friendly 9/10 note instruments within the top scoring tier.
    #[default]
    Standard,

    /// Always take the single highest score.
    Pro,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NoteEvent {
    pub pitch_midi: u8,
    pub pitch_name: String,
    /// Seconds from the start of the song.
    pub start_time: f64,
    /// Seconds.
    pub duration: f64,
    /// Normalized to `0.0..=1.0`.
    pub velocity: f64,
}

impl NoteEvent {
    pub fn new(pitch_midi: u8, start_time: f64, duration: f64, velocity: f64) -> Self {
        Self {
            pitch_midi,
            pitch_name: Pitch::from_midi(pitch_midi).name(),
            start_time,
            duration,
            velocity: velocity.clamp(0.0, 1.0),
        }
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration.max(0.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: u32,
    pub name: String,
    pub channel: u8,
    pub is_percussion: bool,
    pub notes: Vec<NoteEvent>,
    #[serde(default)]
    pub role: Role,
}

impl Track {
    pub fn with_role(&self, role: Role) -> Self {
        Self {
            role,
            ..self.clone()
        }
    }
}

/// Score breakdown for one `(scale, transposition)` pair.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MatchCandidate {
    pub scale_id: String,
    pub transposition: i32,
    pub exact_match_count: f64,
    pub folded_match_count: f64,
    pub coverage: f64,
    pub transpose_penalty: f64,
    pub key_bonus: f64,
    pub popularity_bonus: f64,
    pub score: f64,
    pub matched_notes: Vec<String>,
    pub folded_notes: Vec<String>,
    pub missed_notes: Vec<String>,
}

impl MatchCandidate {
    /// The "no recommendation" candidate: zero score, no scale, empty note lists.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_none(&self) -> bool {
        self.scale_id.is_empty()
    }
}

/// Snapshot of one analysis run over a song.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedSong {
    pub name: String,
    pub bpm: f64,
    pub mode: MatchMode,
    pub tracks: Vec<Track>,
    pub detected_key: String,
    pub suggested_scale_id: Option<String>,
    pub best_match: MatchCandidate,
    /// Coverage of the winning candidate, `0.0..=1.0`.
    pub confidence: f64,
    /// Melody notes whose names couldn't be decoded and were left out of matching.
    pub dropped_note_count: usize,
    #[serde(default)]
    pub candidates: Vec<MatchCandidate>,
}

impl ProcessedSong {
    pub fn melody_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.role == Role::Melody)
    }

    pub fn has_recommendation(&self) -> bool {
        self.suggested_scale_id.is_some()
    }
}
