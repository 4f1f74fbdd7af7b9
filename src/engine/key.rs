use crate::model::pitch::{PITCH_CLASS_NAMES, Pitch, parse_pitch_class};
use crate::model::song::NoteEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label used when there is nothing to detect a key from.
pub const UNKNOWN_KEY: &str = "Unknown";

/// Krumhansl-Kessler major key profile, tonic first.
pub const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Krumhansl-Kessler minor key profile, tonic first.
pub const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyMode {
    Major,
    Minor,
}

impl fmt::Display for KeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMode::Major => f.write_str("Major"),
            KeyMode::Minor => f.write_str("Minor"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct KeyDetection {
    /// Pitch class of the tonic, 0 = C .. 11 = B.
    pub tonic: u8,
    pub mode: KeyMode,
    /// Dot product of the normalized histogram against the winning profile.
    pub correlation: f64,
}

impl KeyDetection {
    /// e.g. `E Major`.
    pub fn label(&self) -> String {
        format!("{} {}", PITCH_CLASS_NAMES[self.tonic as usize], self.mode)
    }
}

/// Duration-weighted pitch-class distribution, normalized to sum to 1.
///
/// Pitches are decoded from the note names, the same as the matcher, so a note it drops
/// carries no weight here either. Notes without a positive duration weigh 1.
/// Returns `None` when there is no weight at all.
pub fn pitch_class_histogram(notes: &[NoteEvent]) -> Option<[f64; 12]> {
    let mut histogram = [0.0_f64; 12];
    for note in notes {
        let Some(pitch) = Pitch::parse(&note.pitch_name) else {
            continue;
        };

        let weight = if note.duration > 0.0 { note.duration } else { 1.0 };
        histogram[pitch.class() as usize] += weight;
    }

    let total: f64 = histogram.iter().sum();
    if total <= 0.0 {
        return None;
    }

    for h in &mut histogram {
        *h /= total;
    }

    Some(histogram)
}

/// Krumhansl-Schmuckler key finding.
///
/// The histogram is rotated onto each of the 12 tonics and correlated against both profiles.
/// Candidates are visited tonic-ascending, major before minor, and only a strictly better
/// correlation replaces the current best.
pub fn detect_key_detailed(notes: &[NoteEvent]) -> Option<KeyDetection> {
    let histogram = pitch_class_histogram(notes)?;

    let mut best: Option<KeyDetection> = None;
    for tonic in 0..12u8 {
        let mut rotated = [0.0; 12];
        for (i, slot) in rotated.iter_mut().enumerate() {
            *slot = histogram[(i + tonic as usize) % 12];
        }

        for (mode, profile) in [(KeyMode::Major, &MAJOR_PROFILE), (KeyMode::Minor, &MINOR_PROFILE)] {
            let correlation = dot(&rotated, profile);

            if best.is_none_or(|b| correlation > b.correlation) {
                best = Some(KeyDetection {
                    tonic,
                    mode,
                    correlation,
                });
            }
        }
    }

    best
}

/// Key label such as `"E Major"`, or `"Unknown"` for empty input.
pub fn detect_key(notes: &[NoteEvent]) -> String {
    detect_key_detailed(notes)
        .map(|k| k.label())
        .unwrap_or_else(|| UNKNOWN_KEY.to_string())
}

/// Tonic pitch class of a key label, `None` for `"Unknown"` or anything unreadable.
pub fn key_tonic(label: &str) -> Option<u8> {
    label.split_whitespace().next().and_then(parse_pitch_class)
}

fn dot(a: &[f64; 12], b: &[f64; 12]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
