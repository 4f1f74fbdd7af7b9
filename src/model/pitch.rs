use serde::{Deserialize, Serialize};
use std::fmt;

/// Sharp spellings, indexed by pitch class (0 = C .. 11 = B).
pub const PITCH_CLASS_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// C0, the lowest pitch whose name still has a non-negative octave.
pub const LOWEST_NAMED_MIDI: u8 = 12;

/// A concrete pitch, stored as a MIDI note number.
///
/// The number is allowed to leave `0..=127` while transposing candidates around,
/// only the importer is bound to the MIDI range.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pitch(pub i32);

impl Pitch {
    pub fn from_midi(midi: u8) -> Self {
        Self(midi as i32)
    }

    pub fn midi(&self) -> i32 {
        self.0
    }

    /// Pitch class, 0 = C .. 11 = B.
    pub fn class(&self) -> u8 {
        self.0.rem_euclid(12) as u8
    }

    /// Scientific octave number, C4 = MIDI 60.
    pub fn octave(&self) -> i32 {
        self.0.div_euclid(12) - 1
    }

    /// Shift by `semitones`, carrying into the octave when crossing B/C.
    pub fn transpose(&self, semitones: i32) -> Self {
        Self(self.0 + semitones)
    }

    pub fn name(&self) -> String {
        format!("{}{}", PITCH_CLASS_NAMES[self.class() as usize], self.octave())
    }

    /// Parse a name such as `F#4`, `Bb3` or `c5`.
    ///
    /// Returns `None` for anything that doesn't decode into a pitch class followed by a
    /// non-negative octave, and for spellings like `Cb0` that land below C0.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        let (class, rest) = split_pitch_class(name)?;

        if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        let octave: i32 = rest.parse().ok()?;
        let midi = octave.checked_add(1)?.checked_mul(12)?.checked_add(class)?;
        if midi < LOWEST_NAMED_MIDI as i32 {
            return None;
        }

        Some(Self(midi))
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Parse a bare pitch class such as `F#`, `Eb` or `a`.
pub fn parse_pitch_class(name: &str) -> Option<u8> {
    let (class, rest) = split_pitch_class(name.trim())?;
    if !rest.is_empty() {
        return None;
    }

    Some(class.rem_euclid(12) as u8)
}

/// Splits the leading letter (+ accidental) off a note name. The returned class is not
/// wrapped, so `Cb` yields -1 and `B#` yields 12, which keeps the octave arithmetic honest.
fn split_pitch_class(name: &str) -> Option<(i32, &str)> {
    let mut chars = name.chars();
    let letter = chars.next()?;

    let natural = match letter.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let rest = &name[letter.len_utf8()..];
    if let Some(stripped) = rest.strip_prefix('#') {
        Some((natural + 1, stripped))
    } else if let Some(stripped) = rest.strip_prefix('b') {
        Some((natural - 1, stripped))
    } else {
        Some((natural, rest))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn names_round_trip_through_midi() {
        assert_eq!(Pitch::from_midi(60).name(), "C4");
        assert_eq!(Pitch::from_midi(66).name(), "F#4");
        assert_eq!(Pitch::parse("F#4"), Some(Pitch(66)));
        assert_eq!(Pitch::parse("A4"), Some(Pitch(69)));
    }

    #[test]
    fn flats_and_enharmonics() {
        assert_eq!(Pitch::parse("Bb3"), Pitch::parse("A#3"));
        assert_eq!(Pitch::parse("B#3"), Pitch::parse("C4"));
        assert_eq!(Pitch::parse("Cb4"), Pitch::parse("B3"));
        assert_eq!(Pitch::parse("e2").map(|p| p.name()), Some("E2".into()));
    }

    #[test]
    fn transpose_rolls_the_octave() {
        let b3 = Pitch::parse("B3").unwrap();
        assert_eq!(b3.transpose(2).name(), "C#4");

        let c4 = Pitch::parse("C4").unwrap();
        assert_eq!(c4.transpose(-1).name(), "B3");
        assert_eq!(c4.transpose(-13).name(), "B2");
    }

    #[test]
    fn malformed_names_are_rejected() {
        for bad in ["", "H4", "C", "C#", "C-1", "F#x", "4C", "Cbb3"] {
            assert_eq!(Pitch::parse(bad), None, "{bad} should not parse");
        }

        // octave too large for i32 note numbers
        assert_eq!(Pitch::parse("C999999999"), None);
        assert_eq!(Pitch::parse("B178956970"), None);
        assert_eq!(Pitch::parse("C99999999999"), None);
    }

    #[test]
    fn nothing_below_c0() {
        assert_eq!(Pitch::parse("Cb0"), None);
        assert_eq!(Pitch::parse("C0"), Some(Pitch(12)));
        assert_eq!(Pitch::parse("B#0").map(|p| p.name()), Some("C1".into()));
    }

    #[test]
    fn bare_pitch_classes() {
        assert_eq!(parse_pitch_class("E"), Some(4));
        assert_eq!(parse_pitch_class("Db"), Some(1));
        assert_eq!(parse_pitch_class("B#"), Some(0));
        assert_eq!(parse_pitch_class("E4"), None);
        assert_eq!(parse_pitch_class("Unknown"), None);
    }
}
