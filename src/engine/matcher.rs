use crate::engine::key::key_tonic;
use crate::model::config::MatcherConfig;
use crate::model::pitch::Pitch;
use crate::model::scales::{ScaleDefinition, ScaleLibrary};
use crate::model::song::{MatchCandidate, Role, Track};
use log::{debug, warn};
use std::collections::BTreeSet;

/// Unique pitches pooled from the melody tracks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MelodyNotes {
    pub unique: BTreeSet<Pitch>,
    /// Notes whose names couldn't be decoded.
    pub dropped: usize,
}

/// A scale with its pitch sets built once, so every transposition reuses them.
struct PreparedScale<'a> {
    definition: &'a ScaleDefinition,
    exact: BTreeSet<Pitch>,
    classes: [bool; 12],
    root_class: Option<u8>,
}

impl<'a> PreparedScale<'a> {
    fn new(definition: &'a ScaleDefinition) -> Self {
        Self {
            definition,
            exact: definition.playable_pitches(),
            classes: definition.pitch_classes(),
            root_class: definition.root_pitch().map(|p| p.class()),
        }
    }
}

/// Pool every `Melody` track's notes, collapsing duplicates. Notes are decoded from their
/// names; unreadable names are counted and left out.
pub fn collect_melody_notes(tracks: &[Track]) -> MelodyNotes {
    let mut melody = MelodyNotes::default();

    for note in tracks
        .iter()
        .filter(|t| t.role == Role::Melody)
        .flat_map(|t| t.notes.iter())
    {
        match Pitch::parse(&note.pitch_name) {
            Some(pitch) => {
                melody.unique.insert(pitch);
            }
            None => melody.dropped += 1,
        }
    }

    if melody.dropped > 0 {
        warn!(
            "Dropped {} melody note(s) with unreadable pitch names..!",
            melody.dropped
        );
    }

    melody
}

/// 0 for no shift, the natural penalty for fourth/fifth shifts, the full penalty otherwise.
pub fn transpose_penalty(transposition: i32, config: &MatcherConfig) -> f64 {
    if transposition == 0 {
        0.0
    } else if config.natural_shifts.contains(&transposition.abs()) {
        config.natural_penalty
    } else {
        config.other_penalty
    }
}

/// Score every scale in the library at every transposition in `-range..=range`.
///
/// Output is ordered by library position, then transposition ascending.
pub fn match_scales(
    notes: &BTreeSet<Pitch>,
    detected_key: &str,
    library: &ScaleLibrary,
    config: &MatcherConfig,
) -> Vec<MatchCandidate> {
    let tonic = key_tonic(detected_key);
    let range = config.transposition_range.abs();

    let mut candidates = Vec::with_capacity(library.len() * (2 * range as usize + 1));
    for definition in &library.scales {
        let scale = PreparedScale::new(definition);

        for transposition in -range..=range {
            candidates.push(score_prepared(notes, &scale, transposition, tonic, config));
        }
    }

    debug!(
        "Scored {} candidates for {} unique notes against {} scales",
        candidates.len(),
        notes.len(),
        library.len()
    );

    candidates
}

/// Score a single `(scale, transposition)` pair.
pub fn score_candidate(
    notes: &BTreeSet<Pitch>,
    scale: &ScaleDefinition,
    transposition: i32,
    key_tonic: Option<u8>,
    config: &MatcherConfig,
) -> MatchCandidate {
    score_prepared(
        notes,
        &PreparedScale::new(scale),
        transposition,
        key_tonic,
        config,
    )
}

fn score_prepared(
    notes: &BTreeSet<Pitch>,
    scale: &PreparedScale,
    transposition: i32,
    key_tonic: Option<u8>,
    config: &MatcherConfig,
) -> MatchCandidate {
    let mut matched_notes = Vec::new();
    let mut folded_notes = Vec::new();
    let mut missed_notes = Vec::new();

    for note in notes {
        let moved = note.transpose(transposition);

        if scale.exact.contains(&moved) {
            matched_notes.push(moved.name());
        } else if scale.classes[moved.class() as usize] {
            folded_notes.push(moved.name());
        } else {
            missed_notes.push(moved.name());
        }
    }

    let exact_match_count = matched_notes.len() as f64 * config.exact_weight;
    let folded_match_count = folded_notes.len() as f64 * config.folded_weight;

    let coverage = if notes.is_empty() {
        0.0
    } else {
        (exact_match_count + folded_match_count) / notes.len() as f64
    };

    let transpose_penalty = transpose_penalty(transposition, config);

    let key_bonus = match (scale.root_class, key_tonic) {
        (Some(root), Some(tonic)) if transposition == 0 && root == tonic => config.key_bonus,
        _ => 0.0,
    };

    let popularity_bonus = if scale.definition.popularity_score >= config.popularity_threshold {
        config.popularity_bonus
    } else {
        0.0
    };

    let score =
        (coverage * 100.0 - transpose_penalty + key_bonus + popularity_bonus).max(0.0);

    MatchCandidate {
        scale_id: scale.definition.id.clone(),
        transposition,
        exact_match_count,
        folded_match_count,
        coverage,
        transpose_penalty,
        key_bonus,
        popularity_bonus,
        score,
        matched_notes,
        folded_notes,
        missed_notes,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::song::NoteEvent;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9
    }

    fn pitches(names: &[&str]) -> BTreeSet<Pitch> {
        names.iter().map(|n| Pitch::parse(n).unwrap()).collect()
    }

    fn scale(id: &str, root: &str, top: &[&str], popularity: f64) -> ScaleDefinition {
        ScaleDefinition {
            id: id.into(),
            name: id.into(),
            root: root.into(),
            top_notes: top.iter().map(|s| s.to_string()).collect(),
            bottom_notes: vec![],
            popularity_score: popularity,
            total_note_count: 1 + top.len() as u32,
        }
    }

    fn kurd() -> ScaleDefinition {
        scale(
            "d-kurd-9",
            "D3",
            &["A3", "Bb3", "C4", "D4", "E4", "F4", "G4", "A4"],
            0.95,
        )
    }

    #[test]
    fn own_pitches_match_exactly_at_zero() {
        let kurd = kurd();
        let notes = kurd.playable_pitches();
        let config = MatcherConfig::default();

        let at_zero = score_candidate(&notes, &kurd, 0, Some(2), &config);
        assert!(approx_eq(at_zero.exact_match_count, notes.len() as f64));
        assert!(approx_eq(at_zero.folded_match_count, 0.0));
        assert!(approx_eq(at_zero.transpose_penalty, 0.0));
        assert!(approx_eq(at_zero.coverage, 1.0));
        assert!(approx_eq(at_zero.key_bonus, 10.0));
        assert!(approx_eq(at_zero.popularity_bonus, 3.0));
        assert!(approx_eq(at_zero.score, 113.0));
        assert!(at_zero.missed_notes.is_empty());

        for t in -6..=6 {
            let shifted = score_candidate(&notes, &kurd, t, Some(2), &config);
            assert!(shifted.score <= at_zero.score, "t={t} outscored t=0");
        }
    }

    #[test]
    fn octave_shifted_melody_still_folds() {
        let kurd = kurd();
        let config = MatcherConfig::default();

        for octave in [12, -12] {
            let notes: BTreeSet<Pitch> = kurd
                .playable_pitches()
                .iter()
                .map(|p| p.transpose(octave))
                .collect();

            let candidate = score_candidate(&notes, &kurd, 0, None, &config);
            assert!(candidate.missed_notes.is_empty());
            assert_eq!(
                candidate.matched_notes.len() + candidate.folded_notes.len(),
                notes.len()
            );
            assert!(!candidate.folded_notes.is_empty());
            assert!(candidate.coverage >= config.folded_weight);
        }
    }

    #[test]
    fn octave_shift_folds_at_every_transposition() {
        let kurd = kurd();
        let config = MatcherConfig::default();

        for t in -6..=6 {
            for octave in [12, -12] {
                // lands exactly on the kurd at `t`, give or take an octave
                let notes: BTreeSet<Pitch> = kurd
                    .playable_pitches()
                    .iter()
                    .map(|p| p.transpose(octave - t))
                    .collect();

                let candidate = score_candidate(&notes, &kurd, t, None, &config);
                assert!(candidate.missed_notes.is_empty(), "t={t} octave={octave}");
                assert_eq!(
                    candidate.matched_notes.len() + candidate.folded_notes.len(),
                    notes.len()
                );
                assert!(!candidate.folded_notes.is_empty(), "t={t} octave={octave}");
                assert!(candidate.coverage >= config.folded_weight);
            }
        }
    }

    #[test]
    fn transposition_carries_the_octave() {
        let target = scale("c-sharp", "C#4", &[], 0.0);
        let notes = pitches(&["B3"]);

        let candidate = score_candidate(&notes, &target, 2, None, &MatcherConfig::default());
        assert_eq!(candidate.matched_notes, vec!["C#4".to_string()]);
        assert!(candidate.folded_notes.is_empty());
    }

    #[test]
    fn penalty_ordering_with_equal_coverage() {
        // every pitch class, but far below the melody, so each note folds at any shift
        let chromatic = scale(
            "chromatic",
            "C1",
            &["C#1", "D1", "D#1", "E1", "F1", "F#1", "G1", "G#1", "A1", "A#1", "B1"],
            0.0,
        );
        let notes = pitches(&["D4", "F4", "A4", "C5"]);
        let config = MatcherConfig::default();

        let score = |t| score_candidate(&notes, &chromatic, t, None, &config).score;

        assert!(approx_eq(score(0), 80.0));
        assert!(approx_eq(score(5), 75.0));
        assert!(approx_eq(score(-5), 75.0));
        assert!(approx_eq(score(3), 65.0));
        assert!(score(0) >= score(5) && score(5) >= score(-3));

        assert!(approx_eq(transpose_penalty(7, &config), 5.0));
        assert!(approx_eq(transpose_penalty(-7, &config), 5.0));
        assert!(approx_eq(transpose_penalty(1, &config), 15.0));
    }

    #[test]
    fn misses_are_recorded_and_scores_clamped() {
        let tiny = scale("tiny", "D3", &["A3"], 0.1);
        let notes = pitches(&["C#4", "F#4", "G#4"]);

        let candidate = score_candidate(&notes, &tiny, 1, None, &MatcherConfig::default());
        assert_eq!(candidate.missed_notes.len(), 1);
        assert_eq!(candidate.folded_notes, vec!["D4".to_string(), "A4".to_string()]);

        let clamped = score_candidate(&notes, &tiny, 2, None, &MatcherConfig::default());
        assert!(approx_eq(clamped.coverage, 0.0));
        assert!(approx_eq(clamped.score, 0.0));
    }

    #[test]
    fn key_bonus_only_without_transposition() {
        let kurd = kurd();
        let notes = pitches(&["D4", "E4", "F4"]);
        let config = MatcherConfig::default();

        assert!(approx_eq(score_candidate(&notes, &kurd, 0, Some(2), &config).key_bonus, 10.0));
        assert!(approx_eq(score_candidate(&notes, &kurd, 5, Some(2), &config).key_bonus, 0.0));
        assert!(approx_eq(score_candidate(&notes, &kurd, 0, Some(4), &config).key_bonus, 0.0));
        assert!(approx_eq(score_candidate(&notes, &kurd, 0, None, &config).key_bonus, 0.0));
    }

    #[test]
    fn empty_notes_never_divide_by_zero() {
        let library = ScaleLibrary::builtin().unwrap();
        let candidates = match_scales(&BTreeSet::new(), "Unknown", &library, &MatcherConfig::default());

        assert_eq!(candidates.len(), library.len() * 13);
        assert!(candidates.iter().all(|c| c.coverage == 0.0 && !c.score.is_nan()));
    }

    #[test]
    fn every_scale_and_shift_is_scored() {
        let library = ScaleLibrary::builtin().unwrap();
        let notes = pitches(&["D4", "F4", "A4"]);
        let candidates = match_scales(&notes, "D Minor", &library, &MatcherConfig::default());

        assert_eq!(candidates.len(), library.len() * 13);
        assert_eq!(candidates[0].scale_id, library.scales[0].id);
        assert_eq!(candidates[0].transposition, -6);
        assert_eq!(candidates[12].transposition, 6);
        assert!(candidates.iter().all(|c| c.score >= 0.0));
    }

    #[test]
    fn only_melody_tracks_are_pooled() {
        let mut broken = NoteEvent::new(62, 1.0, 0.5, 0.5);
        broken.pitch_name = "??".into();

        let melody = Track {
            id: 0,
            name: "Lead".into(),
            channel: 0,
            is_percussion: false,
            notes: vec![
                NoteEvent::new(62, 0.0, 0.5, 0.5),
                NoteEvent::new(62, 2.0, 0.5, 0.5),
                NoteEvent::new(65, 3.0, 0.5, 0.5),
                broken,
            ],
            role: Role::Melody,
        };
        let bass = Track {
            id: 1,
            name: "Bass".into(),
            notes: vec![NoteEvent::new(38, 0.0, 2.0, 0.5)],
            role: Role::Harmony,
            ..melody.clone()
        };

        let pooled = collect_melody_notes(&[melody, bass]);
        assert_eq!(pooled.unique, pitches(&["D4", "F4"]));
        assert_eq!(pooled.dropped, 1);
    }
}
