use crate::midi_importer::midi_bytes_to_song;
use crate::model::config::{AnalysisConfig, RankerConfig};
use crate::model::scales::ScaleLibrary;
use crate::model::song::{MatchCandidate, MatchMode, NoteEvent, ProcessedSong, Role, Track};
use anyhow::{Result, bail};
use log::{debug, info};

mod classifier;
mod key;
mod matcher;
mod ranker;

pub use classifier::*;
pub use key::*;
pub use matcher::*;
pub use ranker::*;

/// Full pipeline from raw MIDI bytes: import, classify, detect key, match and rank.
pub fn analyze_midi(
    bytes: &[u8],
    name: &str,
    library: &ScaleLibrary,
    mode: MatchMode,
    config: &AnalysisConfig,
) -> Result<ProcessedSong> {
    let imported = midi_bytes_to_song(bytes, name, &config.import)?;
    Ok(analyze_tracks(
        imported.name,
        imported.bpm,
        imported.tracks,
        library,
        mode,
        config,
    ))
}

/// Classify `tracks` and recommend a scale for the resulting melody.
pub fn analyze_tracks(
    name: String,
    bpm: f64,
    tracks: Vec<Track>,
    library: &ScaleLibrary,
    mode: MatchMode,
    config: &AnalysisConfig,
) -> ProcessedSong {
    let tracks = classify_tracks(&tracks, &config.classifier);
    recommend(name, bpm, tracks, library, mode, config)
}

/// Key detection, matching and ranking over tracks whose roles are already settled.
fn recommend(
    name: String,
    bpm: f64,
    tracks: Vec<Track>,
    library: &ScaleLibrary,
    mode: MatchMode,
    config: &AnalysisConfig,
) -> ProcessedSong {
    if !tracks.iter().any(|t| t.role == Role::Melody) {
        info!("No melody track in '{}', nothing to recommend..!", name);
        return no_match(name, bpm, mode, tracks, UNKNOWN_KEY.to_string(), 0);
    }

    let melody: Vec<NoteEvent> = tracks
        .iter()
        .filter(|t| t.role == Role::Melody)
        .flat_map(|t| t.notes.iter().cloned())
        .collect();

    let detected_key = detect_key(&melody);
    let notes = collect_melody_notes(&tracks);
    debug!(
        "'{}': key {}, {} unique melody notes ({} dropped)",
        name,
        detected_key,
        notes.unique.len(),
        notes.dropped
    );

    if notes.unique.is_empty() {
        info!("Melody of '{}' has no usable notes, nothing to recommend..!", name);
        return no_match(name, bpm, mode, tracks, detected_key, notes.dropped);
    }

    let candidates = match_scales(&notes.unique, &detected_key, library, &config.matcher);
    let best = select_best(&candidates, library, mode, &config.ranker)
        .cloned()
        .unwrap_or_else(MatchCandidate::none);

    let song = ProcessedSong {
        name,
        bpm,
        mode,
        tracks,
        detected_key,
        suggested_scale_id: (!best.is_none()).then(|| best.scale_id.clone()),
        confidence: best.coverage.clamp(0.0, 1.0),
        best_match: best,
        dropped_note_count: notes.dropped,
        candidates,
    };

    info!(
        "'{}' ({}) -> {} at {:+} semitones, score {:.1}",
        song.name,
        song.detected_key,
        song.suggested_scale_id.as_deref().unwrap_or("<none>"),
        song.best_match.transposition,
        song.best_match.score
    );

    song
}

fn no_match(
    name: String,
    bpm: f64,
    mode: MatchMode,
    tracks: Vec<Track>,
    detected_key: String,
    dropped_note_count: usize,
) -> ProcessedSong {
    ProcessedSong {
        name,
        bpm,
        mode,
        tracks,
        detected_key,
        suggested_scale_id: None,
        best_match: MatchCandidate::none(),
        confidence: 0.0,
        dropped_note_count,
        candidates: Vec::new(),
    }
}

impl ProcessedSong {
    /// Re-pick the winner under another mode from the candidates already scored.
    pub fn with_mode(&self, mode: MatchMode, library: &ScaleLibrary, config: &RankerConfig) -> Self {
        let best = select_best(&self.candidates, library, mode, config)
            .cloned()
            .unwrap_or_else(MatchCandidate::none);

        Self {
            mode,
            suggested_scale_id: (!best.is_none()).then(|| best.scale_id.clone()),
            confidence: best.coverage.clamp(0.0, 1.0),
            best_match: best,
            ..self.clone()
        }
    }

    /// Replace one track's role and redo key detection, matching and ranking.
    /// Other roles are left exactly as they are.
    pub fn with_role_override(
        &self,
        track_id: u32,
        role: Role,
        library: &ScaleLibrary,
        config: &AnalysisConfig,
    ) -> Result<Self> {
        if !self.tracks.iter().any(|t| t.id == track_id) {
            bail!("No track with id {} in '{}'..!", track_id, self.name);
        }

        let tracks: Vec<Track> = self
            .tracks
            .iter()
            .map(|t| {
                if t.id == track_id {
                    t.with_role(role)
                } else {
                    t.clone()
                }
            })
            .collect();

        debug!("Track {} of '{}' manually set to {}", track_id, self.name, role);

        Ok(recommend(
            self.name.clone(),
            self.bpm,
            tracks,
            library,
            self.mode,
            config,
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_fixture::{build_smf, quarter_notes};

    // D E F G A Bb C D, twice over
    const D_MINOR_RUN: [u8; 16] = [62, 64, 65, 67, 69, 70, 72, 74, 74, 72, 70, 69, 67, 65, 64, 62];

    fn melody_track(id: u32, keys: &[u8]) -> Track {
        Track {
            id,
            name: format!("Track {}", id),
            channel: 0,
            is_percussion: false,
            notes: keys
                .iter()
                .enumerate()
                .map(|(i, &k)| NoteEvent::new(k, i as f64 * 0.5, 0.5, 0.8))
                .collect(),
            role: Role::Ignore,
        }
    }

    #[test]
    fn recommends_a_d_minor_handpan() {
        env_logger::try_init().unwrap_or(());

        let library = ScaleLibrary::builtin().unwrap();
        let song = analyze_tracks(
            "run".into(),
            120.0,
            vec![melody_track(0, &D_MINOR_RUN)],
            &library,
            MatchMode::Pro,
            &AnalysisConfig::default(),
        );

        assert_eq!(song.tracks[0].role, Role::Melody);
        assert_eq!(song.detected_key, "D Minor");
        assert_eq!(song.best_match.transposition, 0);
        assert!(song.best_match.missed_notes.is_empty());
        assert!(song.suggested_scale_id.as_deref().unwrap().starts_with("d-kurd"));
        assert!(song.confidence > 0.9);
        assert_eq!(song.candidates.len(), library.len() * 13);
    }

    #[test]
    fn mode_switch_does_not_rematch() {
        let library = ScaleLibrary::builtin().unwrap();
        let config = AnalysisConfig::default();
        let song = analyze_tracks(
            "run".into(),
            120.0,
            vec![melody_track(0, &D_MINOR_RUN)],
            &library,
            MatchMode::Standard,
            &config,
        );

        let pro = song.with_mode(MatchMode::Pro, &library, &config.ranker);
        assert_eq!(pro.mode, MatchMode::Pro);
        assert_eq!(pro.candidates, song.candidates);
        assert_eq!(pro.tracks, song.tracks);

        let back = pro.with_mode(MatchMode::Standard, &library, &config.ranker);
        assert_eq!(back, song);
    }

    #[test]
    fn no_melody_is_a_sentinel_not_an_error() {
        let library = ScaleLibrary::builtin().unwrap();
        let mut drums = melody_track(0, &[36, 38, 36, 38, 36, 38]);
        drums.is_percussion = true;

        let song = analyze_tracks(
            "drums".into(),
            90.0,
            vec![drums],
            &library,
            MatchMode::Standard,
            &AnalysisConfig::default(),
        );

        assert_eq!(song.detected_key, UNKNOWN_KEY);
        assert!(song.best_match.is_none());
        assert_eq!(song.best_match.score, 0.0);
        assert!(song.suggested_scale_id.is_none());
        assert!(song.candidates.is_empty());
    }

    #[test]
    fn role_override_produces_a_new_song() {
        let library = ScaleLibrary::builtin().unwrap();
        let config = AnalysisConfig::default();

        let lead = melody_track(0, &D_MINOR_RUN);
        // E major arpeggio, half as dense as the lead
        let counter = melody_track(1, &[64, 68, 71, 76, 71, 68, 64, 64]);

        let song = analyze_tracks(
            "duet".into(),
            120.0,
            vec![lead, counter],
            &library,
            MatchMode::Pro,
            &config,
        );
        assert_eq!(song.tracks[1].role, Role::Ignore);

        let swapped = song
            .with_role_override(0, Role::Ignore, &library, &config)
            .unwrap()
            .with_role_override(1, Role::Melody, &library, &config)
            .unwrap();

        assert_eq!(song.tracks[0].role, Role::Melody);
        assert_eq!(swapped.tracks[0].role, Role::Ignore);
        assert_eq!(swapped.tracks[1].role, Role::Melody);
        assert_eq!(swapped.detected_key, "E Major");
        assert_ne!(swapped.best_match, song.best_match);

        assert!(song.with_role_override(7, Role::Melody, &library, &config).is_err());
    }

    #[test]
    fn melody_with_only_unreadable_names() {
        let library = ScaleLibrary::builtin().unwrap();
        let mut track = melody_track(0, &D_MINOR_RUN);
        track.role = Role::Melody;
        for note in &mut track.notes {
            note.pitch_name = "X9".into();
        }

        let song = ProcessedSong {
            name: "broken".into(),
            bpm: 120.0,
            mode: MatchMode::Standard,
            tracks: vec![track],
            detected_key: UNKNOWN_KEY.into(),
            suggested_scale_id: None,
            best_match: MatchCandidate::none(),
            confidence: 0.0,
            dropped_note_count: 0,
            candidates: vec![],
        }
        .with_role_override(0, Role::Melody, &library, &AnalysisConfig::default())
        .unwrap();

        assert_eq!(song.dropped_note_count, D_MINOR_RUN.len());
        assert!(song.best_match.is_none());
    }

    #[test]
    fn pipeline_from_bytes() {
        env_logger::try_init().unwrap_or(());

        let bytes = build_smf(
            480,
            Some(500_000),
            &[
                ("Lead", quarter_notes(0, 480, &D_MINOR_RUN)),
                ("Drums", quarter_notes(9, 480, &[36, 38, 36, 38, 36, 38, 36, 38])),
            ],
        )
        .unwrap();

        let library = ScaleLibrary::builtin().unwrap();
        let song = analyze_midi(
            &bytes,
            "fixture",
            &library,
            MatchMode::Standard,
            &AnalysisConfig::default(),
        )
        .unwrap();

        assert_eq!(song.tracks.len(), 2);
        assert_eq!(song.tracks[0].role, Role::Melody);
        assert_eq!(song.tracks[1].role, Role::Rhythm);
        assert_eq!(song.detected_key, "D Minor");
        assert!(song.has_recommendation());
    }
}
