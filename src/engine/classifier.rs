use crate::model::config::ClassifierConfig;
use crate::model::song::{NoteEvent, Role, Track};
use log::debug;
use serde::{Deserialize, Serialize};

/// Measurements the role heuristics are based on.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackFeatures {
    pub note_count: usize,
    /// Highest minus lowest MIDI pitch.
    pub pitch_range: u8,
    /// Mean number of notes sounding while the track is sounding at all.
    pub average_polyphony: f64,
    /// Notes per second of song.
    pub density: f64,
    pub mean_duration: f64,
}

/// End of the last sounding note across every track, in seconds.
pub fn song_duration(tracks: &[Track]) -> f64 {
    tracks
        .iter()
        .flat_map(|t| t.notes.iter())
        .map(NoteEvent::end_time)
        .fold(0.0, f64::max)
}

pub fn extract_features(track: &Track, song_duration: f64) -> TrackFeatures {
    let notes = &track.notes;
    if notes.is_empty() {
        return TrackFeatures {
            note_count: 0,
            pitch_range: 0,
            average_polyphony: 0.0,
            density: 0.0,
            mean_duration: 0.0,
        };
    }

    let pitch_min = notes.iter().map(|n| n.pitch_midi).min().unwrap_or(0);
    let pitch_max = notes.iter().map(|n| n.pitch_midi).max().unwrap_or(0);

    let density = if song_duration > 0.0 {
        notes.len() as f64 / song_duration
    } else {
        notes.len() as f64
    };

    let mean_duration =
        notes.iter().map(|n| n.duration.max(0.0)).sum::<f64>() / notes.len() as f64;

    TrackFeatures {
        note_count: notes.len(),
        pitch_range: pitch_max.saturating_sub(pitch_min),
        average_polyphony: average_polyphony(notes),
        density,
        mean_duration,
    }
}

/// Role for a single track, judged on its own. Every track that qualifies as melody gets
/// `Melody` here; `classify_tracks` narrows that down to one.
pub fn classify_track(track: &Track, song_duration: f64, config: &ClassifierConfig) -> Role {
    if track.notes.is_empty() {
        return Role::Ignore;
    }

    if track.is_percussion {
        return Role::Rhythm;
    }

    let features = extract_features(track, song_duration);

    if features.average_polyphony > config.harmony_polyphony {
        return Role::Harmony;
    }

    if features.density < config.sparse_density {
        return if features.pitch_range <= config.rhythm_max_range {
            Role::Rhythm
        } else {
            Role::Ignore
        };
    }

    if features.note_count < config.min_melody_notes {
        return Role::Ignore;
    }

    Role::Melody
}

/// Classify every track, returning a fresh list with roles filled in.
///
/// Only one track keeps `Melody`: the candidate with the largest density x pitch breadth,
/// lowest id on a tie. The other candidates fall back to `Ignore`.
pub fn classify_tracks(tracks: &[Track], config: &ClassifierConfig) -> Vec<Track> {
    let duration = song_duration(tracks);
    let roles: Vec<Role> = tracks
        .iter()
        .map(|t| classify_track(t, duration, config))
        .collect();

    let mut primary: Option<(usize, u32, f64)> = None;
    for (idx, track) in tracks.iter().enumerate() {
        if roles[idx] != Role::Melody {
            continue;
        }

        let features = extract_features(track, duration);
        let weight = features.density * (features.pitch_range as f64 + 1.0);

        let better = match primary {
            None => true,
            Some((_, best_id, best_weight)) => {
                weight > best_weight || (weight == best_weight && track.id < best_id)
            }
        };

        if better {
            primary = Some((idx, track.id, weight));
        }
    }

    let primary_idx = primary.map(|(idx, _, _)| idx);

    tracks
        .iter()
        .zip(roles)
        .enumerate()
        .map(|(idx, (track, role))| {
            let role = if role == Role::Melody && Some(idx) != primary_idx {
                debug!(
                    "Track {} '{}' qualified as melody but lost to the primary line",
                    track.id, track.name
                );
                Role::Ignore
            } else {
                role
            };

            debug!("Track {} '{}' -> {}", track.id, track.name, role);
            track.with_role(role)
        })
        .collect()
}

/// Total sounding time divided by the time anything is sounding.
fn average_polyphony(notes: &[NoteEvent]) -> f64 {
    let mut spans: Vec<(f64, f64)> = notes
        .iter()
        .filter(|n| n.duration > 0.0)
        .map(|n| (n.start_time, n.end_time()))
        .collect();

    if spans.is_empty() {
        return if notes.is_empty() { 0.0 } else { 1.0 };
    }

    spans.sort_by(|a, b| a.0.total_cmp(&b.0));

    let sounding: f64 = spans.iter().map(|(start, end)| end - start).sum();

    let mut union = 0.0;
    let (mut run_start, mut run_end) = spans[0];
    for &(start, end) in &spans[1..] {
        if start > run_end {
            union += run_end - run_start;
            run_start = start;
            run_end = end;
        } else {
            run_end = run_end.max(end);
        }
    }
    union += run_end - run_start;

    if union > 0.0 { sounding / union } else { 1.0 }
}
