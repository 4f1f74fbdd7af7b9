use crate::model::config::ImportConfig;
use crate::model::pitch::LOWEST_NAMED_MIDI;
use crate::model::song::*;
use anyhow::{Result, anyhow};
use log::{debug, warn};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

const DEFAULT_MPQN: u32 = 500_000;
const MICROSECONDS_PER_MINUTE: f64 = 60_000_000.0;
const PERCUSSION_CHANNEL: u8 = 9;

/// Tracks and tempo pulled out of a MIDI file, before any analysis.
#[derive(Debug, Clone)]
pub struct ImportedSong {
    pub name: String,
    pub bpm: f64,
    pub tracks: Vec<Track>,
}

struct NoteInterval {
    pub midi: u8,
    pub start_tick: u64,
    pub end_tick: u64,
    pub velocity: u8,
}

#[derive(Debug, Clone)]
struct TempoSegment {
    pub mpqn: u32,
    pub start_tick: u64,
    pub seconds_at_start: f64,
}

/// Open notes keyed by (channel, key), stacked so overlapping repeats close LIFO.
type OpenNotes = HashMap<(u8, u8), Vec<(u64, u8)>>;

pub fn import_midi_file<P: AsRef<Path>>(path: P, limits: &ImportConfig) -> Result<ImportedSong> {
    let bytes = fs::read(path.as_ref()).map_err(|e| {
        anyhow!(
            "Failed to read MIDI file {}: {}",
            path.as_ref().display(),
            e
        )
    })?;

    let name = path
        .as_ref()
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("<unknown>");

    midi_bytes_to_song(&bytes, name, limits)
}

/// Parse raw SMF bytes into one `Track` per (SMF track, channel) pair that holds notes.
pub fn midi_bytes_to_song(bytes: &[u8], name: &str, limits: &ImportConfig) -> Result<ImportedSong> {
    let smf = Smf::parse(bytes).map_err(|e| anyhow!("Failed to parse MIDI: {:?}", e))?;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(t) => t.as_int() as u64,
        Timing::Timecode(_fps, _subframe) => {
            return Err(anyhow!(
                "SMPTE timecode midi timing is not currently supported..!"
            ));
        }
    };

    debug!("Ticks per quarter note: {}", ticks_per_quarter);
    debug!(
        "MIDI format: {:?}, tracks: {}",
        smf.header.format,
        smf.tracks.len()
    );

    let mut tempo_changes: Vec<(u64, u32)> = Vec::new();
    tempo_changes.push((0u64, DEFAULT_MPQN)); // ~120bpm until a tempo meta appears

    let mut track_names: Vec<Option<String>> = Vec::with_capacity(smf.tracks.len());
    let mut intervals: BTreeMap<(usize, u8), Vec<NoteInterval>> = BTreeMap::new();

    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut abs_tick: u64 = 0;
        let mut track_name: Option<String> = None;
        let mut open_notes: OpenNotes = HashMap::new();

        for event in track.iter() {
            abs_tick = abs_tick.saturating_add(event.delta.as_int() as u64);

            match &event.kind {
                TrackEventKind::Meta(meta) => match meta {
                    MetaMessage::Tempo(micro) => {
                        let mpqn: u32 = micro.as_int();
                        tempo_changes.push((abs_tick, mpqn));
                        debug!(
                            "Tempo change at tick {} -> {} us/qn (track {})",
                            abs_tick, mpqn, track_idx
                        );
                    }
                    MetaMessage::TrackName(bytes) => {
                        if track_name.is_none() {
                            let decoded = String::from_utf8_lossy(bytes).trim().to_string();
                            if !decoded.is_empty() {
                                debug!("Track {} name: {}", track_idx, decoded);
                                track_name = Some(decoded);
                            }
                        }
                    }
                    _ => {}
                },
                TrackEventKind::Midi { channel, message } => {
                    let ch: u8 = channel.as_int();

                    match message {
                        MidiMessage::NoteOn { key, vel } => {
                            let velocity: u8 = vel.as_int();

                            if velocity == 0 {
                                close_note(
                                    &mut open_notes,
                                    &mut intervals,
                                    track_idx,
                                    ch,
                                    key.as_int(),
                                    abs_tick,
                                );
                            } else {
                                open_notes
                                    .entry((ch, key.as_int()))
                                    .or_default()
                                    .push((abs_tick, velocity));
                            }
                        }
                        MidiMessage::NoteOff { key, vel: _ } => {
                            close_note(
                                &mut open_notes,
                                &mut intervals,
                                track_idx,
                                ch,
                                key.as_int(),
                                abs_tick,
                            );
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        track_names.push(track_name);

        // sorted so auto-closed notes land in the same order on every run
        let mut unclosed: Vec<((u8, u8), Vec<(u64, u8)>)> = open_notes.into_iter().collect();
        unclosed.sort_unstable_by_key(|(key, _)| *key);

        for ((ch, key), stack) in unclosed {
            for (start_tick, start_vel) in stack {
                let end_tick = if abs_tick > start_tick {
                    abs_tick
                } else {
                    start_tick + ticks_per_quarter
                };

                warn!(
                    "Unclosed NoteOn for {}, channel: {} at tick: {} auto-closing at: {}..!",
                    key, ch, start_tick, end_tick
                );

                intervals
                    .entry((track_idx, ch))
                    .or_default()
                    .push(NoteInterval {
                        midi: key,
                        start_tick,
                        end_tick,
                        velocity: start_vel,
                    });
            }
        }
    }

    let tempo_segments = build_tempo_segments(tempo_changes, ticks_per_quarter);
    let ticks_to_seconds = |tick: u64| -> f64 {
        let segment = match tempo_segments.iter().rfind(|seg| seg.start_tick <= tick) {
            Some(s) => s,
            None => &tempo_segments[0],
        };

        let delta_ticks = tick.saturating_sub(segment.start_tick) as f64;
        segment.seconds_at_start
            + delta_ticks * (segment.mpqn as f64) / (ticks_per_quarter as f64) / 1_000_000.0
    };

    let multi_channel: HashMap<usize, usize> =
        intervals.keys().fold(HashMap::new(), |mut acc, (idx, _)| {
            *acc.entry(*idx).or_default() += 1;
            acc
        });

    let mut tracks: Vec<Track> = Vec::new();
    for ((track_idx, ch), mut track_intervals) in intervals.into_iter() {
        track_intervals.sort_by_key(|i| (i.start_tick, i.midi));

        let mut notes: Vec<NoteEvent> = Vec::with_capacity(track_intervals.len());
        for interval in track_intervals {
            if interval.midi < LOWEST_NAMED_MIDI {
                warn!(
                    "Dropping MIDI {} on track {} as it sits below C0..!",
                    interval.midi, track_idx
                );
                continue;
            }

            let start = ticks_to_seconds(interval.start_tick);
            let end = ticks_to_seconds(interval.end_tick);

            if end <= start {
                debug!(
                    "Skipping zero/negative duration midi note {}, start: {} end: {}..!",
                    interval.midi, start, end
                );
                continue;
            }

            notes.push(NoteEvent::new(
                interval.midi,
                start,
                end - start,
                interval.velocity as f64 / 127.0,
            ));
        }

        if notes.is_empty() {
            continue;
        }

        if notes.len() > limits.max_notes_per_track {
            warn!(
                "Track {} has {} notes, keeping only the first {}..!",
                track_idx,
                notes.len(),
                limits.max_notes_per_track
            );
            notes.truncate(limits.max_notes_per_track);
        }

        let base_name = track_names
            .get(track_idx)
            .cloned()
            .flatten()
            .unwrap_or_else(|| format!("Track {}", track_idx + 1));
        let name = if multi_channel.get(&track_idx).copied().unwrap_or(0) > 1 {
            format!("{} (ch {})", base_name, ch + 1)
        } else {
            base_name
        };

        tracks.push(Track {
            id: tracks.len() as u32,
            name,
            channel: ch,
            is_percussion: ch == PERCUSSION_CHANNEL,
            notes,
            role: Role::Ignore,
        });
    }

    // skipping first segment because it was built from our default mpqn
    let bpm = match tempo_segments.get(1) {
        Some(tempo) => MICROSECONDS_PER_MINUTE / (tempo.mpqn as f64),
        None => MICROSECONDS_PER_MINUTE / (DEFAULT_MPQN as f64),
    };

    debug!(
        "Imported '{}' with {} note tracks at {:.1} BPM",
        name,
        tracks.len(),
        bpm
    );

    Ok(ImportedSong {
        name: name.to_string(),
        bpm,
        tracks,
    })
}

fn build_tempo_segments(mut tempo_changes: Vec<(u64, u32)>, ticks_per_quarter: u64) -> Vec<TempoSegment> {
    let mut last_tick: u64 = 0;
    let mut seconds_accum: f64 = 0.0;
    let mut last_mpqn: u32 = DEFAULT_MPQN;
    let mut tempo_segments: Vec<TempoSegment> = Vec::new();

    // stable, so a tempo event at tick 0 still lands after the default
    tempo_changes.sort_by_key(|(tick, _)| *tick);

    for (tick, mpqn) in tempo_changes.into_iter() {
        if tick > last_tick {
            let delta_ticks = (tick - last_tick) as f64;
            seconds_accum +=
                delta_ticks * (last_mpqn as f64) / (ticks_per_quarter as f64) / 1_000_000.0;
        }

        tempo_segments.push(TempoSegment {
            start_tick: tick,
            mpqn,
            seconds_at_start: seconds_accum,
        });

        last_tick = tick;
        last_mpqn = mpqn;
    }

    tempo_segments
}

fn close_note(
    open_notes: &mut OpenNotes,
    intervals: &mut BTreeMap<(usize, u8), Vec<NoteInterval>>,
    track_idx: usize,
    ch: u8,
    midi_num: u8,
    abs_tick: u64,
) {
    if let Some((start_tick, start_vel)) = open_notes
        .get_mut(&(ch, midi_num))
        .and_then(|stack| stack.pop())
    {
        intervals
            .entry((track_idx, ch))
            .or_default()
            .push(NoteInterval {
                midi: midi_num,
                start_tick,
                end_tick: abs_tick,
                velocity: start_vel,
            });
    } else {
        debug!(
            "Orphaned NoteOff for {} ch{} at tick {}..!",
            midi_num, ch, abs_tick
        );
    }
}
