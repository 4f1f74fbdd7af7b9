// Test-only helpers: synthesize small Standard MIDI Files in memory so tests don't need binaries on disk.

use midly::num::{u4, u7, u15, u24, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

#[derive(Debug, Clone, Copy)]
pub struct FixtureNote {
    pub channel: u8,
    pub key: u8,
    pub start_tick: u32,
    pub length_ticks: u32,
}

impl FixtureNote {
    pub fn new(channel: u8, key: u8, start_tick: u32, length_ticks: u32) -> Self {
        Self {
            channel,
            key,
            start_tick,
            length_ticks,
        }
    }
}

/// A run of back-to-back quarter notes on one channel.
pub fn quarter_notes(channel: u8, ticks_per_quarter: u32, keys: &[u8]) -> Vec<FixtureNote> {
    keys.iter()
        .enumerate()
        .map(|(i, &key)| FixtureNote::new(channel, key, i as u32 * ticks_per_quarter, ticks_per_quarter))
        .collect()
}

/// Build SMF bytes with one track per `(name, notes)` pair. An empty name writes no TrackName
/// event, `mpqn` writes a tempo event at tick 0 on the first track.
pub fn build_smf(
    ticks_per_quarter: u16,
    mpqn: Option<u32>,
    tracks: &[(&str, Vec<FixtureNote>)],
) -> anyhow::Result<Vec<u8>> {
    let header = Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(ticks_per_quarter)),
    );
    let mut smf = Smf::new(header);

    for (idx, (name, notes)) in tracks.iter().enumerate() {
        let mut track: Vec<TrackEvent> = Vec::new();

        if !name.is_empty() {
            track.push(TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
            });
        }

        if idx == 0
            && let Some(mpqn) = mpqn
        {
            track.push(TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(mpqn))),
            });
        }

        // (tick, is_on, channel, key); note-offs sort ahead of note-ons at the same tick
        let mut edges: Vec<(u32, bool, u8, u8)> = Vec::with_capacity(notes.len() * 2);
        for note in notes {
            edges.push((note.start_tick, true, note.channel, note.key));
            edges.push((note.start_tick + note.length_ticks, false, note.channel, note.key));
        }
        edges.sort();

        let mut last_tick = 0u32;
        for (tick, is_on, channel, key) in edges {
            let message = if is_on {
                MidiMessage::NoteOn {
                    key: u7::new(key),
                    vel: u7::new(100),
                }
            } else {
                MidiMessage::NoteOff {
                    key: u7::new(key),
                    vel: u7::new(0),
                }
            };

            track.push(TrackEvent {
                delta: u28::new(tick - last_tick),
                kind: TrackEventKind::Midi {
                    channel: u4::new(channel),
                    message,
                },
            });
            last_tick = tick;
        }

        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });

        smf.tracks.push(track);
    }

    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)?;
    Ok(bytes)
}
