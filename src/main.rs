use HANDPAN_FIT::{
    AnalysisConfig, Args, ScaleLibrary, analyze_tracks, extract_features, import_midi_file,
    load_config, parse_mode, parse_role_override, rank_candidates, song_duration,
};
use anyhow::Result;
use clap::Parser;
use log::{debug, info};

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mode = parse_mode(&args.mode);

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => AnalysisConfig::default(),
    };

    let library = match &args.scales {
        Some(path) => ScaleLibrary::load(path)?,
        None => ScaleLibrary::builtin()?,
    };
    debug!(
        "Using scale library v{} ({} scales)",
        library.version,
        library.len()
    );

    info!("Importing MIDI file: '{}'...", args.midi.display());
    let imported = import_midi_file(&args.midi, &config.import)?;

    let mut song = analyze_tracks(
        imported.name,
        imported.bpm,
        imported.tracks,
        &library,
        mode,
        &config,
    );

    for raw in &args.roles {
        let (track_id, role) = parse_role_override(raw)?;
        info!("Overriding track {} -> {}..!", track_id, role);
        song = song.with_role_override(track_id, role, &library, &config)?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&song)?);
        return Ok(());
    }

    println!("{} | {:.1} BPM | key: {}", song.name, song.bpm, song.detected_key);

    let duration = song_duration(&song.tracks);
    for track in &song.tracks {
        let features = extract_features(track, duration);
        println!(
            "  [{:>2}] {:<28} ch{:<2} {:>5} notes  range {:>2}  poly {:>4.2}  -> {}",
            track.id,
            track.name,
            track.channel + 1,
            features.note_count,
            features.pitch_range,
            features.average_polyphony,
            track.role
        );
    }

    if args.dry_run {
        return Ok(());
    }

    let Some(scale_id) = song.suggested_scale_id.as_deref() else {
        println!("No recommendation: the song has no usable melody track..!");
        return Ok(());
    };

    let best = &song.best_match;
    let scale_name = library
        .get(scale_id)
        .map(|s| s.name.as_str())
        .unwrap_or(scale_id);

    println!(
        "Suggested ({:?}): {} transposed {:+} semitones | score {:.1} | confidence {:.0}%",
        song.mode,
        scale_name,
        best.transposition,
        best.score,
        song.confidence * 100.0
    );
    println!(
        "  exact {:.1} + folded {:.1} | penalty -{:.0} | key +{:.0} | popularity +{:.0}",
        best.exact_match_count,
        best.folded_match_count,
        best.transpose_penalty,
        best.key_bonus,
        best.popularity_bonus
    );

    if args.verbose {
        println!("  matched: {}", best.matched_notes.join(" "));
        println!("  folded:  {}", best.folded_notes.join(" "));
        println!("  missed:  {}", best.missed_notes.join(" "));
    }

    if song.dropped_note_count > 0 {
        println!(
            "  ({} melody notes had unreadable names and were skipped)",
            song.dropped_note_count
        );
    }

    if args.top > 0 {
        println!("Top {} candidates:", args.top);
        for (rank, candidate) in rank_candidates(&song.candidates, &library)
            .into_iter()
            .take(args.top)
            .enumerate()
        {
            println!(
                "  {:>2}. {:<20} {:+3}  {:>6.1}  ({} missed)",
                rank + 1,
                candidate.scale_id,
                candidate.transposition,
                candidate.score,
                candidate.missed_notes.len()
            );
        }
    }

    Ok(())
}
