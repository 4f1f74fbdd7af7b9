use crate::model::config::RankerConfig;
use crate::model::scales::ScaleLibrary;
use crate::model::song::{MatchCandidate, MatchMode};
use log::debug;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Facts about a candidate's parent scale the tie-breaks need.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScaleFacts {
    note_count: u32,
    popularity: f64,
}

/// Candidates whose scale is missing from the library rank as an empty, unpopular scale.
const MISSING_SCALE: ScaleFacts = ScaleFacts {
    note_count: 0,
    popularity: 0.0,
};

/// Scale facts keyed by id, built once per ranking pass.
struct FactTable<'l> {
    by_id: HashMap<&'l str, ScaleFacts>,
}

impl<'l> FactTable<'l> {
    fn new(library: &'l ScaleLibrary) -> Self {
        let mut by_id = HashMap::with_capacity(library.len());
        for scale in &library.scales {
            // first definition wins, matching `ScaleLibrary::get`
            by_id.entry(scale.id.as_str()).or_insert(ScaleFacts {
                note_count: scale.total_note_count,
                popularity: scale.popularity_score,
            });
        }

        Self { by_id }
    }

    fn get(&self, candidate: &MatchCandidate) -> ScaleFacts {
        self.by_id
            .get(candidate.scale_id.as_str())
            .copied()
            .unwrap_or(MISSING_SCALE)
    }

    /// Higher score, then higher popularity, then smaller shift. `Greater` means `a` ranks first.
    fn compare(&self, a: &MatchCandidate, b: &MatchCandidate) -> Ordering {
        a.score
            .total_cmp(&b.score)
            .then_with(|| self.get(a).popularity.total_cmp(&self.get(b).popularity))
            .then_with(|| b.transposition.abs().cmp(&a.transposition.abs()))
    }

    /// Best of `pool`; the earliest candidate wins a complete tie.
    fn best_of<'a, I>(&self, pool: I) -> Option<&'a MatchCandidate>
    where
        I: IntoIterator<Item = &'a MatchCandidate>,
    {
        pool.into_iter().reduce(|best, c| {
            if self.compare(c, best) == Ordering::Greater {
                c
            } else {
                best
            }
        })
    }
}

/// Pick exactly one winner from the scored candidates (`None` only when there are none).
///
/// Pro mode takes the top score outright. Standard mode looks at every candidate within
/// `tier_margin` of the top score and prefers the tier-one instrument sizes in there.
pub fn select_best<'a>(
    candidates: &'a [MatchCandidate],
    library: &ScaleLibrary,
    mode: MatchMode,
    config: &RankerConfig,
) -> Option<&'a MatchCandidate> {
    let facts = FactTable::new(library);
    let winner = match mode {
        MatchMode::Pro => facts.best_of(candidates),
        MatchMode::Standard => {
            let top = candidates.iter().map(|c| c.score).reduce(f64::max)?;
            let tier: Vec<&MatchCandidate> = candidates
                .iter()
                .filter(|c| c.score >= top - config.tier_margin)
                .collect();

            let preferred: Vec<&MatchCandidate> = tier
                .iter()
                .copied()
                .filter(|c| config.tier_one_sizes.contains(&facts.get(c).note_count))
                .collect();

            debug!(
                "Standard tier holds {} candidate(s) within {:.1} of {:.2}, {} tier-one",
                tier.len(),
                config.tier_margin,
                top,
                preferred.len()
            );

            if preferred.is_empty() {
                facts.best_of(tier)
            } else {
                facts.best_of(preferred)
            }
        }
    };

    if let Some(w) = winner {
        debug!(
            "{:?} mode picked '{}' at {:+} semitones ({:.2})",
            mode, w.scale_id, w.transposition, w.score
        );
    }

    winner
}

/// All candidates best-first (score, popularity, smaller shift), for leaderboards.
pub fn rank_candidates<'a>(
    candidates: &'a [MatchCandidate],
    library: &ScaleLibrary,
) -> Vec<&'a MatchCandidate> {
    let facts = FactTable::new(library);
    let mut ranked: Vec<&MatchCandidate> = candidates.iter().collect();
    ranked.sort_by(|a, b| facts.compare(b, a));
    ranked
}
