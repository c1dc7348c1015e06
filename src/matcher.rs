//! Matcher (component F), scoring candidate tracks by histogram of offset
//! deltas and picking a winner with a confidence figure.
//!
//! For every query hash that resolves to one or more postings, each
//! posting contributes one `(track_id, delta)` vote where
//! `delta = posting.anchor_frame - query.anchor_frame`. A true alignment
//! concentrates many votes on one integer `delta` for one track; random
//! matches spread across deltas. The largest per-track bucket is that
//! track's score; the top two scores feed a ratio-test confidence.

use std::collections::HashMap;

use crate::catalog::TrackId;
use crate::config::Config;
use crate::hashing::Fingerprint;
use crate::index::Index;

/// One ranked candidate in a matcher result.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub track_id: TrackId,
    /// Size of the largest offset-delta bucket (`peak_count`).
    pub score: usize,
    /// Total postings observed for this track across all deltas.
    pub total_postings: usize,
    /// The offset delta (catalog frame minus query frame) the winning
    /// bucket sits at.
    pub delta_frames: i64,
}

/// The result of running the matcher against a query's fingerprints.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// The top candidate cleared both the absolute (`n_min`) and ratio
    /// (`conf_threshold`) acceptance tests.
    Matched {
        candidate: Candidate,
        confidence: f32,
    },
    /// Either no postings were found at all, or the top candidate did not
    /// clear the acceptance tests. `NoMatch` is a value, not an error
    /// (spec §7): identification completed successfully with no result.
    NoMatch {
        /// Ranked candidates, for callers that want the "below threshold"
        /// detail rather than a bare miss.
        ranked: Vec<Candidate>,
    },
}

struct Accumulator {
    // track_id -> (delta -> vote count)
    histograms: HashMap<TrackId, HashMap<i64, usize>>,
}

impl Accumulator {
    fn new() -> Self {
        Accumulator {
            histograms: HashMap::new(),
        }
    }

    fn record(&mut self, track_id: TrackId, delta: i64) {
        *self
            .histograms
            .entry(track_id)
            .or_default()
            .entry(delta)
            .or_insert(0) += 1;
    }

    fn into_ranked_candidates(self) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = self
            .histograms
            .into_iter()
            .map(|(track_id, histogram)| {
                let total_postings: usize = histogram.values().sum();
                let (&delta_frames, &score) = histogram
                    .iter()
                    .max_by_key(|&(&delta, &count)| (count, std::cmp::Reverse(delta)))
                    .expect("histogram is never empty once a track_id is present");
                Candidate {
                    track_id,
                    score,
                    total_postings,
                    delta_frames,
                }
            })
            .collect();

        // score desc, then total posting count desc, then track_id asc.
        candidates.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| b.total_postings.cmp(&a.total_postings))
                .then_with(|| a.track_id.cmp(&b.track_id))
        });
        candidates
    }
}

/// Runs the matcher: fetches postings for every query hash (the index
/// skips hot hashes internally), builds the per-track offset histogram,
/// and returns a ranked match outcome.
pub fn identify(
    index: &dyn Index,
    query: &[Fingerprint],
    config: &Config,
) -> Result<MatchOutcome, crate::error::Error> {
    let mut accumulator = Accumulator::new();

    for q in query {
        for posting in index.lookup(q.hash)? {
            let delta = posting.anchor_frame as i64 - q.anchor_frame as i64;
            accumulator.record(posting.track_id, delta);
        }
    }

    let ranked = accumulator.into_ranked_candidates();
    Ok(decide(ranked, config))
}

/// Applies the acceptance test to an already-ranked candidate list. Split
/// out from [`identify`] so the scoring/ranking logic and the
/// accept/reject policy can be unit-tested independently.
fn decide(ranked: Vec<Candidate>, config: &Config) -> MatchOutcome {
    let Some(top) = ranked.first().cloned() else {
        return MatchOutcome::NoMatch { ranked };
    };

    let runner_up_score = ranked.get(1).map(|c| c.score).unwrap_or(0);
    let denominator = (runner_up_score as f32 + top.score as f32 * config.beta).max(1.0);
    let confidence = top.score as f32 / denominator;

    if top.score >= config.n_min && confidence >= config.conf_threshold {
        MatchOutcome::Matched {
            candidate: top,
            confidence,
        }
    } else {
        MatchOutcome::NoMatch { ranked }
    }
}
