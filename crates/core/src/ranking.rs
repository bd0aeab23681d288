//! Deterministic ranking of indexer candidates.
//!
//! Pure function over the raw result list plus per-indexer configuration, so
//! selection is reproducible in tests: same inputs, same order.

use crate::clients::ReleaseCandidate;
use crate::config::IndexerConfig;

/// A candidate with its computed score.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub candidate: ReleaseCandidate,
    pub score: f64,
}

/// Preferred audio container tags, best first.
const FORMAT_SCORES: &[(&str, f64)] = &[
    ("m4b", 40.0),
    ("m4a", 30.0),
    ("mp3", 20.0),
    ("flac", 10.0),
];

/// Seeder count at which the health component saturates.
const IDEAL_SEEDERS: u32 = 20;

fn format_score(title: &str) -> f64 {
    let lower = title.to_lowercase();
    FORMAT_SCORES
        .iter()
        .find(|(tag, _)| lower.contains(tag))
        .map(|(_, score)| *score)
        .unwrap_or(0.0)
}

fn priority_score(candidate: &ReleaseCandidate, indexers: &[IndexerConfig]) -> f64 {
    // Prefer the configured priority over whatever the aggregator reported.
    let priority = indexers
        .iter()
        .find(|i| i.id == candidate.indexer_id || i.name == candidate.indexer_name)
        .map(|i| i.priority)
        .unwrap_or(candidate.indexer_priority);

    // Lower priority value wins; clamp to the 0-50 scale the aggregator uses.
    let clamped = priority.clamp(0, 50) as f64;
    (50.0 - clamped) / 50.0 * 25.0
}

fn health_score(seeders: u32) -> f64 {
    let capped = seeders.min(IDEAL_SEEDERS) as f64;
    capped / IDEAL_SEEDERS as f64 * 20.0
}

fn flag_score(flags: &[String]) -> f64 {
    let mut score = 0.0;
    for flag in flags {
        match flag.to_lowercase().as_str() {
            "freeleech" => score += 5.0,
            "internal" => score += 3.0,
            _ => {}
        }
    }
    score
}

/// Score one candidate.
pub fn score_candidate(candidate: &ReleaseCandidate, indexers: &[IndexerConfig]) -> f64 {
    format_score(&candidate.title)
        + priority_score(candidate, indexers)
        + health_score(candidate.seeders)
        + flag_score(&candidate.flags)
}

/// Rank candidates best first.
///
/// Ties break on configured priority, then seeders, then title, keeping the
/// order fully deterministic.
pub fn rank(candidates: &[ReleaseCandidate], indexers: &[IndexerConfig]) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = candidates
        .iter()
        .map(|candidate| RankedCandidate {
            score: score_candidate(candidate, indexers),
            candidate: candidate.clone(),
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.candidate.indexer_priority.cmp(&b.candidate.indexer_priority))
            .then_with(|| b.candidate.seeders.cmp(&a.candidate.seeders))
            .then_with(|| a.candidate.title.cmp(&b.candidate.title))
    });

    ranked
}
