//!
//! src/scoring.rs
//!
//! Confidence scoring for cross-catalog candidates. A candidate is only
//! ever surfaced when its score clears the policy threshold; a silent
//! wrong link is worse than no link
//!
//!

use std::collections::HashSet;

use crate::normalize::{primary_artist, strip_decoration};
use crate::types::{MatchResult, MatchTarget, RawCandidate};

/// Title tokens this short carry no signal on their own.
const TITLE_TOKEN_MIN: usize = 2;
const ARTIST_TOKEN_MIN: usize = 1;

/// Markers of an alternate recording of the same composition. A candidate
/// carrying one the target lacks is almost never the wanted track.
pub const VERSION_MARKERS: [&str; 12] = [
    "remix", "remixed", "live", "acoustic", "unplugged", "instrumental",
    "cover", "karaoke", "extended", "demo", "bootleg", "medley",
];

/// Injectable scoring knobs. Title outweighs artist 70/30 since title
/// collisions are rarer than artist-credit formatting drift.
#[derive(Debug, Clone)]
pub struct MatchPolicy {
    pub title_weight: f64,
    pub artist_weight: f64,
    pub version_penalty: f64,
    pub exact_bonus: f64,
    pub missing_artist_baseline: f64,
    pub threshold: f64,
    pub version_markers: Vec<String>,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            title_weight: 0.7,
            artist_weight: 0.3,
            version_penalty: 0.4,
            exact_bonus: 0.5,
            missing_artist_baseline: 0.3,
            threshold: 0.75,
            version_markers: VERSION_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl MatchPolicy {
    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold, ..Self::default() }
    }
}

fn fold(s: &str) -> String {
    s.trim().to_lowercase()
}

fn word_tokens(s: &str, min_len: usize) -> HashSet<String> {
    s.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| t.chars().count() > min_len)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count() as f64;
    let total = a.union(b).count() as f64;
    shared / total
}

/// Tiered title similarity: exact, exact-after-cleaning, containment, then
/// token overlap with a partial-match discount.
fn title_score(candidate: &str, target: &str) -> f64 {
    if fold(candidate) == fold(target) {
        return 1.0;
    }

    let c_clean = fold(&strip_decoration(candidate));
    let t_clean = fold(&strip_decoration(target));
    if !c_clean.is_empty() && c_clean == t_clean {
        return 0.95;
    }
    if !c_clean.is_empty() && !t_clean.is_empty()
        && (c_clean.contains(&t_clean) || t_clean.contains(&c_clean))
    {
        return 0.85;
    }

    let overlap = jaccard(
        &word_tokens(&c_clean, TITLE_TOKEN_MIN),
        &word_tokens(&t_clean, TITLE_TOKEN_MIN),
    );
    if overlap >= 0.6 { overlap * 0.8 } else { overlap * 0.5 }
}

/// Artist similarity; with no target artist the policy baseline applies and
/// the title has to carry the match.
fn artist_score(candidate: &str, target: Option<&str>, policy: &MatchPolicy) -> f64 {
    let Some(target) = target else {
        return policy.missing_artist_baseline;
    };

    let c_raw = fold(candidate);
    let t_raw = fold(target);
    if !c_raw.is_empty() && c_raw == t_raw {
        return 1.0;
    }

    let c_main = primary_artist(candidate);
    let t_main = primary_artist(target);
    if !c_main.is_empty() && !t_main.is_empty() {
        if c_main == t_main {
            return 0.95;
        }
        if c_main.contains(&t_main) || t_main.contains(&c_main) {
            return 0.8;
        }
    }

    let overlap = jaccard(
        &word_tokens(&c_raw, ARTIST_TOKEN_MIN),
        &word_tokens(&t_raw, ARTIST_TOKEN_MIN),
    );
    if overlap >= 0.5 { overlap * 0.7 } else { overlap * 0.3 }
}

/// Version markers are matched on whole raw-title tokens so "Lively" never
/// trips the "live" marker.
fn has_version_marker(title: &str, markers: &[String]) -> bool {
    let tokens = word_tokens(title, 0);
    markers.iter().any(|m| tokens.contains(m.as_str()))
}

/// Score one candidate against the target under the given policy.
pub fn score(candidate: &RawCandidate, target: &MatchTarget, policy: &MatchPolicy) -> f64 {
    let title = title_score(&candidate.title, &target.title);
    let artist = artist_score(&candidate.artist, target.artist.as_deref(), policy);

    let mut total = policy.title_weight * title + policy.artist_weight * artist;

    let candidate_versioned = has_version_marker(&candidate.title, &policy.version_markers);
    let target_versioned = has_version_marker(&target.title, &policy.version_markers);
    if candidate_versioned && !target_versioned {
        total -= policy.version_penalty;
    }

    if title >= 1.0 && artist >= 1.0 {
        total += policy.exact_bonus;
    }

    total.max(0.0)
}

/// Scores every candidate and returns the best one if it clears the policy
/// threshold. Ties keep the first-seen candidate since catalogs already
/// return results in relevance order.
pub fn select_best(
    candidates: &[RawCandidate],
    target: &MatchTarget,
    policy: &MatchPolicy,
) -> Option<MatchResult> {
    let mut best: Option<MatchResult> = None;
    for candidate in candidates {
        let s = score(candidate, target, policy);
        let improved = match &best {
            Some(current) => s > current.score,
            None => true,
        };
        if improved {
            best = Some(MatchResult { candidate: candidate.clone(), score: s });
        }
    }
    best.filter(|b| b.score >= policy.threshold)
}
