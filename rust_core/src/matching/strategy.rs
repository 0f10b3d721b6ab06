//! Heuristic matching strategies.
//!
//! Each heuristic scores one (source, candidate) pair on their prepared
//! forms and either accepts it with a raw score or rejects it. `best_match`
//! runs one strategy over the whole candidate set and applies the tie-break
//! rule: highest raw score, then shortest normalized name, then input order.

use super::normalize::{normalize, surface_key, tokens};
use super::Strategy;
use strsim::normalized_levenshtein;

/// Shorter name must be at least this share of the longer for containment
pub const SUBSTRING_MIN_LENGTH_RATIO: f64 = 0.4;

/// Minimum Jaccard overlap for the word-set strategy
pub const WORD_SET_MIN_RATIO: f64 = 0.5;

/// Word-set confidence band is [0.70, 0.70 + WORD_SET_CONFIDENCE_SPAN]
const WORD_SET_CONFIDENCE_SPAN: f64 = 0.04;

const MAX_ALTERNATIVES: usize = 3;

const SCORE_EPSILON: f64 = 1e-9;

/// A name with its comparison forms computed once
#[derive(Debug, Clone)]
pub struct PreparedName {
    pub raw: String,
    pub surface: String,
    pub normalized: String,
}

impl PreparedName {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            surface: surface_key(raw),
            normalized: normalize(raw),
        }
    }

    fn normalized_len(&self) -> usize {
        self.normalized.chars().count()
    }
}

/// Prepare a candidate list, dropping blanks and duplicate spellings.
///
/// Feeds list the same team once per fixture, so duplicates are common and
/// must not count as ties.
pub fn prepare_candidates<S: AsRef<str>>(candidates: &[S]) -> Vec<PreparedName> {
    let mut prepared: Vec<PreparedName> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let name = PreparedName::new(candidate.as_ref());
        if name.surface.is_empty() || prepared.iter().any(|p| p.surface == name.surface) {
            continue;
        }
        prepared.push(name);
    }
    prepared
}

/// Winning candidate of a single strategy
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyMatch {
    pub strategy: Strategy,
    /// Index into the prepared candidate list
    pub index: usize,
    pub raw_score: f64,
    pub confidence: f64,
    /// Indices of runner-up candidates, best first
    pub alternatives: Vec<usize>,
    pub ambiguous: bool,
}

/// Confidence assigned for an accepted raw score
pub fn confidence_for(strategy: Strategy, raw_score: f64) -> f64 {
    match strategy {
        Strategy::WordSet => {
            let scaled = ((raw_score - WORD_SET_MIN_RATIO) / (1.0 - WORD_SET_MIN_RATIO)).clamp(0.0, 1.0);
            strategy.base_confidence() + WORD_SET_CONFIDENCE_SPAN * scaled
        }
        Strategy::Fuzzy => strategy.base_confidence() * raw_score.clamp(0.0, 1.0),
        Strategy::Learned => strategy.base_confidence().min(raw_score),
        _ => strategy.base_confidence(),
    }
}

/// Raw score for a pair, or None if the strategy rejects it.
///
/// Knowledge store strategies never score pairs here.
pub fn score_pair(
    strategy: Strategy,
    source: &PreparedName,
    candidate: &PreparedName,
    fuzzy_floor: f64,
) -> Option<f64> {
    match strategy {
        Strategy::Exact => exact_score(source, candidate),
        Strategy::Normalized => normalized_score(source, candidate),
        Strategy::Substring => substring_score(&source.normalized, &candidate.normalized),
        Strategy::WordSet => word_set_score(&source.normalized, &candidate.normalized),
        Strategy::Fuzzy => fuzzy_score(&source.normalized, &candidate.normalized, fuzzy_floor),
        Strategy::Manual | Strategy::Learned => None,
    }
}

fn exact_score(source: &PreparedName, candidate: &PreparedName) -> Option<f64> {
    (!source.surface.is_empty() && source.surface == candidate.surface).then_some(1.0)
}

fn normalized_score(source: &PreparedName, candidate: &PreparedName) -> Option<f64> {
    (!source.normalized.is_empty() && source.normalized == candidate.normalized).then_some(1.0)
}

fn substring_score(source: &str, candidate: &str) -> Option<f64> {
    if source.is_empty() || candidate.is_empty() {
        return None;
    }
    if !source.contains(candidate) && !candidate.contains(source) {
        return None;
    }
    let a = source.chars().count() as f64;
    let b = candidate.chars().count() as f64;
    let ratio = a.min(b) / a.max(b);
    (ratio >= SUBSTRING_MIN_LENGTH_RATIO).then_some(ratio)
}

fn word_set_score(source: &str, candidate: &str) -> Option<f64> {
    let a = tokens(source);
    let b = tokens(candidate);
    if a.is_empty() || b.is_empty() {
        return None;
    }
    let intersection = a.intersection(&b).count() as f64;
    let union = a.union(&b).count() as f64;
    let ratio = intersection / union;
    (ratio >= WORD_SET_MIN_RATIO).then_some(ratio)
}

fn fuzzy_score(source: &str, candidate: &str, fuzzy_floor: f64) -> Option<f64> {
    if source.is_empty() || candidate.is_empty() {
        return None;
    }
    let ratio = normalized_levenshtein(source, candidate);
    (ratio >= fuzzy_floor).then_some(ratio)
}

/// Run one heuristic strategy over all candidates and pick the winner.
pub fn best_match(
    strategy: Strategy,
    source: &PreparedName,
    candidates: &[PreparedName],
    fuzzy_floor: f64,
) -> Option<StrategyMatch> {
    let mut scored: Vec<(usize, f64)> = candidates
        .iter()
        .enumerate()
        .filter_map(|(i, c)| score_pair(strategy, source, c, fuzzy_floor).map(|s| (i, s)))
        .collect();

    if scored.is_empty() {
        return None;
    }

    scored.sort_by(|(ia, sa), (ib, sb)| {
        sb.partial_cmp(sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| candidates[*ia].normalized_len().cmp(&candidates[*ib].normalized_len()))
            .then_with(|| ia.cmp(ib))
    });

    let (index, raw_score) = scored[0];
    let ties = scored
        .iter()
        .filter(|(_, s)| (s - raw_score).abs() < SCORE_EPSILON)
        .count();

    Some(StrategyMatch {
        strategy,
        index,
        raw_score,
        confidence: confidence_for(strategy, raw_score),
        alternatives: scored
            .iter()
            .skip(1)
            .take(MAX_ALTERNATIVES)
            .map(|(i, _)| *i)
            .collect(),
        ambiguous: ties > 1,
    })
}

/// Locate a knowledge-store target among the candidates.
///
/// Surface equality first, then normalized equality.
pub fn find_candidate(target: &str, candidates: &[PreparedName]) -> Option<usize> {
    let target = PreparedName::new(target);
    if target.surface.is_empty() {
        return None;
    }
    candidates
        .iter()
        .position(|c| c.surface == target.surface)
        .or_else(|| {
            if target.normalized.is_empty() {
                return None;
            }
            candidates
                .iter()
                .position(|c| c.normalized == target.normalized)
        })
}

/// Nearest candidates by edit-distance similarity, best first.
///
/// Used as suggestions when every strategy rejected the source.
pub fn closest_candidates(source: &PreparedName, candidates: &[PreparedName]) -> Vec<usize> {
    if source.normalized.is_empty() {
        return Vec::new();
    }
    let mut scored: Vec<(usize, f64)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, normalized_levenshtein(&source.normalized, &c.normalized)))
        .filter(|(_, s)| *s > 0.0)
        .collect();
    scored.sort_by(|(ia, sa), (ib, sb)| {
        sb.partial_cmp(sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| ia.cmp(ib))
    });
    scored
        .into_iter()
        .take(MAX_ALTERNATIVES)
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(names: &[&str]) -> Vec<PreparedName> {
        prepare_candidates(names)
    }

    #[test]
    fn test_prepare_drops_duplicates_and_blanks() {
        let names = prepared(&["Chelsea", " chelsea ", "", "Arsenal"]);
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].raw, "Chelsea");
        assert_eq!(names[1].raw, "Arsenal");
    }

    #[test]
    fn test_exact_is_raw_equality() {
        let source = PreparedName::new("Real Madrid");
        let hit = best_match(Strategy::Exact, &source, &prepared(&["real madrid", "Real Betis"]), 0.6).unwrap();
        assert_eq!(hit.index, 0);
        assert_eq!(hit.confidence, 1.0);

        // Normalized-only equality is not an exact match
        let source = PreparedName::new("FC Barcelona");
        assert!(best_match(Strategy::Exact, &source, &prepared(&["Barcelona"]), 0.6).is_none());
    }

    #[test]
    fn test_normalized_equality() {
        let source = PreparedName::new("FC Barcelona");
        let hit = best_match(Strategy::Normalized, &source, &prepared(&["Real Madrid", "Barcelona"]), 0.6).unwrap();
        assert_eq!(hit.index, 1);
        assert_eq!(hit.confidence, 0.85);
    }

    #[test]
    fn test_substring_with_length_guard() {
        let source = PreparedName::new("Manchester Utd");
        let candidates = prepared(&["Manchester United", "Liverpool", "Chelsea"]);
        let hit = best_match(Strategy::Substring, &source, &candidates, 0.6).unwrap();
        assert_eq!(candidates[hit.index].raw, "Manchester United");
        assert_eq!(hit.confidence, 0.75);

        // "inter" is only 5 of 16 chars of "internazionale x": rejected
        assert!(substring_score("inter", "internazionale x").is_none());
        assert!(substring_score("", "chelsea").is_none());
    }

    #[test]
    fn test_word_set_scaling() {
        let source = PreparedName::new("Atletico de Madrid");
        let candidates = prepared(&["Atletico Madrid", "Real Madrid"]);
        let hit = best_match(Strategy::WordSet, &source, &candidates, 0.6).unwrap();
        assert_eq!(candidates[hit.index].raw, "Atletico Madrid");
        assert!((hit.raw_score - 2.0 / 3.0).abs() < 1e-9);
        assert!(hit.confidence >= 0.70 && hit.confidence <= 0.74);

        assert!((confidence_for(Strategy::WordSet, 0.5) - 0.70).abs() < 1e-9);
        assert!((confidence_for(Strategy::WordSet, 1.0) - 0.74).abs() < 1e-9);
    }

    #[test]
    fn test_word_set_rejects_low_overlap() {
        assert!(word_set_score("real madrid castilla", "real betis").is_none());
    }

    #[test]
    fn test_fuzzy_respects_floor() {
        let source = PreparedName::new("Fiorentinna");
        let candidates = prepared(&["Fiorentina", "Torino"]);
        let hit = best_match(Strategy::Fuzzy, &source, &candidates, 0.6).unwrap();
        assert_eq!(candidates[hit.index].raw, "Fiorentina");
        assert!((hit.confidence - 0.6 * hit.raw_score).abs() < 1e-9);

        let source = PreparedName::new("Zzyzx Rovers");
        let candidates = prepared(&["Manchester United", "Liverpool"]);
        assert!(best_match(Strategy::Fuzzy, &source, &candidates, 0.6).is_none());
    }

    #[test]
    fn test_tie_break_prefers_shorter_name_and_flags_ambiguity() {
        let source = PreparedName::new("Real Sociedad");
        let candidates = prepared(&["Real Sociedad Femenino", "Real Sociedad B"]);
        let hit = best_match(Strategy::WordSet, &source, &candidates, 0.6).unwrap();
        assert_eq!(candidates[hit.index].raw, "Real Sociedad B");
        assert!(hit.ambiguous);

        let source = PreparedName::new("Real");
        let candidates = prepared(&["Real Betis", "Real Murcia"]);
        let hit = best_match(Strategy::WordSet, &source, &candidates, 0.6).unwrap();
        assert!(hit.ambiguous);
        assert_eq!(candidates[hit.index].raw, "Real Betis");
        assert_eq!(hit.alternatives, vec![1]);
    }

    #[test]
    fn test_knowledge_strategies_do_not_score_pairs() {
        let a = PreparedName::new("Chelsea");
        assert!(score_pair(Strategy::Manual, &a, &a, 0.6).is_none());
        assert!(score_pair(Strategy::Learned, &a, &a, 0.6).is_none());
    }

    #[test]
    fn test_learned_confidence_capped() {
        assert_eq!(confidence_for(Strategy::Learned, 0.97), 0.90);
        assert_eq!(confidence_for(Strategy::Learned, 0.75), 0.75);
    }

    #[test]
    fn test_find_candidate() {
        let candidates = prepared(&["Manchester Utd", "FC Köln"]);
        assert_eq!(find_candidate("manchester utd", &candidates), Some(0));
        assert_eq!(find_candidate("1. FC Koln", &candidates), None);
        assert_eq!(find_candidate("Koln", &candidates), Some(1));
        assert_eq!(find_candidate("", &candidates), None);
    }

    #[test]
    fn test_closest_candidates_for_suggestions() {
        let source = PreparedName::new("Unknown Team FC");
        let candidates = prepared(&["Team A", "Team B", "Team C", "Zz"]);
        let closest = closest_candidates(&source, &candidates);
        assert_eq!(closest.len(), 3);
        assert!(!closest.contains(&3));
        assert!(closest_candidates(&PreparedName::new("!!!"), &candidates).is_empty());
    }
}
