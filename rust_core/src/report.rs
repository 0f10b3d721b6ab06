//! Mapping performance report.
//!
//! Aggregates the match outcome log into per-strategy statistics, grouped
//! unresolved names and recent successes. Read-only.

use crate::matching::Strategy;
use crate::store::{KnowledgeStore, MatchOutcomeRecord, StoreCounts, StoreError, TimeRange};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Unresolved groups kept in a summary
pub const MAX_UNRESOLVED_SAMPLES: usize = 20;

/// Recent successes kept in a summary
pub const MAX_RECENT_SUCCESSES: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StrategyStats {
    /// Outcomes that reached this strategy in the cascade
    pub attempts: usize,
    /// Outcomes this strategy decided
    pub acceptances: usize,
    /// Mean confidence over acceptances
    pub avg_confidence: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnresolvedSample {
    pub source: String,
    pub league: Option<String>,
    pub failures: usize,
    /// Suggestions from the latest failure
    pub alternatives: Vec<String>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentSuccess {
    pub source: String,
    pub matched: String,
    pub strategy: Option<Strategy>,
    pub confidence: f64,
    pub league: Option<String>,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MappingSummary {
    pub per_strategy: BTreeMap<Strategy, StrategyStats>,
    pub total_attempts: usize,
    pub successful: usize,
    pub overall_success_rate: f64,
    pub avg_confidence: f64,
    pub avg_elapsed_ms: f64,
    pub ambiguous_count: usize,
    pub verified_correct: usize,
    pub verified_incorrect: usize,
    pub unresolved_samples: Vec<UnresolvedSample>,
    pub recent_successes: Vec<RecentSuccess>,
    pub manual_mappings: usize,
    pub learned_mappings: usize,
    pub corrections: usize,
}

/// Summarize the outcomes recorded in `range`.
pub async fn summarize(
    store: &dyn KnowledgeStore,
    range: &TimeRange,
) -> Result<MappingSummary, StoreError> {
    let records = store.outcomes(range).await?;
    let counts = store.counts().await?;
    Ok(summarize_records(&records, &counts))
}

fn mean(total: f64, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        total / n as f64
    }
}

/// Pure aggregation over an outcome slice.
pub fn summarize_records(records: &[MatchOutcomeRecord], counts: &StoreCounts) -> MappingSummary {
    let mut per_strategy: BTreeMap<Strategy, StrategyStats> = Strategy::ALL
        .iter()
        .map(|s| (*s, StrategyStats::default()))
        .collect();
    let mut confidence_sums: BTreeMap<Strategy, f64> = BTreeMap::new();

    let mut successful = 0;
    let mut confidence_total = 0.0;
    let mut elapsed_total = 0.0;

    for record in records {
        elapsed_total += record.elapsed_ms as f64;

        // Every strategy up to the winner ran; unresolved outcomes ran them all.
        let reached = record.strategy.map(Strategy::priority).unwrap_or(u8::MAX);
        for strategy in Strategy::ALL {
            if strategy.priority() <= reached {
                if let Some(stats) = per_strategy.get_mut(&strategy) {
                    stats.attempts += 1;
                }
            }
        }

        if let (Some(strategy), true) = (record.strategy, record.is_success()) {
            successful += 1;
            confidence_total += record.confidence;
            if let Some(stats) = per_strategy.get_mut(&strategy) {
                stats.acceptances += 1;
            }
            *confidence_sums.entry(strategy).or_insert(0.0) += record.confidence;
        }
    }

    for (strategy, stats) in per_strategy.iter_mut() {
        let sum = confidence_sums.get(strategy).copied().unwrap_or(0.0);
        stats.avg_confidence = mean(sum, stats.acceptances);
        stats.success_rate = mean(stats.acceptances as f64, stats.attempts);
    }

    MappingSummary {
        per_strategy,
        total_attempts: records.len(),
        successful,
        overall_success_rate: mean(successful as f64, records.len()),
        avg_confidence: mean(confidence_total, successful),
        avg_elapsed_ms: mean(elapsed_total, records.len()),
        ambiguous_count: records.iter().filter(|r| r.ambiguous).count(),
        verified_correct: records
            .iter()
            .filter(|r| r.was_correct == Some(true))
            .count(),
        verified_incorrect: records
            .iter()
            .filter(|r| r.was_correct == Some(false))
            .count(),
        unresolved_samples: unresolved_samples(records),
        recent_successes: recent_successes(records),
        manual_mappings: counts.manual_mappings,
        learned_mappings: counts.learned_mappings,
        corrections: counts.corrections,
    }
}

fn unresolved_samples(records: &[MatchOutcomeRecord]) -> Vec<UnresolvedSample> {
    let mut groups: BTreeMap<(String, Option<String>), UnresolvedSample> = BTreeMap::new();

    for record in records.iter().filter(|r| !r.is_success()) {
        let key = (record.source.clone(), record.league.clone());
        let sample = groups.entry(key).or_insert_with(|| UnresolvedSample {
            source: record.source.clone(),
            league: record.league.clone(),
            failures: 0,
            alternatives: Vec::new(),
            last_seen: record.resolved_at,
        });
        sample.failures += 1;
        if record.resolved_at >= sample.last_seen {
            sample.last_seen = record.resolved_at;
            sample.alternatives = record.alternatives.clone();
        }
    }

    let mut samples: Vec<UnresolvedSample> = groups.into_values().collect();
    samples.sort_by(|a, b| b.failures.cmp(&a.failures).then_with(|| a.source.cmp(&b.source)));
    samples.truncate(MAX_UNRESOLVED_SAMPLES);
    samples
}

fn recent_successes(records: &[MatchOutcomeRecord]) -> Vec<RecentSuccess> {
    let mut successes: Vec<&MatchOutcomeRecord> =
        records.iter().filter(|r| r.is_success()).collect();
    successes.sort_by(|a, b| b.resolved_at.cmp(&a.resolved_at));

    successes
        .into_iter()
        .take(MAX_RECENT_SUCCESSES)
        .filter_map(|r| {
            Some(RecentSuccess {
                source: r.source.clone(),
                matched: r.candidate.clone()?,
                strategy: r.strategy,
                confidence: r.confidence,
                league: r.league.clone(),
                resolved_at: r.resolved_at,
            })
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileKnowledgeStore, ManualMappings};
    use chrono::Duration;
    use uuid::Uuid;

    fn record(
        source: &str,
        candidate: Option<&str>,
        strategy: Option<Strategy>,
        confidence: f64,
    ) -> MatchOutcomeRecord {
        MatchOutcomeRecord {
            id: Uuid::new_v4(),
            source: source.to_string(),
            candidate: candidate.map(str::to_string),
            strategy,
            confidence,
            resolved_at: Utc::now(),
            was_correct: None,
            league: None,
            ambiguous: false,
            alternatives: Vec::new(),
            elapsed_ms: 2,
        }
    }

    #[test]
    fn test_empty_log_gives_zeroed_summary() {
        let summary = summarize_records(&[], &StoreCounts::default());
        assert_eq!(summary.total_attempts, 0);
        assert_eq!(summary.overall_success_rate, 0.0);
        assert_eq!(summary.avg_confidence, 0.0);
        assert!(summary.unresolved_samples.is_empty());
        assert!(summary.per_strategy.values().all(|s| s.attempts == 0));
    }

    #[test]
    fn test_attempts_follow_cascade() {
        let records = vec![
            record("Chelsea", Some("Chelsea"), Some(Strategy::Exact), 1.0),
            record("Inter", Some("Inter Milan"), Some(Strategy::Substring), 0.75),
            record("Zzyzx Rovers", None, None, 0.0),
        ];
        let summary = summarize_records(&records, &StoreCounts::default());

        assert_eq!(summary.per_strategy[&Strategy::Exact].attempts, 3);
        assert_eq!(summary.per_strategy[&Strategy::Exact].acceptances, 1);
        assert_eq!(summary.per_strategy[&Strategy::Substring].attempts, 2);
        assert_eq!(summary.per_strategy[&Strategy::Substring].acceptances, 1);
        assert_eq!(summary.per_strategy[&Strategy::Fuzzy].attempts, 1);
        assert_eq!(summary.per_strategy[&Strategy::Fuzzy].acceptances, 0);
        assert_eq!(summary.per_strategy[&Strategy::Substring].success_rate, 0.5);

        assert_eq!(summary.successful, 2);
        assert!((summary.overall_success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((summary.avg_confidence - 0.875).abs() < 1e-9);
        assert_eq!(summary.avg_elapsed_ms, 2.0);
    }

    #[test]
    fn test_unresolved_grouped_by_source_and_league() {
        let mut older = record("Unknown Team FC", None, None, 0.0);
        older.resolved_at = Utc::now() - Duration::minutes(5);
        older.alternatives = vec!["Team A".to_string()];
        let mut newer = record("Unknown Team FC", None, None, 0.0);
        newer.alternatives = vec!["Team B".to_string(), "Team C".to_string()];
        let mut other_league = record("Unknown Team FC", None, None, 0.0);
        other_league.league = Some("epl".to_string());

        let summary =
            summarize_records(&[older, newer, other_league], &StoreCounts::default());
        assert_eq!(summary.unresolved_samples.len(), 2);
        let top = &summary.unresolved_samples[0];
        assert_eq!(top.failures, 2);
        assert_eq!(top.league, None);
        assert_eq!(top.alternatives, vec!["Team B", "Team C"]);
    }

    #[test]
    fn test_recent_successes_newest_first_and_capped() {
        let records: Vec<MatchOutcomeRecord> = (0..15)
            .map(|i| {
                let mut r = record(&format!("Team {}", i), Some("X"), Some(Strategy::Fuzzy), 0.6);
                r.resolved_at = Utc::now() - Duration::minutes(15 - i);
                r
            })
            .collect();
        let summary = summarize_records(&records, &StoreCounts::default());
        assert_eq!(summary.recent_successes.len(), MAX_RECENT_SUCCESSES);
        assert_eq!(summary.recent_successes[0].source, "Team 14");
    }

    #[test]
    fn test_verification_and_ambiguity_counts() {
        let mut correct = record("Inter", Some("Inter Milan"), Some(Strategy::Substring), 0.75);
        correct.was_correct = Some(true);
        let mut wrong = record("Real", Some("Real Betis"), Some(Strategy::WordSet), 0.7);
        wrong.was_correct = Some(false);
        wrong.ambiguous = true;

        let counts = StoreCounts {
            manual_mappings: 4,
            learned_mappings: 1,
            corrections: 1,
            outcomes: 2,
        };
        let summary = summarize_records(&[correct, wrong], &counts);
        assert_eq!(summary.verified_correct, 1);
        assert_eq!(summary.verified_incorrect, 1);
        assert_eq!(summary.ambiguous_count, 1);
        assert_eq!(summary.manual_mappings, 4);
        assert_eq!(summary.corrections, 1);
    }

    #[tokio::test]
    async fn test_summarize_store() {
        let store = FileKnowledgeStore::in_memory(ManualMappings::with_defaults());
        let summary = summarize(&store, &TimeRange::all()).await.unwrap();
        assert_eq!(summary.total_attempts, 0);
        assert!(summary.manual_mappings > 0);

        let json = serde_json::to_value(&summary).unwrap();
        assert!(json["per_strategy"]["word_set"].is_object());
    }
}
