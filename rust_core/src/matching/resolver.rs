//! Team name resolver.
//!
//! Runs the strategy cascade for one source name against a candidate set,
//! consulting the knowledge store for manual and learned mappings before any
//! heuristic. Store reads that fail are skipped; store writes are retried
//! once and then dropped. Resolution itself never fails.

use super::normalize::surface_key;
use super::strategy::{self, PreparedName, StrategyMatch};
use super::{MatchContext, MatchResult, Strategy};
use crate::config::ResolverConfig;
use crate::report::{self, MappingSummary};
use crate::store::retry::{execute_with_retry, DEFAULT_WRITE_BACKOFF, WRITE_ATTEMPTS};
use crate::store::{KnowledgeStore, MatchOutcomeRecord, StoreError, TimeRange};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Both sides of a fixture resolved against the odds feed.
///
/// Built from a flat list of odds names, so it says nothing about whether the
/// two names belong to the same odds game. See [`GameMatch`] for that.
#[derive(Debug, Clone, Serialize)]
pub struct FixtureMatch {
    pub home: MatchResult,
    pub away: MatchResult,
}

impl FixtureMatch {
    /// Both teams matched, and not to the same odds name
    pub fn is_match(&self) -> bool {
        match (&self.home.matched_name, &self.away.matched_name) {
            (Some(home), Some(away)) => !home.eq_ignore_ascii_case(away),
            _ => false,
        }
    }

    /// Lower of the two confidences; 0 unless both sides matched
    pub fn confidence(&self) -> f64 {
        if self.is_match() {
            self.home.confidence.min(self.away.confidence)
        } else {
            0.0
        }
    }
}

/// One game listed by the odds feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OddsGame {
    pub home: String,
    pub away: String,
}

impl OddsGame {
    pub fn new(home: impl Into<String>, away: impl Into<String>) -> Self {
        Self {
            home: home.into(),
            away: away.into(),
        }
    }
}

/// A fixture resolved against the games of the odds feed
#[derive(Debug, Clone, Serialize)]
pub struct GameMatch {
    #[serde(flatten)]
    pub fixture: FixtureMatch,
    /// Index of the first game whose home and away teams are the matched names
    pub game: Option<usize>,
}

impl GameMatch {
    pub fn is_match(&self) -> bool {
        self.game.is_some() && self.fixture.is_match()
    }

    pub fn confidence(&self) -> f64 {
        if self.game.is_some() {
            self.fixture.confidence()
        } else {
            0.0
        }
    }
}

/// Resolves fixture-feed team names to odds-feed names
#[derive(Clone)]
pub struct TeamResolver {
    store: Arc<dyn KnowledgeStore>,
    config: ResolverConfig,
    write_backoff: Duration,
}

impl TeamResolver {
    pub fn new(store: Arc<dyn KnowledgeStore>, config: ResolverConfig) -> Self {
        Self {
            store,
            config,
            write_backoff: DEFAULT_WRITE_BACKOFF,
        }
    }

    /// Base delay before the single write retry
    pub fn with_write_backoff(mut self, backoff: Duration) -> Self {
        self.write_backoff = backoff;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.store
    }

    /// Resolve `source` against `candidates`.
    ///
    /// Always returns a result and always appends one outcome record.
    pub async fn resolve<S>(&self, source: &str, candidates: &[S], context: &MatchContext) -> MatchResult
    where
        S: AsRef<str> + Sync,
    {
        let started = Instant::now();
        let prepared = strategy::prepare_candidates(candidates);
        let source_name = PreparedName::new(source);

        let mut result = if source_name.surface.is_empty() {
            warn!("Cannot resolve a blank team name");
            MatchResult::unresolved(source)
        } else if prepared.is_empty() {
            warn!("No candidates supplied for {}", source);
            MatchResult::unresolved(source)
        } else {
            self.run_cascade(&source_name, &prepared, context).await
        };

        result.elapsed = started.elapsed();
        self.record(&result, context).await;
        result
    }

    async fn run_cascade(
        &self,
        source: &PreparedName,
        candidates: &[PreparedName],
        context: &MatchContext,
    ) -> MatchResult {
        let league = context.league_key();

        for step in Strategy::ALL {
            let hit = match step {
                Strategy::Manual => self.manual_match(source, candidates, league.as_deref()).await,
                Strategy::Learned => self.learned_match(source, candidates).await,
                heuristic => {
                    strategy::best_match(heuristic, source, candidates, self.config.fuzzy_floor)
                }
            };

            if let Some(hit) = hit {
                return self.accept(source, candidates, hit);
            }
        }

        let mut result = MatchResult::unresolved(&source.raw);
        result.alternatives = strategy::closest_candidates(source, candidates)
            .into_iter()
            .map(|i| candidates[i].raw.clone())
            .collect();
        debug!("No match for {} among {} candidates", source.raw, candidates.len());
        result
    }

    fn accept(
        &self,
        source: &PreparedName,
        candidates: &[PreparedName],
        hit: StrategyMatch,
    ) -> MatchResult {
        let matched = candidates[hit.index].raw.clone();

        if hit.ambiguous {
            info!(
                "Ambiguous {} match for {}: picked {} (score {:.3})",
                hit.strategy, source.raw, matched, hit.raw_score
            );
        } else {
            debug!(
                "Matched {} -> {} via {} (confidence {:.3})",
                source.raw, matched, hit.strategy, hit.confidence
            );
        }

        MatchResult {
            source_name: source.raw.clone(),
            matched_name: Some(matched),
            confidence: hit.confidence,
            strategy_used: Some(hit.strategy),
            matched_from_knowledge_store: hit.strategy.uses_knowledge_store(),
            alternatives: hit
                .alternatives
                .iter()
                .map(|i| candidates[*i].raw.clone())
                .collect(),
            ambiguous: hit.ambiguous,
            elapsed: Duration::ZERO,
        }
    }

    async fn manual_match(
        &self,
        source: &PreparedName,
        candidates: &[PreparedName],
        league: Option<&str>,
    ) -> Option<StrategyMatch> {
        let target = match self.store.lookup_manual(&source.raw, league).await {
            Ok(target) => target?,
            Err(e) => {
                warn!(
                    "Manual mapping lookup failed on {} store, skipping: {}",
                    self.store.backend_name(),
                    e
                );
                return None;
            }
        };

        let Some(index) = strategy::find_candidate(&target, candidates) else {
            debug!("Manual mapping {} -> {} not among candidates", source.raw, target);
            return None;
        };

        Some(knowledge_match(Strategy::Manual, index, 1.0))
    }

    async fn learned_match(
        &self,
        source: &PreparedName,
        candidates: &[PreparedName],
    ) -> Option<StrategyMatch> {
        let learned = match self.store.lookup_learned(&source.raw).await {
            Ok(learned) => learned?,
            Err(e) => {
                warn!(
                    "Learned mapping lookup failed on {} store, skipping: {}",
                    self.store.backend_name(),
                    e
                );
                return None;
            }
        };

        if learned.confidence < self.config.acceptance_threshold {
            debug!(
                "Learned mapping {} -> {} below threshold ({:.3} < {:.3})",
                learned.source, learned.target, learned.confidence, self.config.acceptance_threshold
            );
            return None;
        }

        let index = strategy::find_candidate(&learned.target, candidates)?;
        Some(knowledge_match(Strategy::Learned, index, learned.confidence))
    }

    async fn record(&self, result: &MatchResult, context: &MatchContext) {
        let record = MatchOutcomeRecord::from_result(result, context);
        let written = execute_with_retry(
            || self.store.record_outcome(&record),
            WRITE_ATTEMPTS,
            self.write_backoff,
        )
        .await;

        if let Err(e) = written {
            warn!("Dropping match outcome for {}: {}", record.source, e);
        }
    }

    /// Feed back whether `source -> matched` was right.
    ///
    /// A positive verdict promotes the pair to a learned mapping; a negative
    /// one purges it. The latest outcome record for the pair is marked either
    /// way. Returns whether the learned-mapping update was persisted.
    pub async fn verify(
        &self,
        source: &str,
        matched: &str,
        is_correct: bool,
        context: &MatchContext,
    ) -> bool {
        if source.trim().is_empty() || matched.trim().is_empty() {
            warn!("Ignoring verification with a blank team name");
            return false;
        }

        let league = context.league_key();
        let confirmed: Result<(), StoreError> = execute_with_retry(
            || self.store.confirm(source, matched, is_correct, league.as_deref()),
            WRITE_ATTEMPTS,
            self.write_backoff,
        )
        .await;

        match &confirmed {
            Ok(()) => info!(
                "Verification recorded: {} -> {} ({})",
                source,
                matched,
                if is_correct { "correct" } else { "incorrect" }
            ),
            Err(e) => warn!("Dropping verification {} -> {}: {}", source, matched, e),
        }

        match execute_with_retry(
            || self.store.mark_outcome(source, matched, is_correct),
            WRITE_ATTEMPTS,
            self.write_backoff,
        )
        .await
        {
            Ok(true) => {}
            Ok(false) => debug!("No recorded outcome for {} -> {}", source, matched),
            Err(e) => warn!("Could not mark outcome {} -> {}: {}", source, matched, e),
        }

        confirmed.is_ok()
    }

    /// Resolve both teams of a fixture against the same candidate list.
    pub async fn resolve_fixture<S>(
        &self,
        home: &str,
        away: &str,
        candidates: &[S],
        context: &MatchContext,
    ) -> FixtureMatch
    where
        S: AsRef<str> + Sync,
    {
        let home = self.resolve(home, candidates, context).await;
        let away = self.resolve(away, candidates, context).await;
        let fixture = FixtureMatch { home, away };

        if !fixture.is_match() {
            debug!(
                "Fixture {} vs {} not fully matched",
                fixture.home.source_name, fixture.away.source_name
            );
        }
        fixture
    }

    /// Resolve a fixture against odds games and find the game it refers to.
    ///
    /// Both names are resolved against every team the games list. The fixture
    /// matches only when one game has the resolved home team at home and the
    /// resolved away team away.
    pub async fn resolve_game(
        &self,
        home: &str,
        away: &str,
        games: &[OddsGame],
        context: &MatchContext,
    ) -> GameMatch {
        let candidates: Vec<&str> = games
            .iter()
            .flat_map(|g| [g.home.as_str(), g.away.as_str()])
            .collect();
        let fixture = self.resolve_fixture(home, away, &candidates, context).await;

        let game = match (&fixture.home.matched_name, &fixture.away.matched_name) {
            (Some(matched_home), Some(matched_away)) => {
                let (home_key, away_key) = (surface_key(matched_home), surface_key(matched_away));
                games.iter().position(|g| {
                    surface_key(&g.home) == home_key && surface_key(&g.away) == away_key
                })
            }
            _ => None,
        };

        if game.is_none() && fixture.is_match() {
            info!(
                "No odds game pairs {} with {}",
                fixture.home.source_name, fixture.away.source_name
            );
        }
        GameMatch { fixture, game }
    }

    /// Summary of recorded outcomes in `range`
    pub async fn summarize(&self, range: &TimeRange) -> Result<MappingSummary, StoreError> {
        report::summarize(self.store.as_ref(), range).await
    }
}

fn knowledge_match(strategy: Strategy, index: usize, stored_confidence: f64) -> StrategyMatch {
    StrategyMatch {
        strategy,
        index,
        raw_score: stored_confidence,
        confidence: strategy::confidence_for(strategy, stored_confidence),
        alternatives: Vec::new(),
        ambiguous: false,
    }
}

// ============================================================================
// Tests
// ============================================================================
