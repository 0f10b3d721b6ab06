//! Batch resolution requests.
//!
//! A batch is a JSON array mixing single-team and fixture requests. Fixtures
//! either list odds `games` (and must land on one of them) or a flat list of
//! `candidates`. Requests with an `expected` odds name are treated as labeled
//! and fed back through verification after resolving.

use anyhow::{Context, Result};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use teamlink_rust_core::{
    FixtureMatch, GameMatch, MatchContext, MatchResult, OddsGame, TeamResolver,
};
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct TeamRequest {
    pub source: String,
    pub candidates: Vec<String>,
    #[serde(default)]
    pub league: Option<String>,
    /// Known correct odds name, if labeled
    #[serde(default)]
    pub expected: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureRequest {
    pub home: String,
    pub away: String,
    #[serde(default)]
    pub candidates: Vec<String>,
    /// Odds games to pair the fixture with; takes precedence over `candidates`
    #[serde(default)]
    pub games: Vec<OddsGame>,
    #[serde(default)]
    pub league: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BatchRequest {
    Fixture(FixtureRequest),
    Team(TeamRequest),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchOutcome {
    Team {
        result: MatchResult,
        /// Verdict fed back for labeled requests
        verified: Option<bool>,
    },
    Fixture(FixtureMatch),
    Game(GameMatch),
}

impl BatchOutcome {
    pub fn is_match(&self) -> bool {
        match self {
            BatchOutcome::Team { result, .. } => result.is_match(),
            BatchOutcome::Fixture(fixture) => fixture.is_match(),
            BatchOutcome::Game(game) => game.is_match(),
        }
    }
}

fn context_for(league: &Option<String>) -> MatchContext {
    match league {
        Some(league) => MatchContext::new().with_league(league.as_str()),
        None => MatchContext::new(),
    }
}

fn team(source: &str, candidates: &[&str], league: &str) -> BatchRequest {
    BatchRequest::Team(TeamRequest {
        source: source.to_string(),
        candidates: candidates.iter().map(|c| c.to_string()).collect(),
        league: Some(league.to_string()),
        expected: None,
    })
}

/// Sample run used when no batch file is configured
pub fn demo_requests() -> Vec<BatchRequest> {
    vec![
        team(
            "Manchester United",
            &["Manchester Utd", "Manchester City", "Liverpool"],
            "Premier League",
        ),
        team(
            "FC Barcelona",
            &["Barcelona", "Real Madrid", "Atletico Madrid"],
            "La Liga",
        ),
        team(
            "Bayern Munich",
            &["Bayern Munich", "Dortmund", "RB Leipzig"],
            "Bundesliga",
        ),
        team("Paris Saint Germain", &["PSG", "Marseille", "Lyon"], "Ligue 1"),
        team("Unknown Team FC", &["Team A", "Team B", "Team C"], "Test League"),
        team(
            "Borussia Monchengladbach",
            &["B. Monchengladbach", "Dortmund", "Schalke"],
            "Bundesliga",
        ),
        BatchRequest::Fixture(FixtureRequest {
            home: "Real Madrid".to_string(),
            away: "FC Barcelona".to_string(),
            candidates: Vec::new(),
            games: vec![
                OddsGame::new("Atl Madrid", "Sevilla"),
                OddsGame::new("Real Madrid", "Barcelona"),
            ],
            league: Some("La Liga".to_string()),
        }),
    ]
}

/// Load a batch from a JSON file
pub fn load_requests(path: &Path) -> Result<Vec<BatchRequest>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse batch file {}", path.display()))
}

/// Resolve every request concurrently. Output order follows input order.
pub async fn run_batch(resolver: &TeamResolver, requests: &[BatchRequest]) -> Vec<BatchOutcome> {
    let outcomes = join_all(requests.iter().map(|request| run_request(resolver, request))).await;

    let matched = outcomes.iter().filter(|o| o.is_match()).count();
    info!("Batch complete: {}/{} matched", matched, outcomes.len());
    outcomes
}

async fn run_request(resolver: &TeamResolver, request: &BatchRequest) -> BatchOutcome {
    match request {
        BatchRequest::Team(req) => {
            let context = context_for(&req.league);
            let result = resolver.resolve(&req.source, &req.candidates, &context).await;
            log_result(&result);

            let verified = match &req.expected {
                Some(expected) => {
                    Some(feedback(resolver, &req.source, &result, expected, &context).await)
                }
                None => None,
            };
            BatchOutcome::Team { result, verified }
        }
        BatchRequest::Fixture(req) if !req.games.is_empty() => {
            let context = context_for(&req.league);
            let game = resolver
                .resolve_game(&req.home, &req.away, &req.games, &context)
                .await;
            log_result(&game.fixture.home);
            log_result(&game.fixture.away);
            match game.game {
                Some(index) => info!("{} vs {} -> odds game #{}", req.home, req.away, index),
                None => warn!("No odds game found for {} vs {}", req.home, req.away),
            }
            BatchOutcome::Game(game)
        }
        BatchRequest::Fixture(req) => {
            let context = context_for(&req.league);
            let fixture = resolver
                .resolve_fixture(&req.home, &req.away, &req.candidates, &context)
                .await;
            log_result(&fixture.home);
            log_result(&fixture.away);
            BatchOutcome::Fixture(fixture)
        }
    }
}

/// Verify a labeled result. Returns whether the resolver got it right.
async fn feedback(
    resolver: &TeamResolver,
    source: &str,
    result: &MatchResult,
    expected: &str,
    context: &MatchContext,
) -> bool {
    let correct = result
        .matched_name
        .as_deref()
        .map(|m| m.trim().eq_ignore_ascii_case(expected.trim()))
        .unwrap_or(false);

    if !correct {
        if let Some(matched) = &result.matched_name {
            resolver.verify(source, matched, false, context).await;
        }
        warn!(
            "Labeled mismatch for {}: got {:?}, expected {}",
            source, result.matched_name, expected
        );
    }
    resolver.verify(source, expected, true, context).await;
    correct
}

fn log_result(result: &MatchResult) {
    match (&result.matched_name, result.strategy_used) {
        (Some(matched), Some(strategy)) => info!(
            "{} -> {} ({}, confidence {:.3}, {}ms)",
            result.source_name,
            matched,
            strategy,
            result.confidence,
            result.elapsed.as_millis()
        ),
        _ => info!(
            "{} -> no match (alternatives: {:?})",
            result.source_name, result.alternatives
        ),
    }
}
