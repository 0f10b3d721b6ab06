//! Team Name Matching
//!
//! Defines the strategy priority table, the match context and the result
//! type shared by the resolver, the knowledge store and reporting.

use crate::league;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub mod normalize;
pub mod resolver;
pub mod strategy;

pub use resolver::{FixtureMatch, GameMatch, OddsGame, TeamResolver};

/// Matching strategy, in cascade order.
///
/// The discriminant is the priority: lower runs first and carries a higher
/// confidence. Knowledge store strategies (Manual, Learned) always run before
/// the heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Exact = 1,
    Manual = 2,
    Learned = 3,
    Normalized = 4,
    Substring = 5,
    WordSet = 6,
    Fuzzy = 7,
}

impl Strategy {
    /// Full cascade in priority order
    pub const ALL: [Strategy; 7] = [
        Strategy::Exact,
        Strategy::Manual,
        Strategy::Learned,
        Strategy::Normalized,
        Strategy::Substring,
        Strategy::WordSet,
        Strategy::Fuzzy,
    ];

    pub fn priority(self) -> u8 {
        self as u8
    }

    /// Confidence assigned when this strategy accepts a candidate.
    ///
    /// Word-set and fuzzy scale this value by their raw score, see
    /// `strategy::confidence_for`.
    pub fn base_confidence(self) -> f64 {
        match self {
            Strategy::Exact => 1.00,
            Strategy::Manual => 0.95,
            Strategy::Learned => 0.90,
            Strategy::Normalized => 0.85,
            Strategy::Substring => 0.75,
            Strategy::WordSet => 0.70,
            Strategy::Fuzzy => 0.60,
        }
    }

    /// Whether the strategy answers from the knowledge store
    pub fn uses_knowledge_store(self) -> bool {
        matches!(self, Strategy::Manual | Strategy::Learned)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Exact => "exact",
            Strategy::Manual => "manual",
            Strategy::Learned => "learned",
            Strategy::Normalized => "normalized",
            Strategy::Substring => "substring",
            Strategy::WordSet => "word_set",
            Strategy::Fuzzy => "fuzzy",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .iter()
            .copied()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| format!("Unknown strategy: {}", s))
    }
}

/// Match context provides disambiguation for a lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchContext {
    /// League tag as supplied by the caller (e.g. "Premier League")
    pub league: Option<String>,
}

impl MatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_league(mut self, league: impl Into<String>) -> Self {
        let league = league.into();
        self.league = if league.trim().is_empty() {
            None
        } else {
            Some(league)
        };
        self
    }

    /// Canonical league key used for store lookups ("Premier League" -> "epl")
    pub fn league_key(&self) -> Option<String> {
        self.league.as_deref().map(league::canonical_league_key)
    }
}

/// Result of resolving one source name against a candidate set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub source_name: String,
    /// Winning candidate as supplied by the caller; None when unresolved
    pub matched_name: Option<String>,
    pub confidence: f64,
    pub strategy_used: Option<Strategy>,
    pub matched_from_knowledge_store: bool,
    /// Runner-up candidates of the winning strategy (at most 3)
    pub alternatives: Vec<String>,
    /// More than one candidate shared the top score
    pub ambiguous: bool,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl MatchResult {
    pub fn unresolved(source_name: &str) -> Self {
        Self {
            source_name: source_name.to_string(),
            matched_name: None,
            confidence: 0.0,
            strategy_used: None,
            matched_from_knowledge_store: false,
            alternatives: Vec::new(),
            ambiguous: false,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_match(&self) -> bool {
        self.matched_name.is_some()
    }

    /// Whether the match is usable at the caller's own threshold
    pub fn meets(&self, threshold: f64) -> bool {
        self.is_match() && self.confidence >= threshold
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
