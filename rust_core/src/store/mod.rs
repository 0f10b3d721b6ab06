//! Knowledge store for team mappings.
//!
//! This module provides:
//! - Curated manual mappings (authoritative, immutable for a run)
//! - Learned mappings promoted by explicit verification
//! - The append-only match outcome log used by reporting
//! - File (JSON snapshot) and PostgreSQL backends behind `KnowledgeStore`

use crate::matching::{MatchContext, MatchResult, Strategy};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod file;
pub mod manual;
pub mod postgres;
pub mod retry;

pub use file::FileKnowledgeStore;
pub use manual::ManualMappings;
pub use postgres::{PgKnowledgeStore, PgStoreConfig};

/// Confidence given to a pair on its first positive verification
pub const INITIAL_LEARNED_CONFIDENCE: f64 = 0.90;

/// Weight of the newest confirmation in the moving confidence estimate
pub const CONFIRMATION_WEIGHT: f64 = 0.3;

/// Confidence after one more positive confirmation.
///
/// Exponential moving value toward 1.0, so recent confirmations dominate.
pub fn reinforced_confidence(previous: f64) -> f64 {
    (previous * (1.0 - CONFIRMATION_WEIGHT) + CONFIRMATION_WEIGHT).min(1.0)
}

/// Knowledge store failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store data could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed
    pub fn is_retriable(&self) -> bool {
        match self {
            StoreError::Io(_) | StoreError::Unavailable(_) => true,
            StoreError::Serialization(_) => false,
            StoreError::Database(e) => is_transient_database_error(&e.to_string()),
        }
    }
}

/// Connection-level and contention errors are transient; constraint or
/// syntax errors are not.
fn is_transient_database_error(message: &str) -> bool {
    let err_str = message.to_lowercase();

    err_str.contains("connection")
        || err_str.contains("timeout")
        || err_str.contains("timed out")
        || err_str.contains("broken pipe")
        || err_str.contains("pool")
        || err_str.contains("could not serialize")
        || err_str.contains("deadlock detected")
        || err_str.contains("too many clients")
        || err_str.contains("server closed the connection")
        || err_str.contains("network error")
}

/// Curated mapping, never overwritten by learning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualMapping {
    pub source: String,
    pub target: String,
    /// Canonical league key; None applies to every league
    pub league: Option<String>,
}

/// Mapping promoted by explicit positive verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedMapping {
    pub source: String,
    pub target: String,
    pub confidence: f64,
    pub times_confirmed: u32,
    pub last_confirmed_at: DateTime<Utc>,
}

/// Append-only record of one resolve call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcomeRecord {
    pub id: Uuid,
    pub source: String,
    /// Matched candidate; None when unresolved
    pub candidate: Option<String>,
    pub strategy: Option<Strategy>,
    pub confidence: f64,
    pub resolved_at: DateTime<Utc>,
    /// Filled in by verification; None until then
    pub was_correct: Option<bool>,
    pub league: Option<String>,
    #[serde(default)]
    pub ambiguous: bool,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl MatchOutcomeRecord {
    pub fn from_result(result: &MatchResult, context: &MatchContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: result.source_name.clone(),
            candidate: result.matched_name.clone(),
            strategy: result.strategy_used,
            confidence: result.confidence,
            resolved_at: Utc::now(),
            was_correct: None,
            league: context.league_key(),
            ambiguous: result.ambiguous,
            alternatives: result.alternatives.clone(),
            elapsed_ms: result.elapsed.as_millis() as u64,
        }
    }

    pub fn is_success(&self) -> bool {
        self.candidate.is_some()
    }
}

/// Log entry written when a negative verification purges a pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub source: String,
    pub target: String,
    pub league: Option<String>,
    pub corrected_at: DateTime<Utc>,
}

/// Inclusive time window over the outcome log. A missing bound is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Everything ever recorded
    pub fn all() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// The last `days` days up to now
    pub fn last_days(days: i64) -> Self {
        let end = Utc::now();
        Self::new(end - Duration::days(days.max(0)), end)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at <= end)
    }
}

/// Row counts per logical table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub manual_mappings: usize,
    pub learned_mappings: usize,
    pub corrections: usize,
    pub outcomes: usize,
}

/// Durable record of manual, learned and historical mapping decisions.
///
/// Reads may run concurrently. Each backend serializes its own writes, so
/// concurrent `confirm` calls never lose a `times_confirmed` increment.
/// League arguments are canonical league keys (`MatchContext::league_key`).
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Curated target for `name`, league-specific entry first
    async fn lookup_manual(
        &self,
        name: &str,
        league: Option<&str>,
    ) -> Result<Option<String>, StoreError>;

    /// Best learned mapping for `name` (confidence, then confirmations, then recency)
    async fn lookup_learned(&self, name: &str) -> Result<Option<LearnedMapping>, StoreError>;

    /// Append one outcome row
    async fn record_outcome(&self, record: &MatchOutcomeRecord) -> Result<(), StoreError>;

    /// Promote (`is_correct`) or purge (`!is_correct`) a learned pair
    async fn confirm(
        &self,
        source: &str,
        target: &str,
        is_correct: bool,
        league: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Set `was_correct` on the most recent outcome for the pair.
    /// Returns false when no such outcome exists.
    async fn mark_outcome(
        &self,
        source: &str,
        candidate: &str,
        was_correct: bool,
    ) -> Result<bool, StoreError>;

    /// Outcomes recorded inside `range`, oldest first
    async fn outcomes(&self, range: &TimeRange) -> Result<Vec<MatchOutcomeRecord>, StoreError>;

    async fn counts(&self) -> Result<StoreCounts, StoreError>;

    /// Backend name for logging
    fn backend_name(&self) -> &str;
}
