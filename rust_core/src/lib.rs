//! Teamlink Core - team-name entity resolution between data feeds.
//!
//! This module provides:
//! - Team name normalization (diacritics, punctuation, generic club tokens)
//! - A fixed-priority strategy cascade (exact, manual, learned, normalized,
//!   substring, word-set, fuzzy) with deterministic tie-breaking
//! - A knowledge store for curated and learned mappings (JSON file or PostgreSQL)
//! - Feedback-driven learning through explicit verification
//! - Mapping performance reports over the outcome log
//! - League configuration shared by both feeds

pub mod config;
pub mod league;
pub mod matching;
pub mod report;
pub mod store;

pub use config::ResolverConfig;
pub use matching::{
    FixtureMatch, GameMatch, MatchContext, MatchResult, OddsGame, Strategy, TeamResolver,
};
pub use report::{summarize, MappingSummary};
pub use store::{
    FileKnowledgeStore, KnowledgeStore, ManualMappings, PgKnowledgeStore, StoreError, TimeRange,
};
