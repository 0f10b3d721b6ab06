//! PostgreSQL knowledge store.
//!
//! Tables: manual_mappings, learned_mappings, match_outcomes,
//! mapping_corrections. The schema is created on connect if missing.
//! Learned-pair reinforcement happens in a single upsert, so concurrent
//! confirmations serialize on the row lock.

use super::{
    KnowledgeStore, LearnedMapping, ManualMappings, MatchOutcomeRecord, StoreCounts, StoreError,
    TimeRange, CONFIRMATION_WEIGHT, INITIAL_LEARNED_CONFIDENCE,
};
use crate::matching::normalize::surface_key;
use crate::matching::Strategy;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Pool configuration for the knowledge store
#[derive(Clone, Debug)]
pub struct PgStoreConfig {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections to maintain
    pub min_connections: u32,
    /// Connection timeout
    pub acquire_timeout: Duration,
    /// Maximum idle time before a connection is closed
    pub idle_timeout: Duration,
    /// Maximum lifetime of a connection
    pub max_lifetime: Duration,
}

impl Default for PgStoreConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),  // 5 minutes
            max_lifetime: Duration::from_secs(1800), // 30 minutes
        }
    }
}

impl PgStoreConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_connections: std::env::var("MAPPING_DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            min_connections: std::env::var("MAPPING_DB_MIN_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.min_connections),
            acquire_timeout: std::env::var("MAPPING_DB_ACQUIRE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.acquire_timeout),
            ..defaults
        }
    }
}

const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS manual_mappings (
        source TEXT NOT NULL,
        source_key TEXT NOT NULL,
        target TEXT NOT NULL,
        league TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (source_key, league)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS learned_mappings (
        source TEXT NOT NULL,
        source_key TEXT NOT NULL,
        target TEXT NOT NULL,
        target_key TEXT NOT NULL,
        confidence DOUBLE PRECISION NOT NULL,
        times_confirmed INTEGER NOT NULL DEFAULT 1,
        last_confirmed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (source_key, target_key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS match_outcomes (
        id UUID PRIMARY KEY,
        source TEXT NOT NULL,
        source_key TEXT NOT NULL,
        candidate TEXT,
        candidate_key TEXT,
        strategy TEXT,
        confidence DOUBLE PRECISION NOT NULL,
        resolved_at TIMESTAMPTZ NOT NULL,
        was_correct BOOLEAN,
        league TEXT,
        ambiguous BOOLEAN NOT NULL DEFAULT FALSE,
        alternatives TEXT[] NOT NULL DEFAULT '{}',
        elapsed_ms BIGINT NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_match_outcomes_resolved_at ON match_outcomes (resolved_at)",
    "CREATE INDEX IF NOT EXISTS idx_match_outcomes_pair ON match_outcomes (source_key, candidate_key, resolved_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS mapping_corrections (
        id BIGSERIAL PRIMARY KEY,
        source TEXT NOT NULL,
        target TEXT NOT NULL,
        league TEXT,
        corrected_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
];

const UPSERT_MANUAL_SQL: &str = r#"
    INSERT INTO manual_mappings (source, source_key, target, league)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (source_key, league) DO UPDATE SET
        source = EXCLUDED.source,
        target = EXCLUDED.target
"#;

const CLEAR_MANUAL_SQL: &str = "DELETE FROM manual_mappings";

const CONFIRM_SQL: &str = r#"
    INSERT INTO learned_mappings
        (source, source_key, target, target_key, confidence, times_confirmed, last_confirmed_at)
    VALUES ($1, $2, $3, $4, $5, 1, NOW())
    ON CONFLICT (source_key, target_key) DO UPDATE SET
        target = EXCLUDED.target,
        times_confirmed = learned_mappings.times_confirmed + 1,
        confidence = LEAST(1.0, learned_mappings.confidence * (1.0 - $6::DOUBLE PRECISION) + $6::DOUBLE PRECISION),
        last_confirmed_at = NOW()
"#;

const LOOKUP_LEARNED_SQL: &str = r#"
    SELECT source, target, confidence, times_confirmed, last_confirmed_at
    FROM learned_mappings
    WHERE source_key = $1
    ORDER BY confidence DESC, times_confirmed DESC, last_confirmed_at DESC
    LIMIT 1
"#;

const MARK_OUTCOME_SQL: &str = r#"
    UPDATE match_outcomes SET was_correct = $3
    WHERE id = (
        SELECT id FROM match_outcomes
        WHERE source_key = $1 AND candidate_key = $2
        ORDER BY resolved_at DESC
        LIMIT 1
    )
"#;

const OUTCOMES_IN_RANGE_SQL: &str = r#"
    SELECT id, source, candidate, strategy, confidence, resolved_at, was_correct,
           league, ambiguous, alternatives, elapsed_ms
    FROM match_outcomes
    WHERE ($1::TIMESTAMPTZ IS NULL OR resolved_at >= $1)
      AND ($2::TIMESTAMPTZ IS NULL OR resolved_at <= $2)
    ORDER BY resolved_at
"#;

/// Knowledge store backed by PostgreSQL.
///
/// Manual mappings come from configuration only. The `manual_mappings` table
/// mirrors the configured set and is replaced on connect.
#[derive(Debug, Clone)]
pub struct PgKnowledgeStore {
    pool: PgPool,
    manual: ManualMappings,
}

impl PgKnowledgeStore {
    /// Connect, create the schema and sync manual mappings.
    pub async fn connect(
        database_url: &str,
        config: &PgStoreConfig,
        manual: ManualMappings,
    ) -> Result<Self> {
        info!(
            "Creating knowledge store pool: max={}, min={}, acquire_timeout={:?}",
            config.max_connections, config.min_connections, config.acquire_timeout
        );

        let connect_opts =
            PgConnectOptions::from_str(database_url).context("Failed to parse database URL")?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .max_lifetime(config.max_lifetime)
            .idle_timeout(config.idle_timeout)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(connect_opts)
            .await
            .context("Failed to create knowledge store pool")?;

        Self::from_pool(pool, manual).await
    }

    /// Use an existing pool. The manual table is replaced by `manual` in one
    /// transaction, so entries dropped from configuration stop matching.
    pub async fn from_pool(pool: PgPool, manual: ManualMappings) -> Result<Self> {
        ensure_schema(&pool)
            .await
            .context("Failed to create knowledge store schema")?;

        replace_manual(&pool, &manual)
            .await
            .context("Failed to sync manual mappings")?;

        info!("Knowledge store ready ({} manual mappings)", manual.len());
        Ok(Self { pool, manual })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

async fn replace_manual(pool: &PgPool, manual: &ManualMappings) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    sqlx::query(CLEAR_MANUAL_SQL).execute(&mut *tx).await?;
    for m in manual.entries() {
        sqlx::query(UPSERT_MANUAL_SQL)
            .bind(&m.source)
            .bind(surface_key(&m.source))
            .bind(&m.target)
            .bind(m.league.as_deref().unwrap_or(""))
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

fn outcome_from_row(row: &PgRow) -> Result<MatchOutcomeRecord, StoreError> {
    let strategy: Option<String> = row.try_get("strategy")?;
    let strategy = strategy.and_then(|s| match Strategy::from_str(&s) {
        Ok(strategy) => Some(strategy),
        Err(e) => {
            warn!("Ignoring stored outcome strategy: {}", e);
            None
        }
    });
    let elapsed_ms: i64 = row.try_get("elapsed_ms")?;

    Ok(MatchOutcomeRecord {
        id: row.try_get("id")?,
        source: row.try_get("source")?,
        candidate: row.try_get("candidate")?,
        strategy,
        confidence: row.try_get("confidence")?,
        resolved_at: row.try_get("resolved_at")?,
        was_correct: row.try_get("was_correct")?,
        league: row.try_get("league")?,
        ambiguous: row.try_get("ambiguous")?,
        alternatives: row.try_get("alternatives")?,
        elapsed_ms: elapsed_ms.max(0) as u64,
    })
}

#[async_trait]
impl KnowledgeStore for PgKnowledgeStore {
    async fn lookup_manual(
        &self,
        name: &str,
        league: Option<&str>,
    ) -> Result<Option<String>, StoreError> {
        Ok(self.manual.lookup(name, league).map(str::to_string))
    }

    async fn lookup_learned(&self, name: &str) -> Result<Option<LearnedMapping>, StoreError> {
        let row = sqlx::query(LOOKUP_LEARNED_SQL)
            .bind(surface_key(name))
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let times_confirmed: i32 = row.try_get("times_confirmed")?;
        let last_confirmed_at: DateTime<Utc> = row.try_get("last_confirmed_at")?;
        Ok(Some(LearnedMapping {
            source: row.try_get("source")?,
            target: row.try_get("target")?,
            confidence: row.try_get("confidence")?,
            times_confirmed: times_confirmed.max(0) as u32,
            last_confirmed_at,
        }))
    }

    async fn record_outcome(&self, record: &MatchOutcomeRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO match_outcomes
                (id, source, source_key, candidate, candidate_key, strategy, confidence,
                 resolved_at, was_correct, league, ambiguous, alternatives, elapsed_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(&record.source)
        .bind(surface_key(&record.source))
        .bind(&record.candidate)
        .bind(record.candidate.as_deref().map(surface_key))
        .bind(record.strategy.map(|s| s.as_str()))
        .bind(record.confidence)
        .bind(record.resolved_at)
        .bind(record.was_correct)
        .bind(&record.league)
        .bind(record.ambiguous)
        .bind(&record.alternatives)
        .bind(record.elapsed_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn confirm(
        &self,
        source: &str,
        target: &str,
        is_correct: bool,
        league: Option<&str>,
    ) -> Result<(), StoreError> {
        let source_key = surface_key(source);
        let target_key = surface_key(target);

        if is_correct {
            sqlx::query(CONFIRM_SQL)
                .bind(source.trim())
                .bind(&source_key)
                .bind(target.trim())
                .bind(&target_key)
                .bind(INITIAL_LEARNED_CONFIDENCE)
                .bind(CONFIRMATION_WEIGHT)
                .execute(&self.pool)
                .await?;
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM learned_mappings WHERE source_key = $1 AND target_key = $2")
            .bind(&source_key)
            .bind(&target_key)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO mapping_corrections (source, target, league) VALUES ($1, $2, $3)")
            .bind(source.trim())
            .bind(target.trim())
            .bind(league)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn mark_outcome(
        &self,
        source: &str,
        candidate: &str,
        was_correct: bool,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(MARK_OUTCOME_SQL)
            .bind(surface_key(source))
            .bind(surface_key(candidate))
            .bind(was_correct)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn outcomes(&self, range: &TimeRange) -> Result<Vec<MatchOutcomeRecord>, StoreError> {
        let rows = sqlx::query(OUTCOMES_IN_RANGE_SQL)
            .bind(range.start)
            .bind(range.end)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(outcome_from_row).collect()
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM learned_mappings) AS learned,
                (SELECT COUNT(*) FROM mapping_corrections) AS corrections,
                (SELECT COUNT(*) FROM match_outcomes) AS outcomes
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let learned: i64 = row.try_get("learned")?;
        let corrections: i64 = row.try_get("corrections")?;
        let outcomes: i64 = row.try_get("outcomes")?;
        Ok(StoreCounts {
            manual_mappings: self.manual.len(),
            learned_mappings: learned.max(0) as usize,
            corrections: corrections.max(0) as usize,
            outcomes: outcomes.max(0) as usize,
        })
    }

    fn backend_name(&self) -> &str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PgStoreConfig::default();
        assert!(config.max_connections > 0);
        assert!(config.min_connections <= config.max_connections);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_schema_creates_every_table() {
        let schema = SCHEMA_STATEMENTS.join("\n");
        for table in [
            "manual_mappings",
            "learned_mappings",
            "match_outcomes",
            "mapping_corrections",
        ] {
            assert!(
                schema.contains(&format!("CREATE TABLE IF NOT EXISTS {}", table)),
                "missing table {}",
                table
            );
        }
    }

    #[test]
    fn test_confirm_upsert_increments_in_place() {
        assert!(CONFIRM_SQL.contains("ON CONFLICT (source_key, target_key)"));
        assert!(CONFIRM_SQL.contains("times_confirmed = learned_mappings.times_confirmed + 1"));
        assert!(CONFIRM_SQL.contains("LEAST(1.0"));
    }

    #[test]
    fn test_lookup_orders_by_confidence_then_confirmations() {
        let confidence = LOOKUP_LEARNED_SQL.find("confidence DESC").unwrap();
        let confirmed = LOOKUP_LEARNED_SQL.find("times_confirmed DESC").unwrap();
        let recency = LOOKUP_LEARNED_SQL.find("last_confirmed_at DESC").unwrap();
        assert!(confidence < confirmed && confirmed < recency);
    }

    #[test]
    fn test_manual_sync_clears_table_first() {
        assert_eq!(CLEAR_MANUAL_SQL, "DELETE FROM manual_mappings");
        assert!(UPSERT_MANUAL_SQL.contains("ON CONFLICT (source_key, league)"));
    }

    #[test]
    fn test_outcome_range_bounds_are_optional() {
        assert!(OUTCOMES_IN_RANGE_SQL.contains("$1::TIMESTAMPTZ IS NULL OR resolved_at >= $1"));
        assert!(OUTCOMES_IN_RANGE_SQL.contains("$2::TIMESTAMPTZ IS NULL OR resolved_at <= $2"));

        let all = TimeRange::all();
        assert!(all.start.is_none() && all.end.is_none());
    }
}
