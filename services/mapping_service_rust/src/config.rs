use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use teamlink_rust_core::store::PgStoreConfig;
use teamlink_rust_core::ResolverConfig;

#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL store when set, file store otherwise
    pub database_url: Option<String>,
    pub store_path: PathBuf,
    pub manual_file: PathBuf,
    pub batch_file: Option<PathBuf>,
    pub report_file: Option<PathBuf>,
    pub report_days: i64,
    pub write_backoff: Duration,
    pub resolver: ResolverConfig,
    pub pool: PgStoreConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let store_path = env::var("MAPPING_STORE_PATH")
            .unwrap_or_else(|_| "data/team_mappings.json".to_string())
            .into();
        let manual_file = env::var("MAPPING_MANUAL_FILE")
            .unwrap_or_else(|_| "data/manual_team_mappings.json".to_string())
            .into();
        let batch_file = optional_path_env("MAPPING_BATCH_FILE");
        let report_file = optional_path_env("MAPPING_REPORT_FILE");

        let report_days = parse_env("MAPPING_REPORT_DAYS", 7).context("MAPPING_REPORT_DAYS")?;
        let write_backoff_ms =
            parse_env("MAPPING_WRITE_BACKOFF_MS", 100).context("MAPPING_WRITE_BACKOFF_MS")?;

        Ok(Self {
            database_url,
            store_path,
            manual_file,
            batch_file,
            report_file,
            report_days,
            write_backoff: Duration::from_millis(write_backoff_ms),
            resolver: ResolverConfig::from_env(),
            pool: PgStoreConfig::from_env(),
        })
    }
}

fn optional_path_env(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {}", key, v)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_defaults_and_errors() {
        env::remove_var("TEAM_MAPPER_TEST_DAYS");
        assert_eq!(parse_env("TEAM_MAPPER_TEST_DAYS", 7i64).unwrap(), 7);

        env::set_var("TEAM_MAPPER_TEST_DAYS", " 30 ");
        assert_eq!(parse_env("TEAM_MAPPER_TEST_DAYS", 7i64).unwrap(), 30);

        env::set_var("TEAM_MAPPER_TEST_DAYS", "a week");
        assert!(parse_env("TEAM_MAPPER_TEST_DAYS", 7i64).is_err());
        env::remove_var("TEAM_MAPPER_TEST_DAYS");
    }

    #[test]
    fn test_optional_path_env() {
        env::set_var("TEAM_MAPPER_TEST_PATH", "  ");
        assert!(optional_path_env("TEAM_MAPPER_TEST_PATH").is_none());
        env::set_var("TEAM_MAPPER_TEST_PATH", "batch.json");
        assert_eq!(
            optional_path_env("TEAM_MAPPER_TEST_PATH"),
            Some(PathBuf::from("batch.json"))
        );
        env::remove_var("TEAM_MAPPER_TEST_PATH");
    }
}
