mod batch;
mod config;

use crate::batch::{demo_requests, load_requests, run_batch};
use crate::config::Config;
use anyhow::{Context, Result};
use chrono::Utc;
use dotenv::dotenv;
use serde_json::json;
use std::fs;
use std::sync::Arc;
use teamlink_rust_core::store::FileKnowledgeStore;
use teamlink_rust_core::{
    KnowledgeStore, ManualMappings, PgKnowledgeStore, TeamResolver, TimeRange,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting Team Mapping Service...");

    // Config
    let config = Config::from_env()?;

    // Manual mappings
    let mut manual = ManualMappings::with_defaults();
    if let Err(e) = manual.merge_file(&config.manual_file) {
        warn!(
            "Could not load manual mappings file {}: {}",
            config.manual_file.display(),
            e
        );
    }

    // Knowledge store
    let store: Arc<dyn KnowledgeStore> = match &config.database_url {
        Some(url) => Arc::new(
            PgKnowledgeStore::connect(url, &config.pool, manual)
                .await
                .context("Failed to open PostgreSQL knowledge store")?,
        ),
        None => Arc::new(
            FileKnowledgeStore::open(&config.store_path, manual).with_context(|| {
                format!(
                    "Failed to open knowledge store at {}",
                    config.store_path.display()
                )
            })?,
        ),
    };
    info!("Using {} knowledge store", store.backend_name());

    let resolver = TeamResolver::new(store, config.resolver).with_write_backoff(config.write_backoff);

    // Requests
    let requests = match &config.batch_file {
        Some(path) => load_requests(path)?,
        None => {
            info!("MAPPING_BATCH_FILE not set, running demo cases");
            demo_requests()
        }
    };
    info!("Resolving {} requests", requests.len());

    let outcomes = run_batch(&resolver, &requests).await;

    // Report
    let summary = resolver
        .summarize(&TimeRange::last_days(config.report_days))
        .await
        .context("Failed to build mapping report")?;
    info!(
        "Success rate {:.1}% over {} attempts (avg confidence {:.3})",
        summary.overall_success_rate * 100.0,
        summary.total_attempts,
        summary.avg_confidence
    );

    let report = json!({
        "generated_at": Utc::now(),
        "report_days": config.report_days,
        "outcomes": outcomes,
        "summary": summary,
    });
    let rendered = serde_json::to_string_pretty(&report)?;

    if let Some(path) = &config.report_file {
        fs::write(path, &rendered)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Report saved to {}", path.display());
    }
    println!("{}", rendered);

    Ok(())
}
