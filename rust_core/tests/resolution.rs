//! Resolution Integration Tests
//!
//! End-to-end checks of the resolver against file-backed knowledge stores.
//! The PostgreSQL test needs DATABASE_URL and should be run with `cargo test --ignored`.

use std::sync::Arc;
use std::time::Duration;
use teamlink_rust_core::store::{PgStoreConfig, StoreCounts};
use teamlink_rust_core::{
    FileKnowledgeStore, KnowledgeStore, ManualMappings, MatchContext, PgKnowledgeStore,
    ResolverConfig, Strategy, TeamResolver, TimeRange,
};
use tempfile::tempdir;

fn resolver_for(store: Arc<dyn KnowledgeStore>) -> TeamResolver {
    TeamResolver::new(store, ResolverConfig::default()).with_write_backoff(Duration::from_millis(1))
}

#[tokio::test]
async fn test_demo_cases() {
    let store = Arc::new(FileKnowledgeStore::in_memory(ManualMappings::with_defaults()));
    let resolver = resolver_for(store);

    let cases: [(&str, &[&str], Option<&str>); 4] = [
        (
            "Manchester United",
            &["Manchester Utd", "Manchester City", "Liverpool"],
            Some("Manchester Utd"),
        ),
        (
            "FC Barcelona",
            &["Barcelona", "Real Madrid", "Atletico Madrid"],
            Some("Barcelona"),
        ),
        (
            "Borussia Monchengladbach",
            &["B. Monchengladbach", "Dortmund", "Schalke"],
            Some("B. Monchengladbach"),
        ),
        ("Unknown Team FC", &["Team A", "Team B", "Team C"], None),
    ];

    for (source, candidates, expected) in cases {
        let result = resolver.resolve(source, candidates, &MatchContext::new()).await;
        assert_eq!(result.matched_name.as_deref(), expected, "source: {}", source);
        if expected.is_some() {
            assert_eq!(result.strategy_used, Some(Strategy::Manual));
        } else {
            assert_eq!(result.confidence, 0.0);
            assert_eq!(result.alternatives.len(), 3);
        }
    }

    let summary = resolver.summarize(&TimeRange::all()).await.unwrap();
    assert_eq!(summary.total_attempts, 4);
    assert_eq!(summary.successful, 3);
    assert_eq!(summary.per_strategy[&Strategy::Manual].acceptances, 3);
    assert_eq!(summary.unresolved_samples.len(), 1);
    assert_eq!(summary.unresolved_samples[0].source, "Unknown Team FC");
}

#[tokio::test]
async fn test_learning_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("team_mappings.json");
    let context = MatchContext::new().with_league("Bundesliga");

    {
        let store = Arc::new(FileKnowledgeStore::open(&path, ManualMappings::new()).unwrap());
        let resolver = resolver_for(store);
        let first = resolver
            .resolve("Gladbach", &["B. Monchengladbach", "Dortmund"], &context)
            .await;
        assert_eq!(first.strategy_used, Some(Strategy::Substring));
        assert!(resolver.verify("Gladbach", "B. Monchengladbach", true, &context).await);
    }

    let store = Arc::new(FileKnowledgeStore::open(&path, ManualMappings::new()).unwrap());
    let resolver = resolver_for(store.clone());
    let second = resolver
        .resolve("Gladbach", &["Dortmund", "B. Monchengladbach"], &context)
        .await;
    assert_eq!(second.matched_name.as_deref(), Some("B. Monchengladbach"));
    assert_eq!(second.strategy_used, Some(Strategy::Learned));
    assert!((second.confidence - 0.90).abs() < 1e-9);

    let outcomes = store.outcomes(&TimeRange::all()).await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.league.as_deref() == Some("bundesliga")));
}

#[tokio::test]
async fn test_negative_feedback_stops_learned_match() {
    let store = Arc::new(FileKnowledgeStore::in_memory(ManualMappings::new()));
    let resolver = resolver_for(store.clone());
    let context = MatchContext::new();

    resolver.verify("Spurs", "Tottenham", true, &context).await;
    resolver.verify("Spurs", "Tottenham", false, &context).await;

    let result = resolver.resolve("Spurs", &["Tottenham", "Arsenal"], &context).await;
    assert_ne!(result.strategy_used, Some(Strategy::Learned));
    assert!(store.lookup_learned("Spurs").await.unwrap().is_none());

    let counts: StoreCounts = store.counts().await.unwrap();
    assert_eq!(counts.corrections, 1);
}

#[tokio::test]
async fn test_removed_manual_entry_stops_matching() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("team_mappings.json");
    let candidates = ["Tottenham", "Arsenal"];

    {
        let mut manual = ManualMappings::new();
        manual.insert("Spurs", "Arsenal", None);
        let store = Arc::new(FileKnowledgeStore::open(&path, manual).unwrap());
        let result = resolver_for(store)
            .resolve("Spurs", &candidates, &MatchContext::new())
            .await;
        assert_eq!(result.matched_name.as_deref(), Some("Arsenal"));
        assert_eq!(result.strategy_used, Some(Strategy::Manual));
    }

    let store = Arc::new(FileKnowledgeStore::open(&path, ManualMappings::new()).unwrap());
    let result = resolver_for(store)
        .resolve("Spurs", &candidates, &MatchContext::new())
        .await;
    assert_ne!(result.strategy_used, Some(Strategy::Manual));
    assert_ne!(result.matched_name.as_deref(), Some("Arsenal"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resolution_and_feedback() {
    let dir = tempdir().unwrap();
    let store = Arc::new(
        FileKnowledgeStore::open(dir.path().join("store.json"), ManualMappings::with_defaults())
            .unwrap(),
    );
    let resolver = resolver_for(store.clone());
    let candidates = vec![
        "Manchester Utd".to_string(),
        "Tottenham".to_string(),
        "Wolves".to_string(),
    ];

    let handles: Vec<_> = (0..24)
        .map(|i| {
            let resolver = resolver.clone();
            let candidates = candidates.clone();
            tokio::spawn(async move {
                let context = MatchContext::new().with_league("EPL");
                if i % 2 == 0 {
                    resolver.resolve("Spurs", &candidates, &context).await;
                } else {
                    resolver.verify("Spurs", "Tottenham", true, &context).await;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let learned = store.lookup_learned("Spurs").await.unwrap().unwrap();
    assert_eq!(learned.times_confirmed, 12);
    assert_eq!(store.counts().await.unwrap().outcomes, 12);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL (DATABASE_URL)
async fn test_postgres_learning_round_trip() {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        println!("DATABASE_URL not set, skipping");
        return;
    };

    let store = PgKnowledgeStore::connect(&url, &PgStoreConfig::default(), ManualMappings::new())
        .await
        .unwrap();
    let resolver = resolver_for(Arc::new(store.clone()));
    let context = MatchContext::new();
    let source = format!("Integration Rovers {}", unique_suffix());

    assert!(resolver.verify(&source, "Integration Town", true, &context).await);
    let result = resolver
        .resolve(&source, &["Integration Town", "Elsewhere"], &context)
        .await;
    assert_eq!(result.strategy_used, Some(Strategy::Learned));

    assert!(resolver.verify(&source, "Integration Town", false, &context).await);
    assert!(store.lookup_learned(&source).await.unwrap().is_none());

    let summary = resolver.summarize(&TimeRange::all()).await.unwrap();
    assert!(summary.total_attempts >= 1);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL (DATABASE_URL)
async fn test_postgres_manual_table_follows_configuration() {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        println!("DATABASE_URL not set, skipping");
        return;
    };

    let source = format!("Integration Spurs {}", unique_suffix());
    let mut manual = ManualMappings::new();
    manual.insert(&source, "Arsenal", None);
    let store = PgKnowledgeStore::connect(&url, &PgStoreConfig::default(), manual)
        .await
        .unwrap();
    assert_eq!(
        store.lookup_manual(&source, None).await.unwrap(),
        Some("Arsenal".to_string())
    );

    let reconnected = PgKnowledgeStore::connect(&url, &PgStoreConfig::default(), ManualMappings::new())
        .await
        .unwrap();
    assert_eq!(reconnected.lookup_manual(&source, None).await.unwrap(), None);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM manual_mappings WHERE source = $1")
        .bind(&source)
        .fetch_one(reconnected.pool())
        .await
        .unwrap();
    assert_eq!(rows, 0);
}

fn unique_suffix() -> String {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default().to_string()
}
