//! Curated team name mappings.
//!
//! Entries are keyed by `"league:source"` using the canonical league key and
//! the source's surface key. League-less entries live under `*` and apply to
//! every league. Lookups are forward-only: source name -> odds feed name.

use super::{ManualMapping, StoreError};
use crate::league::canonical_league_key;
use crate::matching::normalize::surface_key;
use rustc_hash::FxHashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// League slot for mappings that apply everywhere
const ANY_LEAGUE: &str = "*";

/// Built-in fixtures feed -> odds feed names.
/// Identity pairs are left out; the exact strategy already covers them.
const DEFAULT_MAPPINGS: &[(&str, &str)] = &[
    // Premier League
    ("Manchester United", "Manchester Utd"),
    ("Tottenham Hotspur", "Tottenham"),
    ("West Ham United", "West Ham"),
    ("Newcastle United", "Newcastle"),
    ("Brighton & Hove Albion", "Brighton"),
    ("Wolverhampton Wanderers", "Wolves"),
    ("Sheffield United", "Sheffield Utd"),
    ("Leicester City", "Leicester"),
    ("Nottingham Forest", "Nottm Forest"),
    // La Liga
    ("FC Barcelona", "Barcelona"),
    ("Atletico Madrid", "Atl Madrid"),
    ("Athletic Club", "Athletic Bilbao"),
    ("Villarreal CF", "Villarreal"),
    ("Valencia CF", "Valencia"),
    ("Sevilla FC", "Sevilla"),
    ("Real Mallorca", "Mallorca"),
    ("Deportivo Alaves", "Deportivo Alavés"),
    ("Cadiz CF", "Cádiz"),
    // Bundesliga
    ("Borussia Dortmund", "Dortmund"),
    ("Eintracht Frankfurt", "E. Frankfurt"),
    ("Borussia Monchengladbach", "B. Monchengladbach"),
    ("VfB Stuttgart", "Stuttgart"),
    ("SC Freiburg", "Freiburg"),
    ("TSG Hoffenheim", "Hoffenheim"),
    ("1. FC Koln", "FC Köln"),
    ("Hertha Berlin", "Hertha"),
    ("VfL Wolfsburg", "Wolfsburg"),
    // Serie A
    ("Inter", "Inter Milan"),
    ("SSC Napoli", "Napoli"),
    // Ligue 1
    ("Paris Saint Germain", "PSG"),
    ("Olympique Marseille", "Marseille"),
    ("Olympique Lyonnais", "Lyon"),
    ("AS Monaco", "Monaco"),
    ("OGC Nice", "Nice"),
    ("RC Strasbourg Alsace", "Strasbourg"),
];

/// Manual mapping table.
#[derive(Debug, Clone, Default)]
pub struct ManualMappings {
    /// "league:source_key" -> mapping
    entries: FxHashMap<String, ManualMapping>,
}

impl ManualMappings {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table seeded with the built-in curated pairs.
    pub fn with_defaults() -> Self {
        let mut mappings = Self::new();
        for (source, target) in DEFAULT_MAPPINGS {
            mappings.insert(source, target, None);
        }
        mappings
    }

    fn key(source: &str, league: Option<&str>) -> String {
        let league = league
            .map(canonical_league_key)
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| ANY_LEAGUE.to_string());
        format!("{}:{}", league, surface_key(source))
    }

    /// Insert a mapping. A later insert for the same key replaces the earlier one.
    pub fn insert(&mut self, source: &str, target: &str, league: Option<&str>) {
        if surface_key(source).is_empty() || surface_key(target).is_empty() {
            return;
        }
        let key = Self::key(source, league);
        let league = league
            .map(canonical_league_key)
            .filter(|l| !l.is_empty());
        self.entries.insert(
            key,
            ManualMapping {
                source: source.trim().to_string(),
                target: target.trim().to_string(),
                league,
            },
        );
    }

    /// Target for `source`; the league-specific entry wins over the global one.
    pub fn lookup(&self, source: &str, league: Option<&str>) -> Option<&str> {
        if league.is_some() {
            if let Some(mapping) = self.entries.get(&Self::key(source, league)) {
                return Some(mapping.target.as_str());
            }
        }
        self.entries
            .get(&Self::key(source, None))
            .map(|m| m.target.as_str())
    }

    /// Merge mappings from a JSON file.
    ///
    /// Two layouts are accepted and may be mixed:
    /// `{ "source": "target" }` for global entries and
    /// `{ "league": { "source": "target" } }` for league-scoped ones.
    /// A missing file merges nothing. Returns the number of entries read.
    pub fn merge_file(&mut self, path: &Path) -> Result<usize, StoreError> {
        if !path.exists() {
            warn!("Manual mappings file {} not found", path.display());
            return Ok(0);
        }

        let content = fs::read_to_string(path)?;
        let data: FxHashMap<String, serde_json::Value> = serde_json::from_str(&content)?;

        let mut loaded = 0;
        for (key, value) in data {
            match value {
                serde_json::Value::String(target) => {
                    self.insert(&key, &target, None);
                    loaded += 1;
                }
                serde_json::Value::Object(pairs) => {
                    for (source, target) in pairs {
                        if let Some(target) = target.as_str() {
                            self.insert(&source, target, Some(&key));
                            loaded += 1;
                        }
                    }
                }
                other => warn!("Skipping manual mapping {}: unsupported value {}", key, other),
            }
        }

        info!("Loaded {} manual mappings from {}", loaded, path.display());
        Ok(loaded)
    }

    /// All entries, ordered by league then source.
    pub fn entries(&self) -> Vec<ManualMapping> {
        let mut entries: Vec<ManualMapping> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.league
                .cmp(&b.league)
                .then_with(|| surface_key(&a.source).cmp(&surface_key(&b.source)))
        });
        entries
    }

    /// Get number of mappings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Leagues with at least one scoped mapping.
    pub fn leagues(&self) -> Vec<String> {
        let mut leagues: Vec<String> = self
            .entries
            .values()
            .filter_map(|m| m.league.clone())
            .collect();
        leagues.sort();
        leagues.dedup();
        leagues
    }
}

impl FromIterator<ManualMapping> for ManualMappings {
    fn from_iter<I: IntoIterator<Item = ManualMapping>>(iter: I) -> Self {
        let mut mappings = Self::new();
        for m in iter {
            mappings.insert(&m.source, &m.target, m.league.as_deref());
        }
        mappings
    }
}

// ============================================================================
// Tests
// ============================================================================
