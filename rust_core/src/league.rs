//! League configuration for supported competitions.
//!
//! This module provides:
//! - Static configuration for the leagues both feeds cover
//! - Canonical league keys, so the fixtures feed's display name
//!   ("Premier League"), short codes ("EPL") and the odds feed's sport key
//!   ("soccer_epl") resolve to the same mapping context

use crate::matching::normalize::surface_key;

/// Configuration for a single league.
#[derive(Debug, Clone)]
pub struct LeagueConfig {
    /// Canonical league code (e.g., "epl", "laliga")
    pub league_code: &'static str,
    /// League name as the fixtures feed reports it
    pub display_name: &'static str,
    /// Sport key used by the odds feed
    pub odds_sport_key: &'static str,
    /// Other spellings seen in either feed
    pub aliases: &'static [&'static str],
}

/// Static configuration for all supported leagues.
pub static LEAGUE_CONFIGS: &[LeagueConfig] = &[
    // England
    LeagueConfig {
        league_code: "epl",
        display_name: "Premier League",
        odds_sport_key: "soccer_epl",
        aliases: &["english premier league", "premiership"],
    },
    LeagueConfig {
        league_code: "championship",
        display_name: "Championship",
        odds_sport_key: "soccer_efl_champ",
        aliases: &["efl championship"],
    },
    // Spain
    LeagueConfig {
        league_code: "laliga",
        display_name: "La Liga",
        odds_sport_key: "soccer_spain_la_liga",
        aliases: &["primera division", "laliga ea sports"],
    },
    // Germany
    LeagueConfig {
        league_code: "bundesliga",
        display_name: "Bundesliga",
        odds_sport_key: "soccer_germany_bundesliga",
        aliases: &["1. bundesliga"],
    },
    // Italy
    LeagueConfig {
        league_code: "seriea",
        display_name: "Serie A",
        odds_sport_key: "soccer_italy_serie_a",
        aliases: &["serie a tim"],
    },
    // France
    LeagueConfig {
        league_code: "ligue1",
        display_name: "Ligue 1",
        odds_sport_key: "soccer_france_ligue_one",
        aliases: &["ligue one"],
    },
    // Europe
    LeagueConfig {
        league_code: "ucl",
        display_name: "Champions League",
        odds_sport_key: "soccer_uefa_champs_league",
        aliases: &["uefa champions league"],
    },
    LeagueConfig {
        league_code: "uel",
        display_name: "Europa League",
        odds_sport_key: "soccer_uefa_europa_league",
        aliases: &["uefa europa league"],
    },
    LeagueConfig {
        league_code: "eredivisie",
        display_name: "Eredivisie",
        odds_sport_key: "soccer_netherlands_eredivisie",
        aliases: &[],
    },
    LeagueConfig {
        league_code: "primeira",
        display_name: "Primeira Liga",
        odds_sport_key: "soccer_portugal_primeira_liga",
        aliases: &["liga portugal"],
    },
    // Americas
    LeagueConfig {
        league_code: "libertadores",
        display_name: "Copa Libertadores",
        odds_sport_key: "soccer_conmebol_copa_libertadores",
        aliases: &[],
    },
    LeagueConfig {
        league_code: "brasileirao",
        display_name: "Brasileirão Serie A",
        odds_sport_key: "soccer_brazil_campeonato",
        aliases: &["brasileirao serie a", "brasileirao"],
    },
    LeagueConfig {
        league_code: "argentina",
        display_name: "Liga Profesional Argentina",
        odds_sport_key: "soccer_argentina_primera_division",
        aliases: &[],
    },
    LeagueConfig {
        league_code: "mls",
        display_name: "MLS",
        odds_sport_key: "soccer_usa_mls",
        aliases: &["major league soccer"],
    },
    LeagueConfig {
        league_code: "ligamx",
        display_name: "Liga MX",
        odds_sport_key: "soccer_mexico_ligamx",
        aliases: &[],
    },
];

/// Get league configuration by code, display name, odds sport key or alias.
pub fn get_league_config(league: &str) -> Option<&'static LeagueConfig> {
    let key = surface_key(league);
    if key.is_empty() {
        return None;
    }
    LEAGUE_CONFIGS.iter().find(|c| {
        c.league_code == key
            || surface_key(c.display_name) == key
            || c.odds_sport_key == key
            || c.aliases.iter().any(|a| *a == key)
    })
}

/// Get all league configurations.
pub fn get_all_league_configs() -> &'static [LeagueConfig] {
    LEAGUE_CONFIGS
}

/// Get list of all league codes.
pub fn get_all_league_codes() -> Vec<&'static str> {
    LEAGUE_CONFIGS.iter().map(|c| c.league_code).collect()
}

/// Canonical key for a league tag.
///
/// Known leagues collapse to their code; unknown tags fall back to their
/// surface key so that arbitrary caller contexts still compare consistently.
pub fn canonical_league_key(league: &str) -> String {
    get_league_config(league)
        .map(|c| c.league_code.to_string())
        .unwrap_or_else(|| surface_key(league))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_league_config() {
        let epl = get_league_config("epl").unwrap();
        assert_eq!(epl.league_code, "epl");
        assert_eq!(epl.odds_sport_key, "soccer_epl");
    }

    #[test]
    fn test_lookup_by_any_spelling() {
        assert_eq!(get_league_config("Premier League").unwrap().league_code, "epl");
        assert_eq!(get_league_config("EPL").unwrap().league_code, "epl");
        assert_eq!(get_league_config("soccer_epl").unwrap().league_code, "epl");
        assert_eq!(
            get_league_config("Brasileirão Serie A").unwrap().league_code,
            "brasileirao"
        );
        assert_eq!(get_league_config("  la   liga ").unwrap().league_code, "laliga");
    }

    #[test]
    fn test_missing_league() {
        assert!(get_league_config("nonexistent").is_none());
        assert!(get_league_config("").is_none());
    }

    #[test]
    fn test_canonical_key_falls_back_to_surface() {
        assert_eq!(canonical_league_key("Serie A"), "seriea");
        assert_eq!(canonical_league_key("Test  League"), "test league");
    }

    #[test]
    fn test_codes_are_unique() {
        let mut codes = get_all_league_codes();
        let total = codes.len();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), total);
        assert_eq!(get_all_league_configs().len(), total);
    }
}
