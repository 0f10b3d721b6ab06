//! Resolver tunables.

use std::env;

/// Default minimum stored confidence for a learned mapping to be used
pub const DEFAULT_ACCEPTANCE_THRESHOLD: f64 = 0.7;

/// Default minimum edit-distance similarity for the fuzzy strategy
pub const DEFAULT_FUZZY_FLOOR: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverConfig {
    /// Learned mappings below this stored confidence are ignored
    pub acceptance_threshold: f64,
    /// Fuzzy candidates below this similarity are rejected
    pub fuzzy_floor: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: DEFAULT_ACCEPTANCE_THRESHOLD,
            fuzzy_floor: DEFAULT_FUZZY_FLOOR,
        }
    }
}

impl ResolverConfig {
    /// Load from MAPPING_ACCEPTANCE_THRESHOLD and MAPPING_FUZZY_FLOOR.
    /// Unparseable values fall back to defaults; values are clamped to [0, 1].
    pub fn from_env() -> Self {
        Self::default()
            .with_acceptance_threshold(parse_f64_env(
                "MAPPING_ACCEPTANCE_THRESHOLD",
                DEFAULT_ACCEPTANCE_THRESHOLD,
            ))
            .with_fuzzy_floor(parse_f64_env("MAPPING_FUZZY_FLOOR", DEFAULT_FUZZY_FLOOR))
    }

    pub fn with_acceptance_threshold(mut self, threshold: f64) -> Self {
        self.acceptance_threshold = clamp_unit(threshold, DEFAULT_ACCEPTANCE_THRESHOLD);
        self
    }

    pub fn with_fuzzy_floor(mut self, floor: f64) -> Self {
        self.fuzzy_floor = clamp_unit(floor, DEFAULT_FUZZY_FLOOR);
        self
    }
}

fn clamp_unit(value: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn parse_f64_env(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
