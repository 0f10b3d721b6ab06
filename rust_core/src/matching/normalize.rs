//! Team name canonicalization.
//!
//! Two forms are produced:
//! - `surface_key`: trimmed, whitespace-collapsed, lowercased. Used for raw
//!   comparisons and as the knowledge store key.
//! - `normalize`: full canonical form (diacritics folded, punctuation
//!   stripped, generic club tokens removed). Used by the heuristic strategies.

use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Tokens that carry no identity on their own ("FC Barcelona" vs "Barcelona").
pub const GENERIC_TOKENS: &[&str] = &["fc", "cf", "afc", "sc", "ac", "asc", "club", "united"];

/// Check if a token is one of the generic club tokens
pub fn is_generic_token(token: &str) -> bool {
    GENERIC_TOKENS.contains(&token)
}

/// Lowercase, trim and collapse whitespace. Nothing else is rewritten.
pub fn surface_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalize a team name for comparison.
///
/// Steps, in order: lowercase, diacritic folding, `&` -> `and`, punctuation
/// to spaces, whitespace collapsing, generic token removal. Generic tokens are
/// kept when removing them would leave nothing ("FC United" stays as is).
///
/// Idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(name: &str) -> String {
    let folded: String = name
        .to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();

    let mut cleaned = String::with_capacity(folded.len());
    for c in folded.chars() {
        if c == '&' {
            cleaned.push_str(" and ");
        } else if c.is_alphanumeric() {
            cleaned.push(c);
        } else {
            cleaned.push(' ');
        }
    }

    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let significant: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !is_generic_token(w))
        .collect();

    if significant.is_empty() {
        words.join(" ")
    } else {
        significant.join(" ")
    }
}

/// Word set of the normalized name
pub fn tokens(normalized: &str) -> HashSet<&str> {
    normalized.split_whitespace().collect()
}
