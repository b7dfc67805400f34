//! Discography query mini-language
//!
//! ```text
//! [>…] [l:|a:|ar:] ["]text["]
//! ```
//!
//! Leading `>` characters raise the retrieve level, a short prefix selects
//! the entity kind, and surrounding quotes request exact matching.

use crate::error::{ExploreError, ExploreResult};
use crate::models::{EntityKind, Source};
use once_cell::sync::Lazy;
use regex::Regex;

/// Highest supported retrieve level
pub const MAX_RETRIEVE_LEVEL: u8 = 2;

static DISAMBIGUATION_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\s+\(\d+\))+$").expect("valid regex"));

/// Parsed discography query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    pub text: String,
    pub kind: EntityKind,
    pub exact: bool,
    pub level: u8,
}

/// Parse a raw discography query
pub fn parse_query(raw: &str) -> ExploreResult<ParsedQuery> {
    let trimmed = raw.trim();

    let sigils = trimmed.chars().take_while(|c| *c == '>').count();
    let level = sigils.min(MAX_RETRIEVE_LEVEL as usize) as u8;
    let mut rest = trimmed[sigils..].trim_start();

    let mut kind = EntityKind::Artist;
    let lower = rest.to_ascii_lowercase();
    for (prefix, prefix_kind) in [
        ("l:", EntityKind::Label),
        ("ar:", EntityKind::Artist),
        ("a:", EntityKind::Artist),
    ] {
        if lower.starts_with(prefix) {
            kind = prefix_kind;
            rest = rest[prefix.len()..].trim_start();
            break;
        }
    }

    let rest = rest.trim_end();
    let exact = rest.len() >= 2 && rest.starts_with('"') && rest.ends_with('"');
    let text = if exact { &rest[1..rest.len() - 1] } else { rest }.trim();

    if text.is_empty() {
        return Err(ExploreError::InvalidInput(format!(
            "Query '{}' has no search text",
            raw
        )));
    }

    Ok(ParsedQuery {
        text: text.to_string(),
        kind,
        exact,
        level,
    })
}

/// Strip provider disambiguation suffixes such as "Artist (2)"
pub fn normalize_name(name: &str) -> String {
    DISAMBIGUATION_SUFFIX.replace(name.trim(), "").trim().to_string()
}

/// Stable cache id of a resolved entity
pub fn entity_cache_id(source: Source, kind: EntityKind, id: &str, level: u8) -> String {
    format!(
        "{}{}:{}:{}",
        ">".repeat(level as usize),
        source,
        kind.as_str(),
        id
    )
}
