//! Static scanning of generated bundle code
//!
//! Two independent mini-grammars live here:
//! - the call-site grammar, which finds lazy-load call sites in a module
//!   factory and the chunk-id list plus entrypoint of each one
//! - the universe grammar, which lists every chunk id mentioned as a key in
//!   the bundler's asset-path function
//!
//! Both operate on minified, untrusted text and never fail; anything that
//! does not fit the grammar is skipped.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{ChunkGroup, ChunkId};

/// Matches a JS identifier, e.g. a minified `__webpack_require__` alias
const IDENT: &str = r"(?:[A-Za-z_$][\w$]*)";

/// `[Promise.all([]X.e("1"),X.e("2")[])].then(X.bind(X,"3"))`
static LAZY_CHUNK_REGEX: Lazy<Regex> = Lazy::new(|| {
    let pattern = r#"(?:(?:Promise\.all\(\[)?(\i\.e\("?[^)]+?"?\)[^\]]*?)(?:\]\))?)\.then\(\i(?:\.\i)?\.bind\(\i,"?([^)]+?)"?(?:,[^)]+?)?\)\)"#
        .replace(r"\i", IDENT);
    Regex::new(&pattern).unwrap()
});

/// One argument of `X.e(...)`
static CHUNK_IDS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\("?([^")]+?)"?\)"#).unwrap()
});

/// `"123"` or `123:` inside the asset-path function
static CHUNK_KEY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""([\deE]+?)"|([\deE]+?):"#).unwrap()
});

/// Extract every lazy chunk group referenced by a factory's source
pub fn extract_chunk_groups(factory_source: &str) -> Vec<ChunkGroup> {
    LAZY_CHUNK_REGEX
        .captures_iter(factory_source)
        .filter_map(|cap| {
            let chunk_ids = parse_chunk_ids(cap.get(1)?.as_str())?;
            let entry_point = parse_id(cap.get(2)?.as_str())?;
            Some(ChunkGroup { chunk_ids, entry_point })
        })
        .collect()
}

/// Parse the chunk-id sub-expression of a call site.
///
/// Returns `None` when the list is empty or any id is not numeric.
pub fn parse_chunk_ids(raw: &str) -> Option<Vec<ChunkId>> {
    let ids = CHUNK_IDS_REGEX
        .captures_iter(raw)
        .map(|cap| parse_id(&cap[1]))
        .collect::<Option<Vec<_>>>()?;

    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

/// Collect every chunk id the asset-path function maps to a file.
///
/// Quoted literals followed by `,` or `}` are values (hashes, names), not
/// keys, and are skipped. Order of first appearance is kept.
pub fn parse_chunk_universe(asset_path_source: &str) -> Vec<ChunkId> {
    let mut ids = Vec::new();
    let mut pos = 0;

    while let Some(cap) = CHUNK_KEY_REGEX.captures_at(asset_path_source, pos) {
        let Some(whole) = cap.get(0) else { break };

        let raw = if let Some(quoted) = cap.get(1) {
            let next = asset_path_source[whole.end()..].chars().next();
            if matches!(next, Some(',') | Some('}')) {
                // Resume one char in, so the closing quote can still start a match
                pos = whole.start() + 1;
                continue;
            }
            quoted.as_str()
        } else {
            cap.get(2).map(|m| m.as_str()).unwrap_or_default()
        };
        pos = whole.end();

        if let Some(id) = parse_id(raw) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    ids
}

/// Parse a numeric literal as an id; minified code may use exponent form
fn parse_id(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(id) = raw.parse::<u64>() {
        return Some(id);
    }

    if !raw.contains(['e', 'E']) || !raw.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let value = raw.parse::<f64>().ok()?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64 {
        Some(value as u64)
    } else {
        None
    }
}
