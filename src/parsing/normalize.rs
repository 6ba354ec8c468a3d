// src/parsing/normalize.rs
// Lexical normalization: body flattening and product-phrase cleanup.

use once_cell::sync::Lazy;
use regex::Regex;

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static TRAILING_FILLER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+(bitte|please|danke|thanks|asap)$").unwrap());

/// Flattens a raw (possibly HTML-bearing) email body into plain text:
/// tags become spaces, `&nbsp;` is decoded, whitespace runs collapse to a
/// single space, and the result is trimmed.
pub fn flatten_body(raw: &str) -> String {
    let no_tags = HTML_TAG_RE.replace_all(raw, " ");
    let no_entities = no_tags.replace("&nbsp;", " ");
    WHITESPACE_RE.replace_all(&no_entities, " ").trim().to_string()
}

/// Normalizes an extracted product phrase for catalog matching. Lossy by
/// design: trailing politeness words, a single plural `s` (but not `ss`)
/// and a German `e`/`en` plural ending are all stripped to raise recall.
pub fn normalize_product_name(raw: &str) -> String {
    let mut normalized = raw.trim().to_string();

    normalized = TRAILING_FILLER_RE.replace(&normalized, "").to_string();

    if normalized.ends_with('s') && !normalized.ends_with("ss") {
        normalized.pop();
    }

    if normalized.ends_with("en") {
        normalized.truncate(normalized.len() - 2);
    } else if normalized.ends_with('e') {
        normalized.pop();
    }

    WHITESPACE_RE.replace_all(&normalized, " ").trim().to_string()
}
