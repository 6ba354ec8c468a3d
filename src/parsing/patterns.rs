// src/parsing/patterns.rs
// Ordered extraction rules. Rules are tried strictly in priority order and
// the first one producing a valid quantity wins; a rule whose quantity
// resolves outside [1, MAX_ORDER_QUANTITY] signals continue-to-next-rule
// rather than aborting the parse.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::MAX_ORDER_QUANTITY;
use crate::models::{ParseCandidate, ParseFailure, ParseFailureKind};
use crate::parsing::normalize::flatten_body;
use crate::parsing::numbers::{english_quantity, german_quantity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QtyTransform {
    Numeric,
    GermanWord,
    EnglishWord,
}

pub struct ParsePattern {
    pub name: &'static str,
    pub base_confidence: f64,
    regex: Regex,
    transform: QtyTransform,
}

/// Extraction rules, highest precision first. Group 1 captures the
/// quantity, group 2 the product phrase.
static PATTERNS: Lazy<Vec<ParsePattern>> = Lazy::new(|| {
    vec![
        ParsePattern {
            name: "german_strict",
            base_confidence: 0.95,
            regex: Regex::new(
                r"(?i)ich\s+(?:möchte|moechte|will|brauche|benötige|benotige|hätte gern|haette gern)\s+(\d+)\s*[xX]?\s+(.+?)(?:\s+bestellen|\s+kaufen|\s+ordern|\.|!|\?|$)",
            )
            .unwrap(),
            transform: QtyTransform::Numeric,
        },
        ParsePattern {
            name: "bestellung_colon",
            base_confidence: 0.90,
            regex: Regex::new(r"(?i)bestellung\s*:?\s*(\d+)\s*[xX]?\s+(.+?)(?:\.|!|\?|$)").unwrap(),
            transform: QtyTransform::Numeric,
        },
        ParsePattern {
            name: "english_strict",
            base_confidence: 0.90,
            regex: Regex::new(
                r"(?i)i\s+(?:need|want|would like|order|am ordering)\s+(\d+)\s+(.+?)(?:\.|!|\?|$)",
            )
            .unwrap(),
            transform: QtyTransform::Numeric,
        },
        ParsePattern {
            name: "please_order",
            base_confidence: 0.85,
            regex: Regex::new(
                r"(?i)(?:bitte|please)\s+(?:bestellen|order)\s*:?\s*(\d+)\s*[xX]?\s+(.+?)(?:\.|!|\?|$)",
            )
            .unwrap(),
            transform: QtyTransform::Numeric,
        },
        ParsePattern {
            name: "german_text_qty",
            base_confidence: 0.85,
            regex: Regex::new(
                r"(?i)ich\s+(?:möchte|moechte|will|brauche|benötige|benotige|hätte gern|haette gern)\s+(ein|eine|zwei|drei|vier|fuenf|fünf|sechs|sieben|acht|neun|zehn)\s+(.+?)(?:\.|!|\?|$)",
            )
            .unwrap(),
            transform: QtyTransform::GermanWord,
        },
        ParsePattern {
            name: "english_text_qty",
            base_confidence: 0.80,
            regex: Regex::new(
                r"(?i)i\s+(?:need|want|would like|order)\s+(one|two|three|four|five|six|seven|eight|nine|ten)\s+(.+?)(?:\.|!|\?|$)",
            )
            .unwrap(),
            transform: QtyTransform::EnglishWord,
        },
        // Generic fallback: bare number followed by a capitalized phrase.
        // Deliberately case-sensitive.
        ParsePattern {
            name: "number_first",
            base_confidence: 0.75,
            regex: Regex::new(r"(\d+)\s*[xX]?\s+([A-Z][A-Za-z0-9\s\-]+?)(?:\.|!|\?|,|$)").unwrap(),
            transform: QtyTransform::Numeric,
        },
    ]
});

fn resolve_quantity(raw: &str, transform: QtyTransform) -> Option<i32> {
    match transform {
        QtyTransform::Numeric => raw.parse::<i32>().ok(),
        QtyTransform::GermanWord => german_quantity(raw),
        QtyTransform::EnglishWord => english_quantity(raw),
    }
}

fn unparseable(message: &str) -> ParseFailure {
    ParseFailure {
        kind: ParseFailureKind::Unparseable,
        message: message.to_string(),
    }
}

/// Runs the rule list against an already-flattened body.
pub fn extract_candidate(clean_body: &str) -> Result<ParseCandidate, ParseFailure> {
    if clean_body.is_empty() {
        return Err(unparseable("Empty or invalid email body"));
    }

    for pattern in PATTERNS.iter() {
        let Some(caps) = pattern.regex.captures(clean_body) else {
            continue;
        };

        let qty_raw = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let quantity = match resolve_quantity(qty_raw, pattern.transform) {
            Some(q) if q > 0 && q <= MAX_ORDER_QUANTITY => q,
            // Invalid quantity: this rule did not produce a match.
            _ => continue,
        };

        let raw_phrase = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();

        return Ok(ParseCandidate {
            quantity,
            raw_phrase,
            pattern: pattern.name,
            base_confidence: pattern.base_confidence,
        });
    }

    Err(unparseable("No matching pattern found in email"))
}

/// Flattens a raw body and runs the rule list over it.
pub fn parse_body(raw_body: &str) -> Result<ParseCandidate, ParseFailure> {
    extract_candidate(&flatten_body(raw_body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn german_strict_extracts() {
        let candidate = parse_body("Ich möchte 3 Laptop bestellen").unwrap();
        assert_eq!(candidate.pattern, "german_strict");
        assert_eq!(candidate.quantity, 3);
        assert_eq!(candidate.raw_phrase, "Laptop");
        assert_eq!(candidate.base_confidence, 0.95);
    }

    #[test]
    fn german_strict_ascii_variant() {
        let candidate = parse_body("ich moechte 12 x Monitor kaufen").unwrap();
        assert_eq!(candidate.pattern, "german_strict");
        assert_eq!(candidate.quantity, 12);
        assert_eq!(candidate.raw_phrase, "Monitor");
    }

    #[test]
    fn bestellung_colon_extracts() {
        let candidate = parse_body("Bestellung: 5 Schrauben").unwrap();
        assert_eq!(candidate.pattern, "bestellung_colon");
        assert_eq!(candidate.quantity, 5);
        assert_eq!(candidate.raw_phrase, "Schrauben");
        assert_eq!(candidate.base_confidence, 0.90);
    }

    #[test]
    fn english_strict_extracts() {
        let candidate = parse_body("I would like 7 Monitors.").unwrap();
        assert_eq!(candidate.pattern, "english_strict");
        assert_eq!(candidate.quantity, 7);
        assert_eq!(candidate.raw_phrase, "Monitors");
        assert_eq!(candidate.base_confidence, 0.90);
    }

    #[test]
    fn please_order_extracts() {
        let candidate = parse_body("Bitte bestellen: 2 Kabel").unwrap();
        assert_eq!(candidate.pattern, "please_order");
        assert_eq!(candidate.quantity, 2);
        assert_eq!(candidate.raw_phrase, "Kabel");
        assert_eq!(candidate.base_confidence, 0.85);
    }

    #[test]
    fn german_text_quantity_resolves_word() {
        let candidate = parse_body("Ich brauche zwei Tastaturen.").unwrap();
        assert_eq!(candidate.pattern, "german_text_qty");
        assert_eq!(candidate.quantity, 2);
        assert_eq!(candidate.raw_phrase, "Tastaturen");
        assert_eq!(candidate.base_confidence, 0.85);
    }

    #[test]
    fn german_article_means_one() {
        let candidate = parse_body("Ich möchte eine Lampe.").unwrap();
        assert_eq!(candidate.pattern, "german_text_qty");
        assert_eq!(candidate.quantity, 1);
        assert_eq!(candidate.raw_phrase, "Lampe");
    }

    #[test]
    fn english_text_quantity_resolves_word() {
        let candidate = parse_body("I need five Printers.").unwrap();
        assert_eq!(candidate.pattern, "english_text_qty");
        assert_eq!(candidate.quantity, 5);
        assert_eq!(candidate.raw_phrase, "Printers");
        assert_eq!(candidate.base_confidence, 0.80);
    }

    #[test]
    fn number_first_fallback() {
        let candidate = parse_body("2x Laptop, Lieferung bitte bis Freitag").unwrap();
        assert_eq!(candidate.pattern, "number_first");
        assert_eq!(candidate.quantity, 2);
        assert_eq!(candidate.raw_phrase, "Laptop");
        assert_eq!(candidate.base_confidence, 0.75);
    }

    #[test]
    fn priority_prefers_strict_over_fallback() {
        // Matches both german_strict and number_first; the earlier rule wins.
        let candidate = parse_body("Ich will 4 Drucker bestellen").unwrap();
        assert_eq!(candidate.pattern, "german_strict");
    }

    #[test]
    fn zero_quantity_falls_through_to_failure() {
        let err = parse_body("Ich möchte 0 Laptop bestellen").unwrap_err();
        assert_eq!(err.kind, ParseFailureKind::Unparseable);
    }

    #[test]
    fn oversized_quantity_falls_through_to_failure() {
        let err = parse_body("Ich möchte 10000 Laptop bestellen").unwrap_err();
        assert_eq!(err.kind, ParseFailureKind::Unparseable);
    }

    #[test]
    fn boundary_quantities_accepted() {
        assert_eq!(parse_body("Ich will 1 Laptop bestellen").unwrap().quantity, 1);
        assert_eq!(
            parse_body("Ich will 9999 Laptop bestellen").unwrap().quantity,
            9999
        );
    }

    #[test]
    fn gibberish_is_unparseable() {
        let err = parse_body("asdkj random text").unwrap_err();
        assert_eq!(err.kind, ParseFailureKind::Unparseable);
        assert!(err.message.contains("No matching pattern"));
    }

    #[test]
    fn empty_body_is_unparseable() {
        let err = parse_body("").unwrap_err();
        assert_eq!(err.kind, ParseFailureKind::Unparseable);
        assert!(err.message.contains("Empty"));
    }

    #[test]
    fn html_body_is_flattened_before_matching() {
        let candidate =
            parse_body("<div>Ich möchte&nbsp;<b>3</b> Laptop bestellen</div>").unwrap();
        assert_eq!(candidate.pattern, "german_strict");
        assert_eq!(candidate.quantity, 3);
    }

    #[test]
    fn parse_is_idempotent() {
        let body = "I need five Printers.";
        let first = parse_body(body).unwrap();
        let second = parse_body(body).unwrap();
        assert_eq!(first, second);
    }
}
