// src/scoring.rs
// Combines a pattern's base confidence with the catalog match outcome.

use crate::config::{CONTAINS_MATCH_MODIFIER, FUZZY_MATCH_MODIFIER, NO_MATCH_PENALTY};
use crate::models::{MatchTier, ProductMatch};

/// Confidence modifier contributed by a resolved match tier.
pub fn tier_modifier(tier: MatchTier) -> f64 {
    match tier {
        MatchTier::Exact => 0.0,
        MatchTier::Contains => CONTAINS_MATCH_MODIFIER,
        MatchTier::Fuzzy => FUZZY_MATCH_MODIFIER,
    }
}

/// Final confidence for a candidate: base plus the match modifier when a
/// product resolved, base minus the no-match penalty otherwise. Always
/// clamped to [0, 1].
pub fn final_confidence(base_confidence: f64, product_match: &ProductMatch) -> f64 {
    let adjusted = match product_match {
        ProductMatch::Matched { tier, .. } => base_confidence + tier_modifier(*tier),
        ProductMatch::InvalidName | ProductMatch::NoProducts | ProductMatch::NoMatch => {
            base_confidence - NO_MATCH_PENALTY
        }
    };
    adjusted.clamp(0.0, 1.0)
}
