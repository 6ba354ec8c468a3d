// src/matching/product.rs
// Resolves an extracted product phrase against the catalog snapshot.
// Tiers, first hit wins: exact > contains > fuzzy > no match.

use strsim::levenshtein;

use crate::config::MIN_FUZZY_SIMILARITY;
use crate::models::{CatalogProduct, MatchTier, ProductMatch};
use crate::parsing::normalize::normalize_product_name;

/// Case-insensitive Levenshtein edit distance (unit-cost insert, delete,
/// substitute).
pub fn edit_distance(a: &str, b: &str) -> usize {
    levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Similarity = 1 − distance / max(len). Two empty strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - edit_distance(a, b) as f64 / max_len as f64
}

/// Classify the best catalog match for an extracted phrase.
///
/// Contains and fuzzy ties are broken by catalog iteration order; the
/// caller's snapshot order is preserved deliberately.
pub fn find_product_match(extracted: &str, catalog: &[CatalogProduct]) -> ProductMatch {
    let normalized = normalize_product_name(extracted);
    if normalized.is_empty() {
        return ProductMatch::InvalidName;
    }
    if catalog.is_empty() {
        return ProductMatch::NoProducts;
    }

    let needle = normalized.to_lowercase();

    if let Some(product) = catalog.iter().find(|p| p.name.to_lowercase() == needle) {
        return ProductMatch::Matched {
            product: product.clone(),
            tier: MatchTier::Exact,
        };
    }

    if let Some(product) = catalog.iter().find(|p| {
        let name = p.name.to_lowercase();
        name.contains(&needle) || needle.contains(&name)
    }) {
        return ProductMatch::Matched {
            product: product.clone(),
            tier: MatchTier::Contains,
        };
    }

    let mut best: Option<&CatalogProduct> = None;
    let mut best_distance = usize::MAX;
    for product in catalog {
        let distance = edit_distance(&normalized, &product.name);
        if distance < best_distance && similarity(&normalized, &product.name) > MIN_FUZZY_SIMILARITY
        {
            best_distance = distance;
            best = Some(product);
        }
    }

    match best {
        Some(product) => ProductMatch::Matched {
            product: product.clone(),
            tier: MatchTier::Fuzzy,
        },
        None => ProductMatch::NoMatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProductId;

    fn product(id: &str, name: &str) -> CatalogProduct {
        CatalogProduct {
            id: ProductId(id.to_string()),
            name: name.to_string(),
            price: 100.0,
        }
    }

    #[test]
    fn edit_distance_symmetric() {
        for (a, b) in [
            ("laptop", "lapptop"),
            ("drucker", "printer"),
            ("", "kabel"),
            ("Monitor", "monitor"),
        ] {
            assert_eq!(edit_distance(a, b), edit_distance(b, a));
        }
    }

    #[test]
    fn edit_distance_identity() {
        assert_eq!(edit_distance("laptop", "laptop"), 0);
        assert_eq!(edit_distance("Laptop", "laptop"), 0);
        assert_eq!(edit_distance("", ""), 0);
    }

    #[test]
    fn similarity_bounds() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("laptop", "laptop"), 1.0);
        assert!(similarity("laptop", "xyz") < MIN_FUZZY_SIMILARITY);
    }

    #[test]
    fn exact_match_case_insensitive() {
        let catalog = vec![product("p1", "Laptop"), product("p2", "Drucker")];
        let result = find_product_match("laptop", &catalog);
        assert_eq!(result.tier(), Some(MatchTier::Exact));
        assert_eq!(result.product().unwrap().id, ProductId("p1".to_string()));
    }

    #[test]
    fn exact_match_after_plural_strip() {
        let catalog = vec![product("p1", "Printer")];
        let result = find_product_match("Printers", &catalog);
        assert_eq!(result.tier(), Some(MatchTier::Exact));
    }

    #[test]
    fn contains_match_either_direction() {
        let catalog = vec![product("p1", "HP Laptop")];
        // phrase contained in catalog name
        let result = find_product_match("Laptop", &catalog);
        assert_eq!(result.tier(), Some(MatchTier::Contains));

        // catalog name contained in phrase
        let catalog = vec![product("p1", "Laptop")];
        let result = find_product_match("HP Laptop", &catalog);
        assert_eq!(result.tier(), Some(MatchTier::Contains));
    }

    #[test]
    fn fuzzy_match_on_typo() {
        let catalog = vec![product("p1", "Laptop")];
        let result = find_product_match("Laptpo", &catalog);
        assert_eq!(result.tier(), Some(MatchTier::Fuzzy));
    }

    #[test]
    fn fuzzy_tie_broken_by_iteration_order() {
        let first = vec![product("p1", "Monitor"), product("p2", "Monito")];
        let result = find_product_match("Monitr", &first);
        assert_eq!(result.product().unwrap().id, ProductId("p1".to_string()));

        let reversed = vec![product("p2", "Monito"), product("p1", "Monitor")];
        let result = find_product_match("Monitr", &reversed);
        assert_eq!(result.product().unwrap().id, ProductId("p2".to_string()));
    }

    #[test]
    fn unrelated_phrase_has_no_match() {
        let catalog = vec![product("p1", "Laptop"), product("p2", "Drucker")];
        assert_eq!(find_product_match("Raumschiff", &catalog), ProductMatch::NoMatch);
    }

    #[test]
    fn empty_phrase_is_invalid_name() {
        let catalog = vec![product("p1", "Laptop")];
        assert_eq!(find_product_match("   ", &catalog), ProductMatch::InvalidName);
        // normalization may consume the whole phrase
        assert_eq!(find_product_match("s", &catalog), ProductMatch::InvalidName);
    }

    #[test]
    fn empty_catalog_is_no_products() {
        assert_eq!(find_product_match("Laptop", &[]), ProductMatch::NoProducts);
    }
}
