// src/parsing/numbers.rs
// Quantity-word lookup tables for German and English order phrasings.

use once_cell::sync::Lazy;
use std::collections::HashMap;

static GERMAN_NUMBERS: Lazy<HashMap<&'static str, i32>> = Lazy::new(|| {
    HashMap::from([
        ("ein", 1),
        ("eine", 1),
        ("eins", 1),
        ("zwei", 2),
        ("zwo", 2),
        ("drei", 3),
        ("vier", 4),
        ("fuenf", 5),
        ("fünf", 5),
        ("sechs", 6),
        ("sieben", 7),
        ("acht", 8),
        ("neun", 9),
        ("zehn", 10),
        ("elf", 11),
        ("zwoelf", 12),
        ("zwölf", 12),
    ])
});

static ENGLISH_NUMBERS: Lazy<HashMap<&'static str, i32>> = Lazy::new(|| {
    HashMap::from([
        ("one", 1),
        ("a", 1),
        ("an", 1),
        ("two", 2),
        ("three", 3),
        ("four", 4),
        ("five", 5),
        ("six", 6),
        ("seven", 7),
        ("eight", 8),
        ("nine", 9),
        ("ten", 10),
        ("eleven", 11),
        ("twelve", 12),
    ])
});

/// Resolve a German quantity word ("drei", "ein", ...) to its integer value.
pub fn german_quantity(word: &str) -> Option<i32> {
    GERMAN_NUMBERS.get(word.to_lowercase().as_str()).copied()
}

/// Resolve an English quantity word ("five", "a", ...) to its integer value.
pub fn english_quantity(word: &str) -> Option<i32> {
    ENGLISH_NUMBERS.get(word.to_lowercase().as_str()).copied()
}
