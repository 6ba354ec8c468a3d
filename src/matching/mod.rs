// src/matching/mod.rs

pub mod product;

pub use product::{edit_distance, find_product_match, similarity};
