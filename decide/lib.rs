#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod bet;
pub mod config;
pub mod heuristics;
pub mod mixture;
pub mod tax;
pub mod types;

// Posterior draw engine and marginal summaries
#[path = "../posterior/mod.rs"]
pub mod posterior;
