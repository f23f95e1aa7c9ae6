//! Crate-level scenario suites.
//!
//! - `integration.rs`: end-to-end combat scenarios through the engine and pipeline
//! - `determinism.rs`: same seed and inputs give byte-identical results
//! - `properties.rs`: proptest invariants of the formulas and the effect engine
//! - `helpers.rs`: shared factories

mod determinism;
mod helpers;

// Re-export for convenience
pub use helpers::*;
