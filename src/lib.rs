//! Evaluation plumbing for comparing text-to-image models.
//!
//! Raw per-model metadata CSVs are standardised into a canonical step table,
//! handed to the external general/cultural scorers, and the cultural metric
//! rows are reduced to one best/worst record per sample group.

pub mod cache;
pub mod columns;
pub mod error;
pub mod logging;
pub mod paths;
pub mod pipeline;
pub mod scorer;
pub mod standardise;
pub mod summary;
