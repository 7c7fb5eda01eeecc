//! Top-level module for the next-word prediction core.
//!
//! This module contains the statistical machinery of the predictor:
//! - Fixed-order word n-gram models (`LanguageModel`)
//! - Per-context continuation statistics (`ContextStats`)
//! - The versioned snapshot byte codec (`snapshot`)
//! - Multi-threaded snapshot aggregation (`aggregate`)

/// Fixed-order word n-gram model.
///
/// Handles tokenization, count accumulation, smoothed top-k prediction,
/// weighted sampling, and count-summing merge.
pub mod language_model;

/// Snapshot byte codec.
///
/// Encodes a model into the versioned wire layout and decodes it back,
/// validating every structural invariant before accepting the bytes.
pub mod snapshot;

/// Aggregator-side merging of many exported snapshots.
///
/// Builds partial models on worker threads and folds them into one, which
/// is valid because the merge operation is commutative and associative.
pub mod aggregate;

/// Internal representation of one context's observed continuations.
///
/// Tracks next-token occurrence counts and supports weighted random
/// sampling. This module is not exposed publicly.
mod context_stats;
