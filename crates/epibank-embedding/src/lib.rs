//! `epibank-embedding` – the embedding index management layer.
//!
//! Turns variable-length robot trajectories into fixed-length normalized
//! vectors, maintains one exact nearest-neighbor index per
//! dataset/embodiment/field key, tracks streaming normalization statistics,
//! and persists the whole arrangement to a directory it owns.
//!
//! # Modules
//!
//! - [`normalization`] – [`NormalizationTracker`]: numerically stable
//!   per-channel mean/std, online (Welford) or batch.
//! - [`index`] – the [`VectorIndex`] capability trait and [`FlatL2Index`],
//!   an exact squared-L2 scan with a cosine brute-force fallback and
//!   atomic file persistence.
//! - [`manager`] – [`IndexManager`]: name-addressed multiplexer adding
//!   interpolation, normalization, and multi-index persistence on top of
//!   the vector-level contract.
//!
//! # Example
//!
//! ```rust
//! use epibank_embedding::IndexManager;
//! use ndarray::Array2;
//! use tempfile::tempdir;
//!
//! let dir = tempdir().unwrap();
//! let mut manager = IndexManager::open(dir.path(), false).unwrap();
//!
//! // A 20-step, 4-channel action trajectory; the index is created lazily
//! // with the matrix's own shape as its canonical geometry.
//! let traj = Array2::from_shape_fn((20, 4), |(t, c)| (t * 4 + c) as f32);
//! manager.add_matrix("CMU Stretch-Stretch-actions", &traj, "ep-0").unwrap();
//!
//! let hits = manager
//!     .search_matrix("CMU Stretch-Stretch-actions", &traj, 1)
//!     .unwrap();
//! assert_eq!(hits[0].external_id, "ep-0");
//! ```

pub mod index;
pub mod manager;
pub mod normalization;

pub use index::{FlatL2Index, SearchHit, VectorIndex};
pub use manager::{IndexManager, IndexMetadata, MatrixBatch, MatrixHit};
pub use normalization::NormalizationTracker;

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the embedding index layer.
///
/// Degenerate statistics (fewer than two samples, zero variance) and
/// search misses are handled locally and never appear here; everything
/// that does appear is a rejected operation, propagated synchronously.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("vector length {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("matrix has {actual} feature columns, expected {expected}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("matrix must have at least one row")]
    EmptyMatrix,

    #[error("index dimensions must be positive (feature_dim={feature_dim}, time_steps={time_steps})")]
    InvalidDimensions { feature_dim: usize, time_steps: usize },

    #[error("external id `{0}` already present in index")]
    DuplicateId(String),

    #[error("index `{0}` already exists")]
    IndexExists(String),

    #[error("unknown index `{0}`")]
    UnknownIndex(String),

    #[error("normalization constants must have length {expected}, got {actual}")]
    NormalizationShape { expected: usize, actual: usize },

    #[error("index artifact missing at {0}")]
    MissingArtifact(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index payload encode failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("index payload decode failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("metadata serialization failed: {0}")]
    Metadata(#[from] serde_json::Error),
}
