//! Streaming and batch normalization statistics.
//!
//! Trajectory channels (joint angles, gripper state, end-effector deltas)
//! live on wildly different scales; distances over un-normalized flat
//! vectors would be dominated by whichever channel has the largest units.
//! [`NormalizationTracker`] maintains per-channel mean and standard
//! deviation either incrementally (Welford's online algorithm) or from a
//! collected batch, so indices can normalize on the way in and invert the
//! transform on the way out.
//!
//! Channels that have seen fewer than two samples, or whose variance is
//! exactly zero, report a standard deviation of 1 so the transform stays
//! invertible.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::IndexError;

// ─────────────────────────────────────────────────────────────────────────────
// NormalizationTracker
// ─────────────────────────────────────────────────────────────────────────────

/// Per-channel running mean/std accumulator.
///
/// # Example
///
/// ```rust
/// use epibank_embedding::NormalizationTracker;
/// use ndarray::arr2;
///
/// let mut tracker = NormalizationTracker::new(2);
/// tracker
///     .update_online(arr2(&[[1.0, 10.0], [3.0, 30.0]]).view())
///     .unwrap();
///
/// let (mean, std) = tracker.current_stats();
/// assert!((mean[0] - 2.0).abs() < 1e-6);
/// assert!((mean[1] - 20.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct NormalizationTracker {
    feature_dim: usize,
    count: u64,
    mean: Array1<f32>,
    /// Welford's second-moment accumulator (sum of squared deviations).
    m2: Array1<f32>,
}

impl NormalizationTracker {
    /// Create a tracker for `feature_dim` channels with zeroed accumulators.
    pub fn new(feature_dim: usize) -> Self {
        Self {
            feature_dim,
            count: 0,
            mean: Array1::zeros(feature_dim),
            m2: Array1::zeros(feature_dim),
        }
    }

    /// Number of rows absorbed so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Number of channels tracked.
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// Absorb every row of `rows` into the running statistics.
    ///
    /// Welford's update is applied one row at a time.  The `mean` must be
    /// updated *before* the second deviation is taken; computing both
    /// deviations against the old mean is the classical
    /// catastrophic-cancellation bug this algorithm exists to avoid.
    pub fn update_online(&mut self, rows: ArrayView2<'_, f32>) -> Result<(), IndexError> {
        if rows.ncols() != self.feature_dim {
            return Err(IndexError::FeatureMismatch {
                expected: self.feature_dim,
                actual: rows.ncols(),
            });
        }

        for row in rows.outer_iter() {
            self.count += 1;
            let x = row.to_owned();
            let delta = &x - &self.mean;
            self.mean += &(&delta / self.count as f32);
            let delta2 = &x - &self.mean;
            self.m2 += &(&delta * &delta2);
        }
        Ok(())
    }

    /// Absorb a flat vector by reshaping it to rows of `feature_dim` values.
    ///
    /// Rejects vectors whose length is not a multiple of the channel count.
    pub fn update_online_flat(&mut self, vector: ArrayView1<'_, f32>) -> Result<(), IndexError> {
        if self.feature_dim == 0 || vector.len() % self.feature_dim != 0 {
            return Err(IndexError::FeatureMismatch {
                expected: self.feature_dim,
                actual: vector.len(),
            });
        }
        let rows = vector
            .to_shape((vector.len() / self.feature_dim, self.feature_dim))
            .expect("length checked to be a multiple of feature_dim");
        self.update_online(rows.view())
    }

    /// Current `(mean, std)` estimates.
    ///
    /// For fewer than two absorbed rows the standard deviation is all-ones:
    /// not yet statistically meaningful, and safe to divide by.  Zero-variance
    /// channels are likewise reported as 1.
    pub fn current_stats(&self) -> (Array1<f32>, Array1<f32>) {
        if self.count < 2 {
            return (self.mean.clone(), Array1::ones(self.feature_dim));
        }

        let mut std = (&self.m2 / (self.count - 1) as f32).mapv(f32::sqrt);
        std.mapv_inplace(|s| if s == 0.0 { 1.0 } else { s });
        (self.mean.clone(), std)
    }

    /// One-shot `(mean, std)` over a batch of matrices, all rows stacked.
    ///
    /// Uses the same sample estimator (and the same zero-variance guard) as
    /// the online path, so the two agree on identical data.  Does not touch
    /// the online accumulators; intended for pre-computed corpus statistics.
    pub fn batch_stats(
        &self,
        matrices: &[Array2<f32>],
    ) -> Result<(Array1<f32>, Array1<f32>), IndexError> {
        for m in matrices {
            if m.ncols() != self.feature_dim {
                return Err(IndexError::FeatureMismatch {
                    expected: self.feature_dim,
                    actual: m.ncols(),
                });
            }
        }

        let total_rows: usize = matrices.iter().map(|m| m.nrows()).sum();
        if total_rows < 2 {
            let mean = match matrices.iter().find(|m| m.nrows() > 0) {
                Some(m) => m.row(0).to_owned(),
                None => Array1::zeros(self.feature_dim),
            };
            return Ok((mean, Array1::ones(self.feature_dim)));
        }

        let mut stacked = Array2::zeros((total_rows, self.feature_dim));
        let mut offset = 0;
        for m in matrices {
            stacked
                .slice_mut(ndarray::s![offset..offset + m.nrows(), ..])
                .assign(m);
            offset += m.nrows();
        }

        let mean = stacked
            .mean_axis(Axis(0))
            .expect("total_rows >= 2 guarantees a non-empty axis");
        let centered = &stacked - &mean;
        let mut std = (centered.mapv(|d| d * d).sum_axis(Axis(0)) / (total_rows - 1) as f32)
            .mapv(f32::sqrt);
        std.mapv_inplace(|s| if s == 0.0 { 1.0 } else { s });
        Ok((mean, std))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
