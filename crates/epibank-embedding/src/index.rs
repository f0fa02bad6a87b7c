//! Vector indices: the capability trait and the exact-search engine.
//!
//! A [`VectorIndex`] stores fixed-length vectors under opaque external
//! string IDs and answers nearest-neighbor queries.  The trait is the seam
//! at which a different backend (approximate search, another metric) could
//! be substituted without touching the [`IndexManager`][crate::IndexManager].
//!
//! [`FlatL2Index`] is the reference engine: an exact squared-Euclidean scan
//! over every stored vector, with a cosine-similarity brute-force fallback
//! for small indices when the primary scan yields no candidates.
//!
//! # On-disk layout
//!
//! | file | contents |
//! |---|---|
//! | `<name>.index`      | bincode payload: every stored vector, in internal-ID order |
//! | `<name>_meta.json`  | `feature_dim`, `time_steps`, `n_entries`, `id_map`, `next_id`, `norm_means`, `norm_stds` |
//!
//! Both files are written via a temp-file-then-rename so a crash mid-save
//! leaves the previous artifact intact.  Cross-index atomicity is the
//! manager's (explicit non-) concern.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::IndexError;
use crate::normalization::NormalizationTracker;

/// Largest index size for which the brute-force cosine fallback runs.
/// Beyond this a primary-search miss returns an empty result instead.
pub const MAX_BRUTE_FORCE: usize = 100;

// ─────────────────────────────────────────────────────────────────────────────
// SearchHit
// ─────────────────────────────────────────────────────────────────────────────

/// One nearest-neighbor result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Squared Euclidean distance to the query (or `1 − cosine similarity`
    /// when the brute-force fallback produced the hit).
    pub distance: f32,
    /// Caller-supplied ID the matched vector was stored under.
    pub external_id: String,
    /// The stored vector itself, as indexed (normalized if the index
    /// normalizes; the manager denormalizes on the way out).
    pub vector: Array1<f32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// VectorIndex trait
// ─────────────────────────────────────────────────────────────────────────────

/// Capability contract for a single named nearest-neighbor index.
///
/// Implementations own their normalization state and persistence; the
/// manager treats them uniformly through this interface.
pub trait VectorIndex {
    /// Construct an empty index with fixed geometry.
    fn create(feature_dim: usize, time_steps: usize, online_norm: bool) -> Self
    where
        Self: Sized;

    /// Scalar channels per time step.
    fn feature_dim(&self) -> usize;

    /// Canonical sequence length (1 for non-temporal embeddings).
    fn time_steps(&self) -> usize;

    /// Flat vector length stored internally.
    fn total_dim(&self) -> usize {
        self.feature_dim() * self.time_steps()
    }

    /// Number of stored vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store `vector` under `external_id`.
    ///
    /// Internal IDs are assigned sequentially and never reused.  External
    /// IDs are unique per index; storing a duplicate is rejected.
    fn add(&mut self, vector: ArrayView1<'_, f32>, external_id: &str) -> Result<(), IndexError>;

    /// Up to `k` hits ordered by ascending distance.
    fn search(&self, query: ArrayView1<'_, f32>, k: usize) -> Result<Vec<SearchHit>, IndexError>;

    /// The stored vector for `external_id`, or `None` if absent.
    fn vector_by_id(&self, external_id: &str) -> Option<Array1<f32>>;

    /// All stored vectors in internal-ID order; zero rows when empty.
    fn all_vectors(&self) -> Array2<f32>;

    /// All external IDs, in the same order as [`all_vectors`][Self::all_vectors].
    fn all_ids(&self) -> Vec<String>;

    /// Install per-channel normalization constants (`feature_dim`-length).
    fn set_normalization(
        &mut self,
        mean: Array1<f32>,
        std: Array1<f32>,
    ) -> Result<(), IndexError>;

    /// Current normalization constants, if any.
    fn normalization(&self) -> Option<(&Array1<f32>, &Array1<f32>)>;

    /// Feed `matrix` into the online tracker and refresh the constants.
    /// No-op when the index was created without online normalization.
    fn update_normalization(&mut self, matrix: &Array2<f32>) -> Result<(), IndexError>;

    /// Persist the index to `path` plus its `_meta.json` sidecar.
    fn save(&mut self, path: &Path) -> Result<(), IndexError>;

    /// Restore the index from `path` and its sidecar.
    fn load(&mut self, path: &Path) -> Result<(), IndexError>;

    /// Reset to an empty index and remove on-disk artifacts if present.
    fn delete(&mut self) -> Result<(), IndexError>;

    /// `(x − mean) / std`, broadcast across rows; identity when unset.
    fn normalize_matrix(&self, matrix: &Array2<f32>) -> Array2<f32> {
        match self.normalization() {
            Some((mean, std)) => (matrix - mean) / std,
            None => matrix.clone(),
        }
    }

    /// Inverse of [`normalize_matrix`][Self::normalize_matrix].
    fn denormalize_matrix(&self, matrix: &Array2<f32>) -> Array2<f32> {
        match self.normalization() {
            Some((mean, std)) => matrix * std + mean,
            None => matrix.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FlatL2Index
// ─────────────────────────────────────────────────────────────────────────────

/// Exact squared-L2 scan over all stored vectors.
///
/// Deliberately linear: the corpus per index is small (one
/// dataset/embodiment/field slice), and exactness keeps ranking
/// reproducible across save/load cycles.
pub struct FlatL2Index {
    feature_dim: usize,
    time_steps: usize,
    /// Stored vectors; position == internal ID.
    vectors: Vec<Array1<f32>>,
    /// Internal ID → external ID, in insertion order.
    id_map: BTreeMap<u64, String>,
    next_id: u64,
    norm: Option<(Array1<f32>, Array1<f32>)>,
    tracker: Option<NormalizationTracker>,
    /// Where this index was last saved or loaded; `delete` removes the
    /// artifacts found here.
    last_save_path: Option<PathBuf>,
}

/// Binary payload written to `<name>.index`.
#[derive(Serialize, Deserialize)]
struct FlatPayload {
    total_dim: usize,
    vectors: Vec<Vec<f32>>,
}

/// JSON sidecar written to `<name>_meta.json`.
#[derive(Serialize, Deserialize)]
struct SidecarMeta {
    feature_dim: usize,
    time_steps: usize,
    n_entries: usize,
    id_map: BTreeMap<u64, String>,
    next_id: u64,
    norm_means: Option<Vec<f32>>,
    norm_stds: Option<Vec<f32>>,
}

impl FlatL2Index {
    fn check_dim(&self, actual: usize) -> Result<(), IndexError> {
        if actual != self.total_dim() {
            return Err(IndexError::DimensionMismatch {
                expected: self.total_dim(),
                actual,
            });
        }
        Ok(())
    }

    /// Cosine-similarity comparison against every stored vector.
    ///
    /// NaNs are zeroed and rows L2-normalized before the dot product;
    /// similarity is converted to `1 − similarity` so callers see a
    /// distance either way.
    fn brute_force(&self, query: ArrayView1<'_, f32>, k: usize) -> Vec<SearchHit> {
        let clean_query = query.mapv(|x| if x.is_nan() { 0.0 } else { x });

        let mut scored: Vec<(f32, u64, Array1<f32>)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let clean = v.mapv(|x| if x.is_nan() { 0.0 } else { x });
                let sim = cosine_similarity(clean_query.view(), clean.view());
                (sim, i as u64, clean)
            })
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(sim, internal_id, vector)| SearchHit {
                distance: 1.0 - sim,
                external_id: self.id_map[&internal_id].clone(),
                vector,
            })
            .collect()
    }
}

impl VectorIndex for FlatL2Index {
    fn create(feature_dim: usize, time_steps: usize, online_norm: bool) -> Self {
        Self {
            feature_dim,
            time_steps,
            vectors: Vec::new(),
            id_map: BTreeMap::new(),
            next_id: 0,
            norm: None,
            tracker: online_norm.then(|| NormalizationTracker::new(feature_dim)),
            last_save_path: None,
        }
    }

    fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    fn time_steps(&self) -> usize {
        self.time_steps
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn add(&mut self, vector: ArrayView1<'_, f32>, external_id: &str) -> Result<(), IndexError> {
        self.check_dim(vector.len())?;
        if self.id_map.values().any(|id| id == external_id) {
            return Err(IndexError::DuplicateId(external_id.to_string()));
        }

        let internal_id = self.next_id;
        self.next_id += 1;
        self.id_map.insert(internal_id, external_id.to_string());
        self.vectors.push(vector.to_owned());
        debug!(internal_id, external_id, "vector added");
        Ok(())
    }

    fn search(&self, query: ArrayView1<'_, f32>, k: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.check_dim(query.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, u64)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (squared_l2(query, v.view()), i as u64))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(k);

        if scored.is_empty() {
            // Primary scan produced no candidates.  Fall back to the cosine
            // comparison for small indices; large ones report a miss.
            if self.len() <= MAX_BRUTE_FORCE {
                return Ok(self.brute_force(query, k));
            }
            return Ok(Vec::new());
        }

        Ok(scored
            .into_iter()
            .map(|(distance, internal_id)| SearchHit {
                distance,
                external_id: self.id_map[&internal_id].clone(),
                vector: self.vectors[internal_id as usize].clone(),
            })
            .collect())
    }

    fn vector_by_id(&self, external_id: &str) -> Option<Array1<f32>> {
        self.id_map
            .iter()
            .find(|(_, id)| id.as_str() == external_id)
            .map(|(&internal_id, _)| self.vectors[internal_id as usize].clone())
    }

    fn all_vectors(&self) -> Array2<f32> {
        let mut out = Array2::zeros((self.vectors.len(), self.total_dim()));
        for (i, v) in self.vectors.iter().enumerate() {
            out.row_mut(i).assign(v);
        }
        out
    }

    fn all_ids(&self) -> Vec<String> {
        self.id_map.values().cloned().collect()
    }

    fn set_normalization(
        &mut self,
        mean: Array1<f32>,
        std: Array1<f32>,
    ) -> Result<(), IndexError> {
        if mean.len() != self.feature_dim || std.len() != self.feature_dim {
            return Err(IndexError::NormalizationShape {
                expected: self.feature_dim,
                actual: if mean.len() != self.feature_dim {
                    mean.len()
                } else {
                    std.len()
                },
            });
        }
        self.norm = Some((mean, std));
        Ok(())
    }

    fn normalization(&self) -> Option<(&Array1<f32>, &Array1<f32>)> {
        self.norm.as_ref().map(|(m, s)| (m, s))
    }

    fn update_normalization(&mut self, matrix: &Array2<f32>) -> Result<(), IndexError> {
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.update_online(matrix.view())?;
            self.norm = Some(tracker.current_stats());
        }
        Ok(())
    }

    fn save(&mut self, path: &Path) -> Result<(), IndexError> {
        let payload = FlatPayload {
            total_dim: self.total_dim(),
            vectors: self.vectors.iter().map(|v| v.to_vec()).collect(),
        };
        let bytes = bincode::serde::encode_to_vec(&payload, bincode::config::standard())?;
        write_atomic(path, &bytes)?;

        let meta = SidecarMeta {
            feature_dim: self.feature_dim,
            time_steps: self.time_steps,
            n_entries: self.len(),
            id_map: self.id_map.clone(),
            next_id: self.next_id,
            norm_means: self.norm.as_ref().map(|(m, _)| m.to_vec()),
            norm_stds: self.norm.as_ref().map(|(_, s)| s.to_vec()),
        };
        write_atomic(&sidecar_path(path), &serde_json::to_vec_pretty(&meta)?)?;

        self.last_save_path = Some(path.to_path_buf());
        info!(path = %path.display(), n_entries = self.len(), "index saved");
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<(), IndexError> {
        if !path.exists() {
            return Err(IndexError::MissingArtifact(path.to_path_buf()));
        }
        let meta_path = sidecar_path(path);
        if !meta_path.exists() {
            return Err(IndexError::MissingArtifact(meta_path));
        }

        let bytes = fs::read(path)?;
        let (payload, _): (FlatPayload, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
        let meta: SidecarMeta = serde_json::from_slice(&fs::read(&meta_path)?)?;

        if payload.total_dim != meta.feature_dim * meta.time_steps {
            return Err(IndexError::DimensionMismatch {
                expected: meta.feature_dim * meta.time_steps,
                actual: payload.total_dim,
            });
        }
        for v in &payload.vectors {
            if v.len() != payload.total_dim {
                return Err(IndexError::DimensionMismatch {
                    expected: payload.total_dim,
                    actual: v.len(),
                });
            }
        }

        self.feature_dim = meta.feature_dim;
        self.time_steps = meta.time_steps;
        self.vectors = payload.vectors.into_iter().map(Array1::from_vec).collect();
        self.id_map = meta.id_map;
        self.next_id = meta.next_id;
        self.norm = match (meta.norm_means, meta.norm_stds) {
            (Some(m), Some(s)) => Some((Array1::from_vec(m), Array1::from_vec(s))),
            _ => None,
        };
        self.last_save_path = Some(path.to_path_buf());

        debug_assert_eq!(meta.n_entries, self.vectors.len());
        info!(path = %path.display(), n_entries = self.len(), "index loaded");
        Ok(())
    }

    fn delete(&mut self) -> Result<(), IndexError> {
        self.vectors.clear();
        self.id_map.clear();
        self.next_id = 0;

        if let Some(path) = self.last_save_path.take() {
            remove_if_present(&path)?;
            remove_if_present(&sidecar_path(&path))?;
            info!(path = %path.display(), "index artifacts removed");
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Write `bytes` to a `.tmp` sibling, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path
        .file_name()
        .map(OsStr::to_os_string)
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

/// `<dir>/<stem>.index` → `<dir>/<stem>_meta.json`.
pub(crate) fn sidecar_path(index_path: &Path) -> PathBuf {
    let stem = index_path
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or_default();
    index_path.with_file_name(format!("{stem}_meta.json"))
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn squared_l2(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Cosine similarity in `[-1, 1]`; 0 when either vector has zero norm.
fn cosine_similarity(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    fn three_entry_index() -> FlatL2Index {
        let mut index = FlatL2Index::create(2, 1, false);
        index.add(arr1(&[0.0, 0.0]).view(), "origin").unwrap();
        index.add(arr1(&[1.0, 0.0]).view(), "east").unwrap();
        index.add(arr1(&[0.0, 5.0]).view(), "north").unwrap();
        index
    }

    // ── add / search ─────────────────────────────────────────────────────────

    #[test]
    fn search_orders_by_ascending_distance() {
        let index = three_entry_index();
        let hits = index.search(arr1(&[0.9, 0.0]).view(), 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].external_id, "east");
        assert_eq!(hits[1].external_id, "origin");
        assert_eq!(hits[2].external_id, "north");
        assert!(hits[0].distance <= hits[1].distance);
        assert!(hits[1].distance <= hits[2].distance);
    }

    #[test]
    fn exact_match_has_zero_distance() {
        let index = three_entry_index();
        let hits = index.search(arr1(&[1.0, 0.0]).view(), 1).unwrap();
        assert_eq!(hits[0].external_id, "east");
        assert!(hits[0].distance.abs() < 1e-9);
    }

    #[test]
    fn k_larger_than_len_returns_all_without_error() {
        let index = three_entry_index();
        let hits = index.search(arr1(&[0.0, 0.0]).view(), 10).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn k_zero_returns_nothing() {
        let index = three_entry_index();
        assert!(index.search(arr1(&[0.0, 0.0]).view(), 0).unwrap().is_empty());
    }

    #[test]
    fn empty_index_search_returns_empty() {
        let index = FlatL2Index::create(2, 1, false);
        let hits = index.search(arr1(&[1.0, 1.0]).view(), 5).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn add_rejects_wrong_dimension() {
        let mut index = FlatL2Index::create(3, 2, false);
        let err = index.add(arr1(&[1.0, 2.0]).view(), "bad").unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 6,
                actual: 2
            }
        ));
    }

    #[test]
    fn search_rejects_wrong_dimension() {
        let index = three_entry_index();
        let err = index.search(arr1(&[1.0]).view(), 1).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn duplicate_external_id_rejected() {
        let mut index = FlatL2Index::create(2, 1, false);
        index.add(arr1(&[1.0, 2.0]).view(), "ep-1").unwrap();
        let err = index.add(arr1(&[3.0, 4.0]).view(), "ep-1").unwrap_err();
        assert!(matches!(err, IndexError::DuplicateId(id) if id == "ep-1"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn internal_ids_are_sequential() {
        let index = three_entry_index();
        assert_eq!(index.all_ids(), vec!["origin", "east", "north"]);
        assert_eq!(index.next_id, 3);
    }

    // ── vector_by_id ─────────────────────────────────────────────────────────

    #[test]
    fn vector_by_id_round_trips() {
        let index = three_entry_index();
        let v = index.vector_by_id("north").unwrap();
        assert_eq!(v, arr1(&[0.0, 5.0]));
        assert!(index.vector_by_id("ghost").is_none());
    }

    // ── brute-force fallback ─────────────────────────────────────────────────

    #[test]
    fn brute_force_orders_by_descending_cosine() {
        let mut index = FlatL2Index::create(2, 1, false);
        index.add(arr1(&[1.0, 0.0]).view(), "aligned").unwrap();
        index.add(arr1(&[0.0, 1.0]).view(), "orthogonal").unwrap();
        index.add(arr1(&[-1.0, 0.0]).view(), "opposite").unwrap();

        let hits = index.brute_force(arr1(&[2.0, 0.0]).view(), 3);
        assert_eq!(hits[0].external_id, "aligned");
        assert_eq!(hits[1].external_id, "orthogonal");
        assert_eq!(hits[2].external_id, "opposite");
        // distance = 1 − similarity
        assert!(hits[0].distance.abs() < 1e-6);
        assert!((hits[1].distance - 1.0).abs() < 1e-6);
        assert!((hits[2].distance - 2.0).abs() < 1e-6);
    }

    #[test]
    fn brute_force_zeroes_nans() {
        let mut index = FlatL2Index::create(2, 1, false);
        index.add(arr1(&[f32::NAN, 1.0]).view(), "nanny").unwrap();
        let hits = index.brute_force(arr1(&[0.0, 1.0]).view(), 1);
        assert_eq!(hits[0].external_id, "nanny");
        assert!(hits[0].distance.abs() < 1e-6);
        assert_eq!(hits[0].vector, arr1(&[0.0, 1.0]));
    }

    // ── normalization ────────────────────────────────────────────────────────

    #[test]
    fn normalize_identity_when_unset() {
        let index = FlatL2Index::create(2, 1, false);
        let m = ndarray::arr2(&[[3.0, 4.0]]);
        assert_eq!(index.normalize_matrix(&m), m);
        assert_eq!(index.denormalize_matrix(&m), m);
    }

    #[test]
    fn normalize_denormalize_round_trip() {
        let mut index = FlatL2Index::create(2, 1, false);
        index
            .set_normalization(arr1(&[1.0, -2.0]), arr1(&[2.0, 4.0]))
            .unwrap();
        let m = ndarray::arr2(&[[3.0, 4.0], [-1.0, 0.0]]);
        let back = index.denormalize_matrix(&index.normalize_matrix(&m));
        for (a, b) in back.iter().zip(m.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn set_normalization_rejects_wrong_length() {
        let mut index = FlatL2Index::create(3, 1, false);
        let err = index
            .set_normalization(arr1(&[0.0]), arr1(&[1.0, 1.0, 1.0]))
            .unwrap_err();
        assert!(matches!(err, IndexError::NormalizationShape { .. }));
    }

    #[test]
    fn update_normalization_noop_without_online_tracker() {
        let mut index = FlatL2Index::create(2, 1, false);
        index
            .update_normalization(&ndarray::arr2(&[[1.0, 2.0], [3.0, 4.0]]))
            .unwrap();
        assert!(index.normalization().is_none());
    }

    #[test]
    fn update_normalization_refreshes_constants() {
        let mut index = FlatL2Index::create(2, 1, true);
        index
            .update_normalization(&ndarray::arr2(&[[1.0, 10.0], [3.0, 30.0]]))
            .unwrap();
        let (mean, _) = index.normalization().unwrap();
        assert!((mean[0] - 2.0).abs() < 1e-6);
        assert!((mean[1] - 20.0).abs() < 1e-6);
    }

    // ── persistence ──────────────────────────────────────────────────────────

    #[test]
    fn save_load_preserves_queryable_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("states.index");

        let mut index = three_entry_index();
        index
            .set_normalization(arr1(&[0.5, 0.5]), arr1(&[2.0, 2.0]))
            .unwrap();
        index.save(&path).unwrap();
        assert!(path.exists());
        assert!(sidecar_path(&path).exists());

        let mut restored = FlatL2Index::create(2, 1, false);
        restored.load(&path).unwrap();

        assert_eq!(restored.len(), 3);
        assert_eq!(restored.all_ids(), index.all_ids());
        assert_eq!(restored.next_id, index.next_id);

        let before = index.search(arr1(&[0.9, 0.1]).view(), 3).unwrap();
        let after = restored.search(arr1(&[0.9, 0.1]).view(), 3).unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert_eq!(a.external_id, b.external_id);
            assert!((a.distance - b.distance).abs() < 1e-9);
        }

        let (mean, std) = restored.normalization().unwrap();
        assert_eq!(mean, &arr1(&[0.5, 0.5]));
        assert_eq!(std, &arr1(&[2.0, 2.0]));
    }

    #[test]
    fn save_leaves_no_tmp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actions.index");
        let mut index = three_entry_index();
        index.save(&path).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension() == Some(OsStr::new("tmp")))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn load_missing_artifact_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = FlatL2Index::create(2, 1, false);
        let err = index.load(&dir.path().join("ghost.index")).unwrap_err();
        assert!(matches!(err, IndexError::MissingArtifact(_)));
    }

    #[test]
    fn delete_clears_memory_and_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("states.index");

        let mut index = three_entry_index();
        index.save(&path).unwrap();
        index.delete().unwrap();

        assert!(index.is_empty());
        assert_eq!(index.next_id, 0);
        assert!(!path.exists());
        assert!(!sidecar_path(&path).exists());

        // Internal IDs restart only after a full delete.
        index.add(arr1(&[1.0, 1.0]).view(), "fresh").unwrap();
        assert_eq!(index.all_ids(), vec!["fresh"]);
    }

    #[test]
    fn delete_without_prior_save_is_memory_only() {
        let mut index = three_entry_index();
        index.delete().unwrap();
        assert!(index.is_empty());
    }

    // ── helpers ──────────────────────────────────────────────────────────────

    #[test]
    fn sidecar_path_replaces_extension() {
        let p = sidecar_path(Path::new("/data/UCSD Kitchen-xArm-states.index"));
        assert_eq!(
            p,
            Path::new("/data/UCSD Kitchen-xArm-states_meta.json")
        );
    }

    #[test]
    fn cosine_zero_norm_is_zero() {
        assert_eq!(
            cosine_similarity(arr1(&[0.0, 0.0]).view(), arr1(&[1.0, 2.0]).view()),
            0.0
        );
    }
}
