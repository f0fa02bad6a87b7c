//! [`IndexManager`] – a name-addressed multiplexer over many vector indices.
//!
//! Callers hand the manager a `(steps × feature_dim)` matrix under an index
//! name; the manager resamples it to the index's canonical step count by
//! per-channel linear interpolation, applies normalization, flattens it
//! row-major, and delegates to the named index.  Search runs the same
//! pipeline forward and inverts it (reshape + denormalize) on each hit.
//!
//! The manager owns one base directory.  `save` writes every index's two
//! artifacts plus a `manager_metadata.json` describing all indices; `open`
//! reads that metadata back and reconstructs each index strictly from the
//! recorded dimensions before delegating to the index's own `load`.
//!
//! A named index moves through: absent → initialized (empty) → populated →
//! (deleted → absent).  Writes to an absent name create the index lazily;
//! reads of an initialized-but-empty index report empty results, never
//! errors.
//!
//! All operations are synchronous and single-threaded; the usage contract
//! is one writer process per base directory at a time.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, Array3, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::IndexError;
use crate::index::{FlatL2Index, VectorIndex, sidecar_path, write_atomic};

const MANAGER_METADATA_FILE: &str = "manager_metadata.json";

// ─────────────────────────────────────────────────────────────────────────────
// Metadata and result types
// ─────────────────────────────────────────────────────────────────────────────

/// Descriptive statistics the manager keeps per index, persisted in
/// `manager_metadata.json`.  Kept deliberately denormalized from the index's
/// own state so an operator can inspect the bank without loading vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub feature_dim: usize,
    pub time_steps: usize,
    pub n_entries: usize,
    pub has_normalization: bool,
    pub online_norm: bool,
    /// Caller-supplied extras, flattened into the same JSON object.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One matrix-level search result.
#[derive(Debug, Clone)]
pub struct MatrixHit {
    pub distance: f32,
    pub external_id: String,
    /// The stored entry, reshaped to `(time_steps, feature_dim)` and
    /// denormalized back into caller units.
    pub matrix: Array2<f32>,
}

/// Every entry of one index, reshaped back to matrices.
#[derive(Debug, Clone)]
pub struct MatrixBatch {
    /// Shape `(n_entries, time_steps, feature_dim)`, insertion order.
    pub arrays: Array3<f32>,
    /// External IDs, aligned with `arrays`.
    pub ids: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// IndexManager
// ─────────────────────────────────────────────────────────────────────────────

/// Owns a directory of vector indices and the metadata describing them.
///
/// Generic over the index backend; [`open`][IndexManager::open] picks the
/// exact-scan [`FlatL2Index`], [`open_with`][IndexManager::open_with]
/// accepts any [`VectorIndex`].
pub struct IndexManager<I: VectorIndex = FlatL2Index> {
    base_dir: PathBuf,
    online_norm: bool,
    indices: BTreeMap<String, I>,
    metadata: BTreeMap<String, IndexMetadata>,
}

impl IndexManager<FlatL2Index> {
    /// Open (or create) a bank at `base_dir` backed by exact L2 indices.
    ///
    /// Existing indices found under the directory are loaded eagerly.  With
    /// `online_norm` set, every `add_matrix` updates the target index's
    /// streaming normalization statistics before normalizing.
    pub fn open(base_dir: impl AsRef<Path>, online_norm: bool) -> Result<Self, IndexError> {
        Self::open_with(base_dir, online_norm)
    }
}

impl<I: VectorIndex> IndexManager<I> {
    /// [`open`][IndexManager::open] for an arbitrary backend.
    pub fn open_with(base_dir: impl AsRef<Path>, online_norm: bool) -> Result<Self, IndexError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;

        let mut manager = Self {
            base_dir,
            online_norm,
            indices: BTreeMap::new(),
            metadata: BTreeMap::new(),
        };
        manager.load()?;
        Ok(manager)
    }

    /// Directory this manager persists into.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Names of all known indices, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.indices.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    /// Metadata for one index, or `None` if the name is unknown.
    pub fn index_stats(&self, name: &str) -> Option<&IndexMetadata> {
        self.metadata.get(name)
    }

    /// All external IDs stored in `name`, in insertion order.
    pub fn ids(&self, name: &str) -> Result<Vec<String>, IndexError> {
        let index = self
            .indices
            .get(name)
            .ok_or_else(|| IndexError::UnknownIndex(name.to_string()))?;
        Ok(index.all_ids())
    }

    // ── index lifecycle ──────────────────────────────────────────────────────

    /// Create an empty index under `name`.
    ///
    /// Fails with [`IndexError::IndexExists`] when the name is taken; an
    /// existing index is never silently overwritten.
    pub fn init_index(
        &mut self,
        name: &str,
        feature_dim: usize,
        time_steps: usize,
        norm: Option<(Array1<f32>, Array1<f32>)>,
        extra: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<(), IndexError> {
        if self.indices.contains_key(name) {
            return Err(IndexError::IndexExists(name.to_string()));
        }
        if feature_dim == 0 || time_steps == 0 {
            return Err(IndexError::InvalidDimensions {
                feature_dim,
                time_steps,
            });
        }

        let mut index = I::create(feature_dim, time_steps, self.online_norm);
        let has_normalization = norm.is_some();
        if let Some((mean, std)) = norm {
            index.set_normalization(mean, std)?;
        }

        self.indices.insert(name.to_string(), index);
        self.metadata.insert(
            name.to_string(),
            IndexMetadata {
                feature_dim,
                time_steps,
                n_entries: 0,
                has_normalization,
                online_norm: self.online_norm,
                extra: extra.unwrap_or_default(),
            },
        );
        info!(name, feature_dim, time_steps, "index initialized");
        Ok(())
    }

    /// Remove `name` from memory, delete its artifacts, and immediately
    /// re-persist the manager metadata so a crash cannot resurrect a stale
    /// entry pointing at missing files.
    pub fn delete_index(&mut self, name: &str) -> Result<(), IndexError> {
        let known = self.indices.contains_key(name) || self.metadata.contains_key(name);
        if !known {
            return Err(IndexError::UnknownIndex(name.to_string()));
        }

        if let Some(mut index) = self.indices.remove(name) {
            index.delete()?;
        }
        // The index may never have been saved in this process; sweep the
        // manager-owned paths as well.
        let path = self.index_path(name);
        for p in [path.clone(), sidecar_path(&path)] {
            match fs::remove_file(&p) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }

        self.metadata.remove(name);
        self.persist_metadata()?;
        info!(name, "index deleted");
        Ok(())
    }

    // ── adding entries ───────────────────────────────────────────────────────

    /// Add a flat vector under `name`, creating a `time_steps = 1` index
    /// from the vector's length if the name is unseen.
    pub fn add_vector(
        &mut self,
        name: &str,
        vector: ArrayView1<'_, f32>,
        external_id: &str,
    ) -> Result<(), IndexError> {
        if !self.indices.contains_key(name) {
            self.init_index(name, vector.len(), 1, None, None)?;
        }

        let index = self.indices.get_mut(name).expect("initialized above");
        index.add(vector, external_id)?;

        let meta = self.metadata.get_mut(name).expect("metadata in lockstep");
        meta.n_entries += 1;
        debug_assert_eq!(meta.n_entries, index.len());
        debug!(name, external_id, "vector added");
        Ok(())
    }

    /// Add a `(steps × feature_dim)` matrix under `name`.
    ///
    /// Unseen names get an index whose canonical geometry is the matrix's
    /// own shape.  The matrix is interpolated to the index's `time_steps`,
    /// folded into the online normalization statistics (when enabled),
    /// normalized, and flattened row-major.
    pub fn add_matrix(
        &mut self,
        name: &str,
        matrix: &Array2<f32>,
        external_id: &str,
    ) -> Result<(), IndexError> {
        if matrix.nrows() == 0 {
            return Err(IndexError::EmptyMatrix);
        }
        if !self.indices.contains_key(name) {
            self.init_index(name, matrix.ncols(), matrix.nrows(), None, None)?;
        }

        let flat = {
            let index = self.indices.get_mut(name).expect("initialized above");
            if matrix.ncols() != index.feature_dim() {
                return Err(IndexError::FeatureMismatch {
                    expected: index.feature_dim(),
                    actual: matrix.ncols(),
                });
            }

            let interpolated = interpolate_rows(matrix, index.time_steps());
            index.update_normalization(&interpolated)?;
            let normalized = index.normalize_matrix(&interpolated);
            flatten(&normalized)
        };

        self.add_vector(name, flat.view(), external_id)
    }

    // ── queries ──────────────────────────────────────────────────────────────

    /// Search `name` with a query matrix run through the same
    /// interpolate-and-normalize pipeline as [`add_matrix`][Self::add_matrix].
    ///
    /// Hits come back reshaped to `(time_steps, feature_dim)` and
    /// denormalized.  An initialized-but-empty index yields an empty list.
    pub fn search_matrix(
        &self,
        name: &str,
        query: &Array2<f32>,
        k: usize,
    ) -> Result<Vec<MatrixHit>, IndexError> {
        if query.nrows() == 0 {
            return Err(IndexError::EmptyMatrix);
        }
        let index = self
            .indices
            .get(name)
            .ok_or_else(|| IndexError::UnknownIndex(name.to_string()))?;
        if query.ncols() != index.feature_dim() {
            return Err(IndexError::FeatureMismatch {
                expected: index.feature_dim(),
                actual: query.ncols(),
            });
        }

        let interpolated = interpolate_rows(query, index.time_steps());
        let normalized = index.normalize_matrix(&interpolated);
        let hits = index.search(flatten(&normalized).view(), k)?;

        hits.into_iter()
            .map(|hit| {
                let matrix = Array2::from_shape_vec(
                    (index.time_steps(), index.feature_dim()),
                    hit.vector.to_vec(),
                )
                .expect("stored vectors always have total_dim elements");
                Ok(MatrixHit {
                    distance: hit.distance,
                    external_id: hit.external_id,
                    matrix: index.denormalize_matrix(&matrix),
                })
            })
            .collect()
    }

    /// The stored entry for `external_id` in `name`, reshaped and
    /// denormalized; `None` when the ID is absent.
    pub fn matrix_by_id(
        &self,
        name: &str,
        external_id: &str,
    ) -> Result<Option<Array2<f32>>, IndexError> {
        let index = self
            .indices
            .get(name)
            .ok_or_else(|| IndexError::UnknownIndex(name.to_string()))?;

        Ok(index.vector_by_id(external_id).map(|v| {
            let matrix =
                Array2::from_shape_vec((index.time_steps(), index.feature_dim()), v.to_vec())
                    .expect("stored vectors always have total_dim elements");
            index.denormalize_matrix(&matrix)
        }))
    }

    /// Every entry of the requested indices (all indices when `names` is
    /// `None`), reshaped back to matrices.  Indices with zero entries map
    /// to `None`, distinguishing "empty index" from "no such index" (absent
    /// names are simply not present in the result).
    pub fn all_matrices(&self, names: Option<&[&str]>) -> BTreeMap<String, Option<MatrixBatch>> {
        self.indices
            .iter()
            .filter(|(name, _)| names.is_none_or(|ns| ns.contains(&name.as_str())))
            .map(|(name, index)| {
                let batch = if index.is_empty() {
                    None
                } else {
                    let n = index.len();
                    let flat: Vec<f32> = index.all_vectors().into_iter().collect();
                    let arrays =
                        Array3::from_shape_vec((n, index.time_steps(), index.feature_dim()), flat)
                            .expect("index vectors are rectangular");
                    Some(MatrixBatch {
                        arrays,
                        ids: index.all_ids(),
                    })
                };
                (name.clone(), batch)
            })
            .collect()
    }

    /// Install normalization constants on an existing index.
    pub fn set_normalization(
        &mut self,
        name: &str,
        mean: Array1<f32>,
        std: Array1<f32>,
    ) -> Result<(), IndexError> {
        let index = self
            .indices
            .get_mut(name)
            .ok_or_else(|| IndexError::UnknownIndex(name.to_string()))?;
        index.set_normalization(mean, std)?;
        self.metadata
            .get_mut(name)
            .expect("metadata in lockstep")
            .has_normalization = true;
        Ok(())
    }

    /// Cross-index averages of every numeric metadata field, keyed
    /// `avg_<field>`.  Booleans count as 0/1, so `avg_has_normalization`
    /// reads as the fraction of indices with stats installed.
    pub fn overall_stats(&self) -> BTreeMap<String, f64> {
        let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for meta in self.metadata.values() {
            let Ok(value) = serde_json::to_value(meta) else {
                continue;
            };
            let Some(fields) = value.as_object() else {
                continue;
            };
            for (key, v) in fields {
                let num = match v {
                    serde_json::Value::Number(n) => n.as_f64(),
                    serde_json::Value::Bool(b) => Some(*b as u8 as f64),
                    _ => None,
                };
                if let Some(num) = num {
                    let entry = sums.entry(key.clone()).or_insert((0.0, 0));
                    entry.0 += num;
                    entry.1 += 1;
                }
            }
        }
        sums.into_iter()
            .map(|(key, (sum, count))| (format!("avg_{key}"), sum / count as f64))
            .collect()
    }

    // ── persistence ──────────────────────────────────────────────────────────

    /// Persist every index plus the manager metadata.
    ///
    /// Each file is written atomically, but the pass over indices is not: a
    /// crash mid-save can leave some indices updated and others stale.  An
    /// external reconciliation pass owns recovery.
    pub fn save(&mut self) -> Result<(), IndexError> {
        let names: Vec<String> = self.indices.keys().cloned().collect();
        for name in names {
            self.save_index(&name)?;
        }
        self.persist_metadata()?;
        info!(base_dir = %self.base_dir.display(), "manager saved");
        Ok(())
    }

    /// Persist a single index's two artifacts.
    pub fn save_index(&mut self, name: &str) -> Result<(), IndexError> {
        let path = self.index_path(name);
        let index = self
            .indices
            .get_mut(name)
            .ok_or_else(|| IndexError::UnknownIndex(name.to_string()))?;
        index.save(&path)?;

        let meta = self.metadata.get_mut(name).expect("metadata in lockstep");
        meta.n_entries = index.len();
        meta.has_normalization = index.normalization().is_some();
        Ok(())
    }

    fn persist_metadata(&self) -> Result<(), IndexError> {
        let path = self.base_dir.join(MANAGER_METADATA_FILE);
        write_atomic(&path, &serde_json::to_vec_pretty(&self.metadata)?)?;
        Ok(())
    }

    /// Read `manager_metadata.json` and reconstruct every recorded index.
    ///
    /// Dimensions come from the metadata, never inferred from file
    /// contents.  Index files on disk with no metadata entry are skipped.
    fn load(&mut self) -> Result<(), IndexError> {
        let metadata_path = self.base_dir.join(MANAGER_METADATA_FILE);
        if metadata_path.exists() {
            self.metadata = serde_json::from_slice(&fs::read(&metadata_path)?)?;
        }

        for (name, meta) in self.metadata.clone() {
            let path = self.index_path(&name);
            if !path.exists() {
                warn!(name = %name, "metadata references an index with no artifact on disk");
                continue;
            }
            let mut index = I::create(meta.feature_dim, meta.time_steps, self.online_norm);
            index.load(&path)?;
            self.metadata
                .get_mut(&name)
                .expect("iterating a clone of metadata")
                .has_normalization = index.normalization().is_some();
            self.indices.insert(name, index);
        }

        for entry in fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if path.extension() == Some(std::ffi::OsStr::new("index")) {
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default();
                if !self.metadata.contains_key(stem) {
                    warn!(name = stem, "index file with no metadata entry ignored");
                }
            }
        }
        Ok(())
    }

    fn index_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{name}.index"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Interpolation
// ─────────────────────────────────────────────────────────────────────────────

/// Resample `matrix` to `target_steps` rows by per-column piecewise-linear
/// interpolation over evenly spaced parameters in `[0, 1]`.
///
/// Identity when the row count already matches.  Linear on purpose: the
/// behavior stays predictable for nearly-linear trajectories, and the
/// round-trip error for them is negligible.
fn interpolate_rows(matrix: &Array2<f32>, target_steps: usize) -> Array2<f32> {
    let source_steps = matrix.nrows();
    if source_steps == target_steps {
        return matrix.clone();
    }

    Array2::from_shape_fn((target_steps, matrix.ncols()), |(t, c)| {
        // Parameter of target row t in [0, 1], mapped onto the source grid.
        let u = if target_steps > 1 {
            t as f32 / (target_steps - 1) as f32
        } else {
            0.0
        };
        let x = u * (source_steps - 1) as f32;
        let lo = x.floor() as usize;
        let hi = (lo + 1).min(source_steps - 1);
        let frac = x - lo as f32;
        matrix[[lo, c]] * (1.0 - frac) + matrix[[hi, c]] * frac
    })
}

/// Row-major flatten of a matrix into a single vector.
fn flatten(matrix: &Array2<f32>) -> Array1<f32> {
    Array1::from_iter(matrix.iter().copied())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
