//! Drift detection between the episode table and the vector indices.
//!
//! There is no transaction spanning SQLite and the embedding directory, so
//! a crash during ingestion can leave an episode row without embeddings, or
//! embeddings whose episode row never landed.  [`find_heal_targets`]
//! diagnoses both directions and hands back a work list; actually
//! re-embedding the missing entries (or deleting orphans) is the caller's
//! decision.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use epibank_embedding::{IndexManager, VectorIndex};
use epibank_types::IndexField;

use crate::store::{EpisodeStore, EpisodeStoreError};

// ─────────────────────────────────────────────────────────────────────────────
// Report types
// ─────────────────────────────────────────────────────────────────────────────

/// Drift found for one index name.
#[derive(Debug, Clone)]
pub struct IndexReport {
    pub index_name: String,
    /// The index does not exist at all; every expected ID is missing.
    pub index_absent: bool,
    /// Episode IDs that should have an entry in this index but do not.
    pub missing: Vec<String>,
    /// Entry IDs present in the index with no matching episode row.
    pub orphaned: Vec<String>,
}

impl IndexReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.orphaned.is_empty()
    }
}

/// Full cross-store reconciliation report.
#[derive(Debug, Clone, Default)]
pub struct HealReport {
    pub reports: Vec<IndexReport>,
}

impl HealReport {
    pub fn is_clean(&self) -> bool {
        self.reports.iter().all(IndexReport::is_clean)
    }

    pub fn total_missing(&self) -> usize {
        self.reports.iter().map(|r| r.missing.len()).sum()
    }

    pub fn total_orphaned(&self) -> usize {
        self.reports.iter().map(|r| r.orphaned.len()).sum()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reconciliation
// ─────────────────────────────────────────────────────────────────────────────

/// Compare every episode against the indices it should appear in.
///
/// For each episode and each of `fields`, the expected index name is
/// derived the same way ingestion derives it; the report then lists, per
/// index, which expected IDs are absent and which stored IDs are orphaned.
/// Reads both stores, mutates neither.
pub fn find_heal_targets<I: VectorIndex>(
    store: &EpisodeStore,
    manager: &IndexManager<I>,
    fields: &[IndexField],
) -> Result<HealReport, EpisodeStoreError> {
    let episodes = store.all_episodes()?;
    let known_ids: BTreeSet<String> = episodes.iter().map(|e| e.external_id()).collect();

    // Index name → IDs that ingestion should have filed there.
    let mut expected: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for episode in &episodes {
        for &field in fields {
            expected
                .entry(episode.index_name(field))
                .or_default()
                .insert(episode.external_id());
        }
    }

    let mut reports = Vec::new();
    for (index_name, wanted) in expected {
        let report = if !manager.contains(&index_name) {
            IndexReport {
                index_name,
                index_absent: true,
                missing: wanted.into_iter().collect(),
                orphaned: Vec::new(),
            }
        } else {
            let stored: BTreeSet<String> = manager
                .ids(&index_name)
                .expect("contains() checked above")
                .into_iter()
                .collect();
            IndexReport {
                missing: wanted.difference(&stored).cloned().collect(),
                orphaned: stored.difference(&known_ids).cloned().collect(),
                index_absent: false,
                index_name,
            }
        };
        reports.push(report);
    }

    let report = HealReport { reports };
    info!(
        missing = report.total_missing(),
        orphaned = report.total_orphaned(),
        "reconciliation pass finished"
    );
    Ok(report)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use epibank_types::{Episode, TRAJECTORY_FIELDS};
    use ndarray::Array2;
    use tempfile::tempdir;

    fn traj(seed: f32) -> Array2<f32> {
        Array2::from_shape_fn((8, 3), |(t, c)| seed + t as f32 + c as f32)
    }

    /// Ingest one episode fully: metadata row plus both trajectory indices.
    fn ingest(
        store: &EpisodeStore,
        manager: &mut IndexManager,
        episode: &Episode,
        seed: f32,
    ) {
        store.put(episode).unwrap();
        for field in TRAJECTORY_FIELDS {
            manager
                .add_matrix(&episode.index_name(field), &traj(seed), &episode.external_id())
                .unwrap();
        }
    }

    #[test]
    fn fully_ingested_bank_is_clean() {
        let dir = tempdir().unwrap();
        let store = EpisodeStore::open_in_memory().unwrap();
        let mut manager = IndexManager::open(dir.path(), false).unwrap();

        let ep = Episode::new("UCSD Kitchen", "xArm", "open the cabinet");
        ingest(&store, &mut manager, &ep, 0.0);

        let report = find_heal_targets(&store, &manager, &TRAJECTORY_FIELDS).unwrap();
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(report.reports.len(), 2);
    }

    #[test]
    fn missing_embedding_is_reported() {
        let dir = tempdir().unwrap();
        let store = EpisodeStore::open_in_memory().unwrap();
        let mut manager = IndexManager::open(dir.path(), false).unwrap();

        let complete = Episode::new("UCSD Kitchen", "xArm", "open");
        ingest(&store, &mut manager, &complete, 0.0);

        // Row landed, embeddings never did.
        let half = Episode::new("UCSD Kitchen", "xArm", "close");
        store.put(&half).unwrap();

        let report = find_heal_targets(&store, &manager, &TRAJECTORY_FIELDS).unwrap();
        assert!(!report.is_clean());
        assert_eq!(report.total_missing(), 2); // states + actions
        for r in &report.reports {
            assert_eq!(r.missing, vec![half.external_id()]);
            assert!(!r.index_absent);
        }
    }

    #[test]
    fn absent_index_reports_every_episode() {
        let dir = tempdir().unwrap();
        let store = EpisodeStore::open_in_memory().unwrap();
        let manager = IndexManager::open(dir.path(), false).unwrap();

        store
            .put(&Episode::new("CMU Stretch", "Stretch", "push"))
            .unwrap();
        store
            .put(&Episode::new("CMU Stretch", "Stretch", "pull"))
            .unwrap();

        let report = find_heal_targets(&store, &manager, &TRAJECTORY_FIELDS).unwrap();
        assert_eq!(report.reports.len(), 2);
        for r in &report.reports {
            assert!(r.index_absent);
            assert_eq!(r.missing.len(), 2);
        }
    }

    #[test]
    fn orphaned_embedding_is_reported() {
        let dir = tempdir().unwrap();
        let store = EpisodeStore::open_in_memory().unwrap();
        let mut manager = IndexManager::open(dir.path(), false).unwrap();

        let ep = Episode::new("NYU ROT", "UR5", "rotate");
        ingest(&store, &mut manager, &ep, 0.0);

        // An embedding whose episode row never landed.
        let ghost = Episode::new("NYU ROT", "UR5", "vanished");
        manager
            .add_matrix(
                &ghost.index_name(IndexField::States),
                &traj(5.0),
                &ghost.external_id(),
            )
            .unwrap();

        let report = find_heal_targets(&store, &manager, &TRAJECTORY_FIELDS).unwrap();
        let states = report
            .reports
            .iter()
            .find(|r| r.index_name.ends_with("-states"))
            .unwrap();
        assert_eq!(states.orphaned, vec![ghost.external_id()]);
        assert!(states.missing.is_empty());
    }

    #[test]
    fn meta_fields_point_at_global_indices() {
        let dir = tempdir().unwrap();
        let store = EpisodeStore::open_in_memory().unwrap();
        let mut manager = IndexManager::open(dir.path(), false).unwrap();

        let ep = Episode::new("Austin VIOLA", "Franka", "stack the bowls");
        store.put(&ep).unwrap();
        manager
            .add_vector(
                "task_language_instruction",
                ndarray::arr1(&[0.1, 0.2]).view(),
                &ep.external_id(),
            )
            .unwrap();

        let report = find_heal_targets(
            &store,
            &manager,
            &[IndexField::TaskLanguageInstruction],
        )
        .unwrap();
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(report.reports[0].index_name, "task_language_instruction");
    }
}
