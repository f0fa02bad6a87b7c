//! `epibank-types` – shared domain vocabulary for the EpiBank stack.
//!
//! EpiBank ingests robot-manipulation episodes and keeps two views of each
//! one: a structured metadata record (`epibank-episodes`) and a set of
//! fixed-length embeddings (`epibank-embedding`).  The two views share a
//! single namespace: the episode's UUID, stringified, is the *external ID*
//! under which every embedding of that episode is filed.
//!
//! This crate defines:
//!
//! - [`Episode`] – the metadata record for one recorded rollout.
//! - [`IndexField`] – which embedded quantity an index holds (state
//!   trajectories, action trajectories, or text embeddings).
//! - [`index_name`] – the canonical `"{dataset}-{embodiment}-{field}"`
//!   derivation that names a vector index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical number of time steps every trajectory index is resampled to.
pub const STANDARD_TIME_STEPS: usize = 100;

// ─────────────────────────────────────────────────────────────────────────────
// IndexField
// ─────────────────────────────────────────────────────────────────────────────

/// The embedded quantity a vector index holds.
///
/// Trajectory fields ([`States`][IndexField::States],
/// [`Actions`][IndexField::Actions]) store time-series resampled to
/// [`STANDARD_TIME_STEPS`]; the text fields store single flat vectors
/// (`time_steps = 1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexField {
    /// Proprioceptive state trajectory of the episode.
    States,
    /// Commanded action trajectory of the episode.
    Actions,
    /// Embedding of the natural-language task instruction.
    TaskLanguageInstruction,
    /// Embedding of the model-estimated episode description.
    DescriptionEstimate,
}

/// The two time-series fields every embodiment produces.
pub const TRAJECTORY_FIELDS: [IndexField; 2] = [IndexField::States, IndexField::Actions];

/// The flat text-embedding fields shared across all embodiments.
pub const META_FIELDS: [IndexField; 2] = [
    IndexField::TaskLanguageInstruction,
    IndexField::DescriptionEstimate,
];

impl IndexField {
    /// Suffix used in index names and on-disk file stems.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexField::States => "states",
            IndexField::Actions => "actions",
            IndexField::TaskLanguageInstruction => "task_language_instruction",
            IndexField::DescriptionEstimate => "description_estimate",
        }
    }

    /// Whether this field carries a time-series (as opposed to a flat vector).
    pub fn is_trajectory(&self) -> bool {
        matches!(self, IndexField::States | IndexField::Actions)
    }
}

impl std::fmt::Display for IndexField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derive the canonical index name for a dataset/embodiment/field triple.
///
/// Trajectory indices are scoped per dataset and embodiment, so a 7-DoF
/// arm's action space is never interpolated against a mobile base's.  Text
/// embeddings come from one shared model space and live in a single global
/// index per field, regardless of dataset.
///
/// ```rust
/// use epibank_types::{index_name, IndexField};
///
/// assert_eq!(
///     index_name("UCSD Kitchen", "xArm", IndexField::States),
///     "UCSD Kitchen-xArm-states",
/// );
/// assert_eq!(
///     index_name("UCSD Kitchen", "xArm", IndexField::DescriptionEstimate),
///     "description_estimate",
/// );
/// ```
pub fn index_name(dataset_formalname: &str, embodiment: &str, field: IndexField) -> String {
    if field.is_trajectory() {
        format!("{dataset_formalname}-{embodiment}-{}", field.as_str())
    } else {
        field.as_str().to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Episode
// ─────────────────────────────────────────────────────────────────────────────

/// Structured metadata for one recorded robot-manipulation episode.
///
/// The stringified [`id`][Episode::id] is the external ID used by the vector
/// store; keeping the two keyed identically is what makes reconciliation
/// between the stores possible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Unique identifier; `id.to_string()` is the vector-store external ID.
    pub id: Uuid,
    /// Human-readable dataset name (e.g. `"UCSD Kitchen"`).
    pub dataset_formalname: String,
    /// Robot embodiment label (e.g. `"xArm"`, `"Franka"`).
    pub embodiment: String,
    /// Natural-language task instruction recorded with the episode.
    pub task_instruction: String,
    /// Model-estimated description of what actually happened, if annotated.
    pub description: Option<String>,
    /// Wall-clock time at which the episode entered the bank.
    pub ingested_at: DateTime<Utc>,
    /// Caller-supplied extras (success labels, source file, frame counts…).
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Episode {
    /// Construct a new [`Episode`] with a fresh UUID and the current UTC time.
    pub fn new(
        dataset_formalname: impl Into<String>,
        embodiment: impl Into<String>,
        task_instruction: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            dataset_formalname: dataset_formalname.into(),
            embodiment: embodiment.into(),
            task_instruction: task_instruction.into(),
            description: None,
            ingested_at: Utc::now(),
            extra: serde_json::Map::new(),
        }
    }

    /// The external ID under which this episode's embeddings are filed.
    pub fn external_id(&self) -> String {
        self.id.to_string()
    }

    /// The name of the index holding this episode's embedding for `field`.
    pub fn index_name(&self, field: IndexField) -> String {
        index_name(&self.dataset_formalname, &self.embodiment, field)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
