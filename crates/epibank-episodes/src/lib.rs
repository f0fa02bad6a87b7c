//! `epibank-episodes` – the relational side of the episode bank.
//!
//! Embeddings answer "what is similar"; this crate answers "what exactly
//! happened": one SQLite row per episode, keyed by the same external ID
//! the vector indices use.
//!
//! # Modules
//!
//! - [`store`] – [`EpisodeStore`][store::EpisodeStore]: a local SQLite
//!   table of [`Episode`][epibank_types::Episode] records.
//! - [`reconcile`] – read-only drift detection between the episode table
//!   and an [`IndexManager`][epibank_embedding::IndexManager].  There is no
//!   transaction spanning the two stores; a periodic reconciliation pass is
//!   the accepted mitigation, and this module produces its work list.

pub mod reconcile;
pub mod store;

pub use reconcile::{HealReport, IndexReport, find_heal_targets};
pub use store::{EpisodeStore, EpisodeStoreError};
