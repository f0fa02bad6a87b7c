//! SQLite-backed episode metadata store.
//!
//! Persists one row per [`Episode`] to a local SQLite database.  The row
//! key is the episode UUID in string form – identical to the external ID
//! the vector indices use, which is what makes cross-store reconciliation
//! possible at all.
//!
//! # Storage layout
//!
//! A single table `episodes` is created (if it does not already exist):
//!
//! | column             | type | description                              |
//! |--------------------|------|------------------------------------------|
//! | id                 | TEXT | UUID v4 primary key                      |
//! | dataset_formalname | TEXT | Human-readable dataset name              |
//! | embodiment         | TEXT | Robot embodiment label                   |
//! | task_instruction   | TEXT | Natural-language task instruction        |
//! | description        | TEXT | Model-estimated description (nullable)   |
//! | ingested_at        | TEXT | RFC-3339 ingestion time (UTC)            |
//! | extra              | TEXT | Caller extras as a JSON object           |

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use epibank_types::Episode;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from episode store operations.
#[derive(Error, Debug)]
pub enum EpisodeStoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid stored record: {0}")]
    Corrupt(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// EpisodeStore
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed store of [`Episode`] records.
///
/// # Example
///
/// ```rust
/// use epibank_episodes::EpisodeStore;
/// use epibank_types::Episode;
///
/// let store = EpisodeStore::open_in_memory().unwrap();
/// let ep = Episode::new("UCSD Kitchen", "xArm", "open the cabinet");
/// store.put(&ep).unwrap();
///
/// assert_eq!(store.count().unwrap(), 1);
/// assert_eq!(store.get(ep.id).unwrap().unwrap().task_instruction, "open the cabinet");
/// ```
pub struct EpisodeStore {
    conn: Connection,
}

impl EpisodeStore {
    /// Open (or create) a persistent SQLite database at `path`.
    pub fn open(path: &str) -> Result<Self, EpisodeStoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, EpisodeStoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), EpisodeStoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS episodes (
                id                 TEXT NOT NULL PRIMARY KEY,
                dataset_formalname TEXT NOT NULL,
                embodiment         TEXT NOT NULL,
                task_instruction   TEXT NOT NULL,
                description        TEXT,
                ingested_at        TEXT NOT NULL,
                extra              TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Persist an [`Episode`], replacing any existing row with the same ID.
    pub fn put(&self, episode: &Episode) -> Result<(), EpisodeStoreError> {
        let extra = serde_json::Value::Object(episode.extra.clone()).to_string();
        self.conn.execute(
            "INSERT OR REPLACE INTO episodes
                 (id, dataset_formalname, embodiment, task_instruction,
                  description, ingested_at, extra)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                episode.id.to_string(),
                episode.dataset_formalname,
                episode.embodiment,
                episode.task_instruction,
                episode.description,
                episode.ingested_at.to_rfc3339(),
                extra,
            ],
        )?;
        debug!(id = %episode.id, dataset = %episode.dataset_formalname, "episode stored");
        Ok(())
    }

    /// Fetch one episode by UUID, or `None` if absent.
    pub fn get(&self, id: Uuid) -> Result<Option<Episode>, EpisodeStoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, dataset_formalname, embodiment, task_instruction,
                    description, ingested_at, extra
             FROM episodes WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(decode_row(row)?)),
            None => Ok(None),
        }
    }

    /// All stored episodes ordered by ingestion time (oldest first).
    pub fn all_episodes(&self) -> Result<Vec<Episode>, EpisodeStoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, dataset_formalname, embodiment, task_instruction,
                    description, ingested_at, extra
             FROM episodes ORDER BY ingested_at ASC",
        )?;
        let mut rows = stmt.query([])?;
        let mut episodes = Vec::new();
        while let Some(row) = rows.next()? {
            episodes.push(decode_row(row)?);
        }
        Ok(episodes)
    }

    /// All external IDs (stringified UUIDs), ordered by ingestion time.
    pub fn all_ids(&self) -> Result<Vec<String>, EpisodeStoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM episodes ORDER BY ingested_at ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }

    /// External IDs of every episode in `dataset_formalname`.
    pub fn ids_for_dataset(
        &self,
        dataset_formalname: &str,
    ) -> Result<Vec<String>, EpisodeStoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM episodes WHERE dataset_formalname = ?1
             ORDER BY ingested_at ASC",
        )?;
        let rows = stmt.query_map(params![dataset_formalname], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }

    /// Number of stored episodes.
    pub fn count(&self) -> Result<usize, EpisodeStoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM episodes", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

fn decode_row(row: &rusqlite::Row<'_>) -> Result<Episode, EpisodeStoreError> {
    let id_str: String = row.get(0)?;
    let dataset_formalname: String = row.get(1)?;
    let embodiment: String = row.get(2)?;
    let task_instruction: String = row.get(3)?;
    let description: Option<String> = row.get(4)?;
    let ts_str: String = row.get(5)?;
    let extra_str: String = row.get(6)?;

    let id = Uuid::parse_str(&id_str)
        .map_err(|e| EpisodeStoreError::Corrupt(format!("id `{id_str}`: {e}")))?;
    let ingested_at = ts_str
        .parse::<DateTime<Utc>>()
        .map_err(|e| EpisodeStoreError::Corrupt(format!("ingested_at `{ts_str}`: {e}")))?;
    let extra = match serde_json::from_str(&extra_str) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(other) => {
            return Err(EpisodeStoreError::Corrupt(format!(
                "extra must be a JSON object, got {other}"
            )));
        }
        Err(e) => return Err(EpisodeStoreError::Corrupt(format!("extra: {e}"))),
    };

    Ok(Episode {
        id,
        dataset_formalname,
        embodiment,
        task_instruction,
        description,
        ingested_at,
        extra,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
