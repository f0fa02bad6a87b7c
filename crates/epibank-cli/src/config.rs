//! Configuration – reads `epibank.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the embedding directory inside the data dir.
pub const EMBEDDING_DIR_NAME: &str = "embedding_data";
/// Name of the episode database file inside the data dir.
pub const EPISODE_DB_NAME: &str = "episodes.db";

/// Errors raised while reading the config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Persisted operator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory holding `embedding_data/` and `episodes.db`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Whether indices maintain streaming normalization statistics.
    #[serde(default)]
    pub online_norm: bool,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            online_norm: false,
        }
    }
}

impl Config {
    /// Read the config at `path`, falling back to defaults when the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Ok(toml::from_str(&fs::read_to_string(path)?)?)
    }

    /// Directory the embedding index manager owns.
    pub fn embedding_dir(&self) -> PathBuf {
        self.data_dir.join(EMBEDDING_DIR_NAME)
    }

    /// Path of the episode metadata database.
    pub fn episode_db(&self) -> PathBuf {
        self.data_dir.join(EPISODE_DB_NAME)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let cfg = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
        assert!(!cfg.online_norm);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("epibank.toml");
        fs::write(&path, "online_norm = true\n").unwrap();

        let cfg = Config::load(&path).unwrap();
        assert!(cfg.online_norm);
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn full_file_round_trips() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("epibank.toml");
        let cfg = Config {
            data_dir: PathBuf::from("/var/lib/epibank"),
            online_norm: true,
        };
        fs::write(&path, toml::to_string_pretty(&cfg).unwrap()).unwrap();

        let back = Config::load(&path).unwrap();
        assert_eq!(back.data_dir, cfg.data_dir);
        assert_eq!(back.online_norm, cfg.online_norm);
    }

    #[test]
    fn derived_paths_live_under_data_dir() {
        let cfg = Config {
            data_dir: PathBuf::from("/srv/bank"),
            online_norm: false,
        };
        assert_eq!(cfg.embedding_dir(), PathBuf::from("/srv/bank/embedding_data"));
        assert_eq!(cfg.episode_db(), PathBuf::from("/srv/bank/episodes.db"));
    }

    #[test]
    fn garbage_file_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("epibank.toml");
        fs::write(&path, "data_dir = [not toml").unwrap();
        assert!(matches!(
            Config::load(&path).unwrap_err(),
            ConfigError::Parse(_)
        ));
    }
}
