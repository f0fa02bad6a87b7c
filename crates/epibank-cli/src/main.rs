//! `epibank` – operator CLI for the episode bank.
//!
//! Opens the configured data directory read-only-in-spirit (nothing is
//! mutated), prints per-index statistics, and – when the episode database
//! is present – runs the cross-store reconciliation pass and prints its
//! work list.
//!
//! Usage: `epibank [config_path]` (default `epibank.toml`).

mod config;

use std::path::PathBuf;

use config::Config;
use epibank_embedding::IndexManager;
use epibank_episodes::{EpisodeStore, find_heal_targets};
use epibank_types::{IndexField, META_FIELDS, TRAJECTORY_FIELDS};

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // Initialise tracing-subscriber using RUST_LOG (defaults to "info").
    // Set EPIBANK_LOG_FORMAT=json to emit newline-delimited JSON logs.
    // User-facing output below still uses println! for UX consistency.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("EPIBANK_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("epibank.toml"));

    if let Err(e) = run(&config_path) {
        eprintln!("epibank: {e}");
        std::process::exit(1);
    }
}

fn run(config_path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config::load(config_path)?;
    let manager = IndexManager::open(cfg.embedding_dir(), cfg.online_norm)?;

    println!("EpiBank @ {}", cfg.data_dir.display());
    println!();

    if manager.names().is_empty() {
        println!("  (no indices yet)");
    } else {
        println!(
            "  {:<44} {:>8} {:>6} {:>9}  norm",
            "index", "channels", "steps", "entries"
        );
        for name in manager.names() {
            let Some(meta) = manager.index_stats(name) else {
                continue;
            };
            println!(
                "  {:<44} {:>8} {:>6} {:>9}  {}",
                name,
                meta.feature_dim,
                meta.time_steps,
                meta.n_entries,
                if meta.has_normalization { "yes" } else { "no" },
            );
        }

        println!();
        for (key, value) in manager.overall_stats() {
            println!("  {key}: {value:.2}");
        }
    }

    let episode_db = cfg.episode_db();
    if episode_db.exists() {
        let store = EpisodeStore::open(&episode_db.to_string_lossy())?;
        println!();
        println!("  episodes on record: {}", store.count()?);

        let fields: Vec<IndexField> = TRAJECTORY_FIELDS
            .iter()
            .chain(META_FIELDS.iter())
            .copied()
            .collect();
        let report = find_heal_targets(&store, &manager, &fields)?;

        if report.is_clean() {
            println!("  reconciliation: clean");
        } else {
            println!(
                "  reconciliation: {} missing, {} orphaned",
                report.total_missing(),
                report.total_orphaned(),
            );
            for r in report.reports.iter().filter(|r| !r.is_clean()) {
                let state = if r.index_absent { " (index absent)" } else { "" };
                println!(
                    "    {}{}: {} missing, {} orphaned",
                    r.index_name,
                    state,
                    r.missing.len(),
                    r.orphaned.len(),
                );
            }
        }
    }

    Ok(())
}
