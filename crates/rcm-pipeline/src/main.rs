//! `rcm-scd` — persist SCD Type 2 history for a warehouse dimension.
//!
//! Reads `rcm.toml` (or the path given with `--config`), opens the SQLite
//! history store, and either reconciles a fresh snapshot or reports on what
//! is stored.
//!
//! ```
//! rcm-scd run --snapshot staging/dim_patients.json
//! rcm-scd run --snapshot staging/dim_patients.json --as-of 2024-06-01
//! rcm-scd history HOSP-A-001
//! rcm-scd runs
//! ```

use std::path::PathBuf;

use anyhow::Context as _;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rcm_core::{dimension::EntityId, store::DimensionStore};
use rcm_pipeline::{PipelineConfig, entity_history, run_once, snapshot::read_snapshot};
use rcm_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "SCD Type 2 history for warehouse dimensions")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "rcm.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Reconcile a snapshot against the stored history and persist the result.
  Run {
    /// JSON array of snapshot rows from the modeling stage.
    #[arg(short, long)]
    snapshot: PathBuf,

    /// Date new versions take effect (YYYY-MM-DD); defaults to config, then
    /// today.
    #[arg(long)]
    as_of: Option<NaiveDate>,
  },

  /// Print every stored version of one entity.
  History { entity_id: String },

  /// Print the reconciliation log for the configured dimension.
  Runs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let config = PipelineConfig::load(&cli.config)
    .with_context(|| format!("failed to load config from {:?}", cli.config))?;

  let store = SqliteStore::open(&config.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", config.store_path))?;

  match cli.command {
    Command::Run { snapshot, as_of } => {
      let rows = read_snapshot(&snapshot, &config.entity_id_field)
        .with_context(|| format!("failed to read snapshot {snapshot:?}"))?;
      let as_of = config.resolve_as_of(as_of);

      let report = run_once(&store, &config, rows, as_of)
        .await
        .context("reconciliation run failed")?;
      println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Command::History { entity_id } => {
      let id = EntityId::new(entity_id);
      let rows = entity_history(&store, &config.dimension, &id)
        .await
        .with_context(|| format!("failed to read history of {id}"))?;
      if rows.is_empty() {
        tracing::warn!(entity_id = %id, "no stored history for entity");
      }
      println!("{}", serde_json::to_string_pretty(&rows)?);
    }
    Command::Runs => {
      let runs = store
        .list_runs(&config.dimension)
        .await
        .context("failed to read run log")?;
      println!("{}", serde_json::to_string_pretty(&runs)?);
    }
  }

  Ok(())
}
