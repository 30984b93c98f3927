//! Pipeline configuration, read from a TOML file and `RCM_*` environment
//! variables.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use rcm_core::policy::TrackedAttributes;
use serde::Deserialize;

use crate::Result;

/// Runtime configuration for one history-tracked dimension.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
  /// SQLite file holding the persisted history.
  pub store_path:            PathBuf,
  /// Name the history is stored under, e.g. `dim_patients`.
  pub dimension:             String,
  /// Snapshot column holding the entity key.
  #[serde(default = "default_entity_id_field")]
  pub entity_id_field:       String,
  pub tracked_attributes:    TrackedAttributes,
  /// Fixed run date; the current UTC date when absent.
  #[serde(default)]
  pub as_of:                 Option<NaiveDate>,
  /// Treat an empty snapshot against existing history as a failure.
  #[serde(default)]
  pub reject_empty_snapshot: bool,
}

fn default_entity_id_field() -> String { "unified_patient_id".to_owned() }

impl PipelineConfig {
  /// Layer the optional file at `path` under `RCM_*` environment variables.
  ///
  /// `RCM_TRACKED_ATTRIBUTES` is read as a comma-separated list.
  pub fn load(path: &Path) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("RCM")
          .try_parsing(true)
          .list_separator(",")
          .with_list_parse_key("tracked_attributes"),
      )
      .build()?;
    Ok(settings.try_deserialize()?)
  }

  /// The date new versions take effect on: `explicit` if given, then the
  /// configured date, then today.
  pub fn resolve_as_of(&self, explicit: Option<NaiveDate>) -> NaiveDate {
    explicit
      .or(self.as_of)
      .unwrap_or_else(|| Utc::now().date_naive())
  }
}
