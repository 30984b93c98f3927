//! Error type for `rcm-pipeline`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("reconciliation error: {0}")]
  Core(#[from] rcm_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("config error: {0}")]
  Config(#[from] config::ConfigError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// The snapshot file does not have the expected shape.
  #[error("invalid snapshot: {0}")]
  Snapshot(String),

  #[error(
    "empty snapshot for {dimension:?} would carry {carried_forward} entities \
     forward unchanged; refusing to write"
  )]
  EmptySnapshotRejected {
    dimension:       String,
    carried_forward: usize,
  },
}

impl Error {
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
