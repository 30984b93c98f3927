//! Error type for `rcm-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] rcm_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date parse error: {0}")]
  DateParse(String),

  /// A stored value does not fit the domain type it decodes to.
  #[error("decode error: {0}")]
  Decode(String),

  /// Another writer replaced the dimension after it was loaded.
  #[error(
    "dimension {dimension:?} is at generation {found}, expected {expected}"
  )]
  GenerationConflict {
    dimension: String,
    expected:  u64,
    found:     u64,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
