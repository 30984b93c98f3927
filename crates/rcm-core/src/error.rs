//! Error types for `rcm-core`.

use chrono::NaiveDate;
use thiserror::Error;

use crate::dimension::{AttributeName, EntityId};

#[derive(Debug, Error)]
pub enum Error {
  /// Invalid tracked-attribute list or a schema mismatch. Not retryable.
  #[error("configuration error: {0}")]
  Configuration(#[from] ConfigurationError),

  /// A history table broke one of the SCD invariants.
  #[error("invariant violation: {0}")]
  InvariantViolation(#[from] InvariantViolation),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Which input a schema problem was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSide {
  Snapshot,
  History,
}

impl std::fmt::Display for RowSide {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Snapshot => f.write_str("snapshot"),
      Self::History => f.write_str("history"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
  #[error("at least one tracked attribute is required")]
  NoTrackedAttributes,

  #[error("tracked attribute {attribute:?} is missing from {side} row {entity_id}")]
  MissingAttribute {
    attribute: AttributeName,
    side:      RowSide,
    entity_id: EntityId,
  },

  #[error("entity {0} appears more than once in the snapshot")]
  DuplicateSnapshotEntity(EntityId),

  #[error("{0} row with an empty entity id")]
  EmptyEntityId(RowSide),
}

// ─── Invariants ──────────────────────────────────────────────────────────────

/// Whether the broken table was handed to the reconciler or produced by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  /// The previously persisted history failed validation.
  Input,
  /// The merged output failed validation; a defect in the merge itself.
  Output,
}

/// The specific rule a history table broke.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantKind {
  #[error("no current version")]
  NoCurrentVersion,

  #[error("{count} current versions")]
  MultipleCurrentVersions { count: usize },

  #[error("versions are not 1..={expected_last}: found {found:?}")]
  VersionSequence { expected_last: u32, found: Vec<u32> },

  #[error("current version {current} is not the latest ({latest})")]
  CurrentNotLatest { current: u32, latest: u32 },

  #[error("version {version} is not current but has no expiry date")]
  MissingExpiry { version: u32 },

  #[error("version {version} is current but has expiry date {expiry}")]
  UnexpectedExpiry { version: u32, expiry: NaiveDate },

  #[error(
    "version {next} takes effect {next_effective}, not after version \
     {previous} expired {previous_expiry}"
  )]
  OverlappingWindows {
    previous:        u32,
    previous_expiry: NaiveDate,
    next:            u32,
    next_effective:  NaiveDate,
  },

  #[error("version {next} repeats the tracked attributes of version {previous}")]
  NoOpVersion { previous: u32, next: u32 },

  #[error("snapshot entity has no current version in the output")]
  SnapshotEntityMissing,

  #[error("current version {version} does not carry the snapshot's tracked values")]
  CurrentDiffersFromSnapshot { version: u32 },

  #[error("surrogate key {found} at position {position}")]
  SurrogateKeySequence { position: usize, found: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{phase:?} history, entity {entity_id}: {kind}")]
pub struct InvariantViolation {
  pub phase:     Phase,
  pub entity_id: EntityId,
  pub kind:      InvariantKind,
}
