//! The `DimensionStore` trait and the records it persists.
//!
//! The trait is implemented by storage backends (e.g. `rcm-store-sqlite`).
//! The pipeline depends on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  dimension::HistoricalRow,
  reconcile::{Anomaly, ReconcileSummary},
};

// ─── Records ─────────────────────────────────────────────────────────────────

/// A persisted history table and the generation it was written at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredDimension {
  /// Zero when the dimension has never been written.
  pub generation: u64,
  pub rows:       Vec<HistoricalRow>,
}

/// One entry in the append-only reconciliation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
  pub run_id:          Uuid,
  pub dimension:       String,
  pub summary:         ReconcileSummary,
  pub anomalies:       Vec<Anomaly>,
  /// SHA-256 hex digest of the snapshot the run consumed.
  pub snapshot_digest: String,
  /// Generation written by the run.
  pub generation:      u64,
  pub recorded_at:     DateTime<Utc>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a persisted dimension-history backend.
///
/// Writes are full-table rewrites guarded by a generation number: a writer
/// states which generation it loaded, and the write fails if another writer
/// has replaced the table since. This is what serialises concurrent pipeline
/// runs against the same dimension.
pub trait DimensionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Load every row of `dimension`, ordered by surrogate key. Returns an
  /// empty table at generation 0 if the dimension has never been written.
  fn load<'a>(
    &'a self,
    dimension: &'a str,
  ) -> impl Future<Output = Result<StoredDimension, Self::Error>> + Send + 'a;

  /// Replace the whole of `dimension` with `rows`, append `run` to the
  /// reconciliation log, and return the new generation.
  ///
  /// The rows and the log entry are committed together. `run.generation` is
  /// stored as the generation this write produces. Returns an error, writing
  /// nothing, if the stored generation is not `expected_generation` or the
  /// run cannot be logged.
  fn replace<'a>(
    &'a self,
    dimension: &'a str,
    expected_generation: u64,
    rows: &'a [HistoricalRow],
    run: &'a RunRecord,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Append a run to the reconciliation log without touching any rows.
  fn record_run(
    &self,
    run: RunRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// All logged runs for `dimension`, oldest first.
  fn list_runs<'a>(
    &'a self,
    dimension: &'a str,
  ) -> impl Future<Output = Result<Vec<RunRecord>, Self::Error>> + Send + 'a;
}
