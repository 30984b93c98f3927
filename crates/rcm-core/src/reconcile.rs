//! The SCD Type 2 reconciler.
//!
//! [`reconcile`] merges a full snapshot of a dimension against its previous
//! history and returns the new history. It is a pure function: the caller
//! loads the previous table and persists the result.
//!
//! The pass runs in four stages over the typed buckets produced by
//! [`crate::classify`]:
//!
//! 1. classification of entities into unchanged, changed, new and retired;
//! 2. expiry of the current version of every changed entity;
//! 3. versioning, which opens a successor for changed entities and a first
//!    version for new ones;
//! 4. reassembly, which sorts by `(entity_id, version)` once and reassigns
//!    surrogate keys once.
//!
//! Preconditions are checked before any merge work and the output is checked
//! again before it is returned, so a caller either gets a table that
//! satisfies every invariant or an error and no rows.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
  classify::{Classification, classify},
  dimension::{Attributes, EntityId, HistoricalRow, SnapshotRow},
  error::{ConfigurationError, Phase, RowSide},
  invariants::{check_history, check_snapshot_coverage, check_surrogate_keys},
  policy::TrackedAttributes,
  Result,
};

// ─── Outcome ────────────────────────────────────────────────────────────────

/// Per-bucket counts for one reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
  pub as_of:     NaiveDate,
  /// The previous history was empty; every snapshot row became version 1.
  pub bootstrap: bool,
  pub unchanged: usize,
  pub changed:   usize,
  pub new:       usize,
  pub retired:   usize,
  pub rows_in:   usize,
  pub rows_out:  usize,
}

/// Conditions that are not failures but that the caller should decide on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
  /// The snapshot was empty while history exists. Either nothing changed
  /// upstream or the upstream stage failed; every current row was carried
  /// forward as retired.
  EmptySnapshot { carried_forward: usize },

  /// A changed entity's current version took effect on or after `as_of`, so
  /// closing it at `as_of - 1` leaves a version that never covers any date.
  /// Typical of a same-day rerun after an upstream correction.
  VersionNeverEffective {
    entity_id:      EntityId,
    version:        u32,
    effective_date: NaiveDate,
    as_of:          NaiveDate,
  },
}

/// The new history table plus what happened while building it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
  /// Sorted by `(entity_id, version)`; `surrogate_key` equals the index.
  pub rows:      Vec<HistoricalRow>,
  pub summary:   ReconcileSummary,
  pub anomalies: Vec<Anomaly>,
}

// ─── Entry point ─────────────────────────────────────────────────────────────

/// Merge `snapshot` into `previous` as of `as_of`.
///
/// New versions take effect on `as_of`; the versions they replace expire the
/// day before.
pub fn reconcile(
  snapshot: Vec<SnapshotRow>,
  previous: Vec<HistoricalRow>,
  tracked: &TrackedAttributes,
  as_of: NaiveDate,
) -> Result<Reconciliation> {
  validate_snapshot(&snapshot, tracked)?;
  validate_history(&previous, tracked)?;

  let rows_in = previous.len();
  let expected = tracked_projection(&snapshot, tracked);

  let (rows, mut summary, anomalies) = if previous.is_empty() {
    let summary = ReconcileSummary {
      as_of,
      bootstrap: true,
      unchanged: 0,
      changed: 0,
      new: snapshot.len(),
      retired: 0,
      rows_in,
      rows_out: 0,
    };
    let rows: Vec<HistoricalRow> = snapshot
      .into_iter()
      .map(|row| HistoricalRow::first_version(row, as_of))
      .collect();
    (rows, summary, Vec::new())
  } else {
    let snapshot_was_empty = snapshot.is_empty();
    let classification = classify(previous, snapshot, tracked)?;

    let summary = ReconcileSummary {
      as_of,
      bootstrap: false,
      unchanged: classification.unchanged.len(),
      changed: classification.changed.len(),
      new: classification.new.len(),
      retired: classification.retired.len(),
      rows_in,
      rows_out: 0,
    };

    let mut anomalies = never_effective(&classification, as_of);
    if snapshot_was_empty {
      tracing::warn!(
        carried_forward = summary.retired,
        "empty snapshot against existing history; carrying every entity forward"
      );
      anomalies.push(Anomaly::EmptySnapshot {
        carried_forward: summary.retired,
      });
    }

    (merge(classification, as_of), summary, anomalies)
  };

  let rows = reassemble(rows);
  summary.rows_out = rows.len();

  check_history(&rows, tracked, Phase::Output)?;
  check_surrogate_keys(&rows, Phase::Output)?;
  check_snapshot_coverage(&rows, &expected, tracked, Phase::Output)?;

  tracing::info!(
    %as_of,
    bootstrap = summary.bootstrap,
    unchanged = summary.unchanged,
    changed = summary.changed,
    new = summary.new,
    retired = summary.retired,
    rows_out = summary.rows_out,
    "reconciled dimension history"
  );

  Ok(Reconciliation { rows, summary, anomalies })
}

// ─── Preconditions ───────────────────────────────────────────────────────────

fn validate_snapshot(
  snapshot: &[SnapshotRow],
  tracked: &TrackedAttributes,
) -> Result<(), ConfigurationError> {
  let mut seen: BTreeSet<&EntityId> = BTreeSet::new();
  for row in snapshot {
    if row.entity_id.is_empty() {
      return Err(ConfigurationError::EmptyEntityId(RowSide::Snapshot));
    }
    if !seen.insert(&row.entity_id) {
      return Err(ConfigurationError::DuplicateSnapshotEntity(
        row.entity_id.clone(),
      ));
    }
    tracked.require_on(&row.attributes, RowSide::Snapshot, &row.entity_id)?;
  }
  Ok(())
}

fn validate_history(
  previous: &[HistoricalRow],
  tracked: &TrackedAttributes,
) -> Result<()> {
  for row in previous {
    if row.entity_id.is_empty() {
      return Err(ConfigurationError::EmptyEntityId(RowSide::History).into());
    }
    tracked.require_on(&row.attributes, RowSide::History, &row.entity_id)?;
  }
  check_history(previous, tracked, Phase::Input)?;
  Ok(())
}

fn never_effective(
  classification: &Classification,
  as_of: NaiveDate,
) -> Vec<Anomaly> {
  classification
    .changed
    .iter()
    .filter(|c| as_of <= c.current.effective_date)
    .map(|c| {
      tracing::warn!(
        entity_id = %c.current.entity_id,
        version = c.current.version,
        effective_date = %c.current.effective_date,
        %as_of,
        "change closes a version that never took effect"
      );
      Anomaly::VersionNeverEffective {
        entity_id:      c.current.entity_id.clone(),
        version:        c.current.version,
        effective_date: c.current.effective_date,
        as_of,
      }
    })
    .collect()
}

fn tracked_projection(
  snapshot: &[SnapshotRow],
  tracked: &TrackedAttributes,
) -> BTreeMap<EntityId, Attributes> {
  snapshot
    .iter()
    .map(|row| {
      let values = row
        .attributes
        .iter()
        .filter(|(name, _)| tracked.contains(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
      (row.entity_id.clone(), values)
    })
    .collect()
}

// ─── Stages ──────────────────────────────────────────────────────────────────

/// Expiry and versioning: accumulate every bucket into one output table.
fn merge(classification: Classification, as_of: NaiveDate) -> Vec<HistoricalRow> {
  let Classification { unchanged, changed, new, retired } = classification;
  // Only `NaiveDate::MIN` has no predecessor.
  let expiry = as_of.checked_sub_days(Days::new(1)).unwrap_or(as_of);

  tracing::debug!(
    unchanged = unchanged.len(),
    changed = changed.len(),
    new = new.len(),
    retired = retired.len(),
    "classified entities"
  );

  let mut rows = Vec::new();
  for history in unchanged.into_iter().chain(retired) {
    rows.extend(history.rows);
  }

  for entity in changed {
    let successor =
      HistoricalRow::successor(&entity.current, entity.incoming, as_of);
    rows.extend(entity.closed);
    rows.push(entity.current.expire(expiry));
    rows.push(successor);
  }

  rows.extend(
    new
      .into_iter()
      .map(|row| HistoricalRow::first_version(row, as_of)),
  );
  rows
}

/// Sort by `(entity_id, version)` and key every row by its position.
fn reassemble(mut rows: Vec<HistoricalRow>) -> Vec<HistoricalRow> {
  rows.sort_by(|a, b| {
    a.entity_id.cmp(&b.entity_id).then(a.version.cmp(&b.version))
  });
  for (position, row) in rows.iter_mut().enumerate() {
    row.surrogate_key = position as u64;
  }
  rows
}
