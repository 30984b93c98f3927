//! Structural checks over a complete history table.
//!
//! Run against the previous history before merging (as [`Phase::Input`]) and
//! against the merged output before it is returned (as [`Phase::Output`]).
//! A violation is never recoverable at this layer: the table is the source of
//! truth for every later run.

use std::collections::BTreeMap;

use crate::{
  dimension::{Attributes, EntityId, HistoricalRow},
  error::{InvariantKind, InvariantViolation, Phase},
  policy::TrackedAttributes,
};

/// Check the per-entity version invariants over `rows`.
///
/// Row order does not matter; each entity's rows are examined in version
/// order.
pub fn check_history(
  rows: &[HistoricalRow],
  tracked: &TrackedAttributes,
  phase: Phase,
) -> Result<(), InvariantViolation> {
  let mut groups: BTreeMap<&EntityId, Vec<&HistoricalRow>> = BTreeMap::new();
  for row in rows {
    groups.entry(&row.entity_id).or_default().push(row);
  }

  for (entity_id, mut versions) in groups {
    versions.sort_by_key(|r| r.version);
    check_entity(&versions, tracked).map_err(|kind| InvariantViolation {
      phase,
      entity_id: entity_id.clone(),
      kind,
    })?;
  }
  Ok(())
}

/// Check that `rows` is sorted by `(entity_id, version)` and keyed densely
/// from zero.
pub fn check_surrogate_keys(
  rows: &[HistoricalRow],
  phase: Phase,
) -> Result<(), InvariantViolation> {
  for (position, row) in rows.iter().enumerate() {
    if row.surrogate_key != position as u64 {
      return Err(InvariantViolation {
        phase,
        entity_id: row.entity_id.clone(),
        kind: InvariantKind::SurrogateKeySequence {
          position,
          found: row.surrogate_key,
        },
      });
    }
  }
  Ok(())
}

/// Check that every entity in `snapshot` has a current row carrying the
/// snapshot's tracked values.
pub fn check_snapshot_coverage(
  rows: &[HistoricalRow],
  snapshot: &BTreeMap<EntityId, Attributes>,
  tracked: &TrackedAttributes,
  phase: Phase,
) -> Result<(), InvariantViolation> {
  let current: BTreeMap<&EntityId, &HistoricalRow> = rows
    .iter()
    .filter(|r| r.is_current)
    .map(|r| (&r.entity_id, r))
    .collect();

  for (entity_id, attributes) in snapshot {
    let kind = match current.get(entity_id) {
      None => InvariantKind::SnapshotEntityMissing,
      Some(row) if tracked.differs(&row.attributes, attributes) => {
        InvariantKind::CurrentDiffersFromSnapshot { version: row.version }
      }
      Some(_) => continue,
    };
    return Err(InvariantViolation {
      phase,
      entity_id: entity_id.clone(),
      kind,
    });
  }
  Ok(())
}

fn check_entity(
  versions: &[&HistoricalRow],
  tracked: &TrackedAttributes,
) -> Result<(), InvariantKind> {
  let current: Vec<&&HistoricalRow> =
    versions.iter().filter(|r| r.is_current).collect();
  match current.len() {
    0 => return Err(InvariantKind::NoCurrentVersion),
    1 => {}
    count => return Err(InvariantKind::MultipleCurrentVersions { count }),
  }

  let found: Vec<u32> = versions.iter().map(|r| r.version).collect();
  let expected_last = versions.len() as u32;
  if !found.iter().copied().eq(1..=expected_last) {
    return Err(InvariantKind::VersionSequence { expected_last, found });
  }

  let current = current[0].version;
  if current != expected_last {
    return Err(InvariantKind::CurrentNotLatest {
      current,
      latest: expected_last,
    });
  }

  for row in versions {
    match (row.is_current, row.expiry_date) {
      (true, Some(expiry)) => {
        return Err(InvariantKind::UnexpectedExpiry {
          version: row.version,
          expiry,
        });
      }
      (false, None) => {
        return Err(InvariantKind::MissingExpiry { version: row.version });
      }
      _ => {}
    }
  }

  for pair in versions.windows(2) {
    let (previous, next) = (pair[0], pair[1]);
    // Only the last version can be current, so `previous` has an expiry.
    if let Some(previous_expiry) = previous.expiry_date
      && next.effective_date <= previous_expiry
    {
      return Err(InvariantKind::OverlappingWindows {
        previous: previous.version,
        previous_expiry,
        next: next.version,
        next_effective: next.effective_date,
      });
    }
    if !tracked.differs(&previous.attributes, &next.attributes) {
      return Err(InvariantKind::NoOpVersion {
        previous: previous.version,
        next:     next.version,
      });
    }
  }

  Ok(())
}
