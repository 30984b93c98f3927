//! Three-way classification of entities between the previous history and
//! the new snapshot.
//!
//! The full outer join on `entity_id` is expressed as typed buckets rather
//! than suffixed columns: every entity lands in exactly one of
//! [`Classification::unchanged`], [`Classification::changed`],
//! [`Classification::new`] or [`Classification::retired`].

use std::collections::BTreeMap;

use crate::{
  dimension::{EntityId, HistoricalRow, SnapshotRow},
  error::{InvariantKind, InvariantViolation, Phase},
  policy::TrackedAttributes,
};

/// Every historical version of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityHistory {
  pub entity_id: EntityId,
  pub rows:      Vec<HistoricalRow>,
}

/// An entity whose tracked attributes differ from its current version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedEntity {
  /// Closed versions, untouched by this run.
  pub closed:   Vec<HistoricalRow>,
  /// The version that will be expired.
  pub current:  HistoricalRow,
  /// The snapshot row that becomes the next version.
  pub incoming: SnapshotRow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
  /// Present in both inputs with identical tracked attributes.
  pub unchanged: Vec<EntityHistory>,
  /// Present in both inputs with at least one tracked attribute changed.
  pub changed:   Vec<ChangedEntity>,
  /// Present only in the snapshot.
  pub new:       Vec<SnapshotRow>,
  /// Present only in the history; carried forward as-is.
  pub retired:   Vec<EntityHistory>,
}

/// Group history rows by entity, preserving input order within each group.
pub fn group_by_entity(
  rows: Vec<HistoricalRow>,
) -> BTreeMap<EntityId, Vec<HistoricalRow>> {
  let mut groups: BTreeMap<EntityId, Vec<HistoricalRow>> = BTreeMap::new();
  for row in rows {
    groups.entry(row.entity_id.clone()).or_default().push(row);
  }
  groups
}

/// Partition `previous` and `snapshot` into the four buckets.
///
/// `snapshot` is expected to hold unique entity ids. Every group in
/// `previous` must have a current row; a group without one is reported as an
/// input invariant violation.
pub fn classify(
  previous: Vec<HistoricalRow>,
  snapshot: Vec<SnapshotRow>,
  tracked: &TrackedAttributes,
) -> Result<Classification, InvariantViolation> {
  let mut histories = group_by_entity(previous);
  let mut out = Classification::default();

  for incoming in snapshot {
    let Some(mut rows) = histories.remove(&incoming.entity_id) else {
      out.new.push(incoming);
      continue;
    };

    let Some(pos) = rows.iter().position(|r| r.is_current) else {
      return Err(InvariantViolation {
        phase:     Phase::Input,
        entity_id: incoming.entity_id,
        kind:      InvariantKind::NoCurrentVersion,
      });
    };

    if tracked.differs(&rows[pos].attributes, &incoming.attributes) {
      let current = rows.swap_remove(pos);
      out.changed.push(ChangedEntity { closed: rows, current, incoming });
    } else {
      out.unchanged.push(EntityHistory {
        entity_id: incoming.entity_id,
        rows,
      });
    }
  }

  out.retired = histories
    .into_iter()
    .map(|(entity_id, rows)| EntityHistory { entity_id, rows })
    .collect();

  Ok(out)
}
