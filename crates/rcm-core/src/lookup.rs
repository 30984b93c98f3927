//! Point-in-time lookup over a reconciled history, used when fact rows are
//! joined to the dimension by surrogate key.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::dimension::{EntityId, HistoricalRow};

/// Borrowed index of a history table by entity, versions in ascending order.
#[derive(Debug, Clone, Default)]
pub struct SurrogateIndex<'a> {
  by_entity: BTreeMap<&'a EntityId, Vec<&'a HistoricalRow>>,
}

impl<'a> SurrogateIndex<'a> {
  pub fn build(rows: &'a [HistoricalRow]) -> Self {
    let mut by_entity: BTreeMap<&EntityId, Vec<&HistoricalRow>> =
      BTreeMap::new();
    for row in rows {
      by_entity.entry(&row.entity_id).or_default().push(row);
    }
    for versions in by_entity.values_mut() {
      versions.sort_by_key(|r| r.version);
    }
    Self { by_entity }
  }

  /// The current version of `entity_id`.
  pub fn current(&self, entity_id: &EntityId) -> Option<&'a HistoricalRow> {
    self
      .by_entity
      .get(entity_id)?
      .iter()
      .rev()
      .find(|r| r.is_current)
      .copied()
  }

  /// The version of `entity_id` in effect on `date`, if any.
  pub fn as_of(
    &self,
    entity_id: &EntityId,
    date: NaiveDate,
  ) -> Option<&'a HistoricalRow> {
    self
      .by_entity
      .get(entity_id)?
      .iter()
      .find(|r| r.covers(date))
      .copied()
  }

  /// Surrogate key of the version in effect on `date`.
  pub fn surrogate_key_at(
    &self,
    entity_id: &EntityId,
    date: NaiveDate,
  ) -> Option<u64> {
    self.as_of(entity_id, date).map(|r| r.surrogate_key)
  }

  /// Every version of `entity_id`, oldest first.
  pub fn history(&self, entity_id: &EntityId) -> &[&'a HistoricalRow] {
    self.by_entity.get(entity_id).map(Vec::as_slice).unwrap_or_default()
  }

  pub fn entity_count(&self) -> usize { self.by_entity.len() }
}
