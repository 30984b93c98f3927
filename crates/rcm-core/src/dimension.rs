//! Dimension row types — the unit of data exchanged with the reconciler.
//!
//! A [`SnapshotRow`] is an entity as it exists right now, produced by the
//! upstream modeling stage. A [`HistoricalRow`] is one version of an entity
//! over time, as persisted between runs.

use std::{collections::BTreeMap, fmt};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ─── Identity ────────────────────────────────────────────────────────────────

/// Stable, source-system-independent entity key (e.g. a unified patient id).
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl fmt::Display for EntityId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for EntityId {
  fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl From<String> for EntityId {
  fn from(s: String) -> Self { Self(s) }
}

// ─── Attributes ──────────────────────────────────────────────────────────────

/// Column name on snapshot and historical rows.
pub type AttributeName = String;

/// A single cell value. Serialised untagged so rows read as plain JSON
/// objects.
///
/// `Float` compares by bit pattern, so `Eq` holds and `NaN` equals itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
  #[default]
  Null,
  Bool(bool),
  Integer(i64),
  Float(f64),
  Text(String),
}

impl AttributeValue {
  /// Equality used for change detection. `Null` and the empty string are the
  /// same value, as are an integer and a float holding the same whole number.
  /// Everything else compares exactly.
  pub fn same_as(&self, other: &Self) -> bool {
    match (self, other) {
      (Self::Null, Self::Text(s)) | (Self::Text(s), Self::Null) => s.is_empty(),
      (Self::Integer(i), Self::Float(f)) | (Self::Float(f), Self::Integer(i)) => {
        *f == *i as f64
      }
      (a, b) => a == b,
    }
  }

  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }
}

impl PartialEq for AttributeValue {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Self::Null, Self::Null) => true,
      (Self::Bool(a), Self::Bool(b)) => a == b,
      (Self::Integer(a), Self::Integer(b)) => a == b,
      (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
      (Self::Text(a), Self::Text(b)) => a == b,
      _ => false,
    }
  }
}

impl Eq for AttributeValue {}

impl From<&str> for AttributeValue {
  fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for AttributeValue {
  fn from(s: String) -> Self { Self::Text(s) }
}

impl From<i64> for AttributeValue {
  fn from(n: i64) -> Self { Self::Integer(n) }
}

impl From<f64> for AttributeValue {
  fn from(n: f64) -> Self { Self::Float(n) }
}

impl From<bool> for AttributeValue {
  fn from(b: bool) -> Self { Self::Bool(b) }
}

/// Tracked and pass-through attribute values keyed by column name.
pub type Attributes = BTreeMap<AttributeName, AttributeValue>;

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// One entity as it exists right now. Carries no history metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
  pub entity_id:  EntityId,
  pub attributes: Attributes,
}

impl SnapshotRow {
  pub fn new(entity_id: impl Into<EntityId>) -> Self {
    Self { entity_id: entity_id.into(), attributes: Attributes::new() }
  }

  /// Builder-style attribute setter, mostly for tests and loaders.
  pub fn with(
    mut self,
    name: impl Into<AttributeName>,
    value: impl Into<AttributeValue>,
  ) -> Self {
    self.attributes.insert(name.into(), value.into());
    self
  }
}

// ─── History ─────────────────────────────────────────────────────────────────

/// One version of an entity. Only the current → non-current transition ever
/// modifies an existing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalRow {
  /// Dense position in the `(entity_id, version)`-sorted table; reassigned on
  /// every run.
  pub surrogate_key:  u64,
  pub entity_id:      EntityId,
  pub attributes:     Attributes,
  /// Starts at 1 and increments by one per tracked change.
  pub version:        u32,
  pub effective_date: NaiveDate,
  /// `None` while the row is current.
  pub expiry_date:    Option<NaiveDate>,
  pub is_current:     bool,
}

impl HistoricalRow {
  /// The first version of a previously unseen entity.
  pub fn first_version(row: SnapshotRow, as_of: NaiveDate) -> Self {
    Self::open(row, 1, as_of)
  }

  /// The version that follows `previous`, carrying the snapshot's values.
  pub fn successor(
    previous: &HistoricalRow,
    row: SnapshotRow,
    as_of: NaiveDate,
  ) -> Self {
    Self::open(row, previous.version + 1, as_of)
  }

  fn open(row: SnapshotRow, version: u32, as_of: NaiveDate) -> Self {
    Self {
      // Assigned during reassembly.
      surrogate_key: 0,
      entity_id: row.entity_id,
      attributes: row.attributes,
      version,
      effective_date: as_of,
      expiry_date: None,
      is_current: true,
    }
  }

  /// Close this version on `expiry_date`, leaving every other field as is.
  pub fn expire(mut self, expiry_date: NaiveDate) -> Self {
    self.is_current = false;
    self.expiry_date = Some(expiry_date);
    self
  }

  /// Whether `date` falls inside `[effective_date, expiry_date]`.
  pub fn covers(&self, date: NaiveDate) -> bool {
    date >= self.effective_date
      && self.expiry_date.is_none_or(|expiry| date <= expiry)
  }

  pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
    self.attributes.get(name)
  }
}
