//! The tracked-attribute set that drives change detection.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
  dimension::{AttributeName, AttributeValue, Attributes, EntityId},
  error::{ConfigurationError, RowSide},
};

/// A non-empty set of attribute names whose changes create new versions.
/// Every other attribute is pass-through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<AttributeName>", into = "Vec<AttributeName>")]
pub struct TrackedAttributes(BTreeSet<AttributeName>);

impl TrackedAttributes {
  pub fn new<I, S>(names: I) -> Result<Self, ConfigurationError>
  where
    I: IntoIterator<Item = S>,
    S: Into<AttributeName>,
  {
    let set: BTreeSet<AttributeName> =
      names.into_iter().map(Into::into).collect();
    if set.is_empty() {
      return Err(ConfigurationError::NoTrackedAttributes);
    }
    Ok(Self(set))
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.0.iter().map(String::as_str)
  }

  pub fn contains(&self, name: &str) -> bool { self.0.contains(name) }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  /// Fail if `attributes` lacks any tracked column. A column holding `Null`
  /// counts as present.
  pub fn require_on(
    &self,
    attributes: &Attributes,
    side: RowSide,
    entity_id: &EntityId,
  ) -> Result<(), ConfigurationError> {
    match self.iter().find(|name| !attributes.contains_key(*name)) {
      Some(missing) => Err(ConfigurationError::MissingAttribute {
        attribute: missing.to_owned(),
        side,
        entity_id: entity_id.clone(),
      }),
      None => Ok(()),
    }
  }

  /// Whether any tracked attribute differs between `old` and `new`.
  pub fn differs(&self, old: &Attributes, new: &Attributes) -> bool {
    self.iter().any(|name| {
      let before = old.get(name).unwrap_or(&AttributeValue::Null);
      let after = new.get(name).unwrap_or(&AttributeValue::Null);
      !before.same_as(after)
    })
  }
}

impl TryFrom<Vec<AttributeName>> for TrackedAttributes {
  type Error = ConfigurationError;

  fn try_from(names: Vec<AttributeName>) -> Result<Self, Self::Error> {
    Self::new(names)
  }
}

impl From<TrackedAttributes> for Vec<AttributeName> {
  fn from(tracked: TrackedAttributes) -> Self { tracked.0.into_iter().collect() }
}
