//! Reading the dimension snapshot produced by the upstream modeling stage.
//!
//! The snapshot is a JSON array of flat objects, one per entity. The column
//! named by `entity_id_field` becomes the [`EntityId`]; every other column
//! becomes an attribute.

use std::path::Path;

use rcm_core::dimension::{AttributeValue, Attributes, EntityId, SnapshotRow};
use serde_json::Value;

use crate::{Error, Result};

/// Read and parse the snapshot file at `path`.
pub fn read_snapshot(
  path: &Path,
  entity_id_field: &str,
) -> Result<Vec<SnapshotRow>> {
  let raw = std::fs::read_to_string(path)?;
  parse_snapshot(&raw, entity_id_field)
}

pub fn parse_snapshot(
  raw: &str,
  entity_id_field: &str,
) -> Result<Vec<SnapshotRow>> {
  let Value::Array(items) = serde_json::from_str::<Value>(raw)? else {
    return Err(Error::Snapshot("expected a JSON array of rows".into()));
  };

  items
    .into_iter()
    .enumerate()
    .map(|(index, item)| parse_row(index, item, entity_id_field))
    .collect()
}

fn parse_row(
  index: usize,
  item: Value,
  entity_id_field: &str,
) -> Result<SnapshotRow> {
  let Value::Object(mut columns) = item else {
    return Err(Error::Snapshot(format!("row {index} is not an object")));
  };

  let entity_id = match columns.remove(entity_id_field) {
    Some(Value::String(s)) if !s.is_empty() => EntityId::new(s),
    Some(Value::Number(n)) if n.is_i64() || n.is_u64() => {
      EntityId::new(n.to_string())
    }
    Some(other) => {
      return Err(Error::Snapshot(format!(
        "row {index}: {entity_id_field:?} must be a non-empty string or an \
         integer, got {other}"
      )));
    }
    None => {
      return Err(Error::Snapshot(format!(
        "row {index}: missing {entity_id_field:?}"
      )));
    }
  };

  let mut attributes = Attributes::new();
  for (name, value) in columns {
    let value = attribute_value(value).ok_or_else(|| {
      Error::Snapshot(format!(
        "row {index} ({entity_id}): column {name:?} is not a string, boolean \
         or number within range"
      ))
    })?;
    attributes.insert(name, value);
  }

  Ok(SnapshotRow { entity_id, attributes })
}

fn attribute_value(value: Value) -> Option<AttributeValue> {
  match value {
    Value::Null => Some(AttributeValue::Null),
    Value::Bool(b) => Some(AttributeValue::Bool(b)),
    // Integers beyond i64 are refused rather than rounded to a float.
    Value::Number(n) => match n.as_i64() {
      Some(i) => Some(AttributeValue::Integer(i)),
      None if n.is_f64() => n.as_f64().map(AttributeValue::Float),
      None => None,
    },
    Value::String(s) => Some(AttributeValue::Text(s)),
    Value::Array(_) | Value::Object(_) => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn key_column_becomes_entity_id_and_the_rest_attributes() {
    let rows = parse_snapshot(
      r#"[
        {"unified_patient_id": "HOSP-A-001", "Address": "12 Elm St", "LastName": null, "Age": 51},
        {"unified_patient_id": 7, "Address": "", "LastName": "Ng", "Active": true}
      ]"#,
      "unified_patient_id",
    )
    .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].entity_id.as_str(), "HOSP-A-001");
    assert!(!rows[0].attributes.contains_key("unified_patient_id"));
    assert_eq!(rows[0].attributes["LastName"], AttributeValue::Null);
    assert_eq!(rows[0].attributes["Age"], AttributeValue::Integer(51));
    assert_eq!(rows[1].entity_id.as_str(), "7");
    assert_eq!(rows[1].attributes["Active"], AttributeValue::Bool(true));
  }

  #[test]
  fn missing_or_empty_key_is_rejected() {
    let err = parse_snapshot(r#"[{"Address": "A"}]"#, "unified_patient_id")
      .unwrap_err();
    assert!(matches!(err, Error::Snapshot(ref m) if m.contains("missing")));

    let err =
      parse_snapshot(r#"[{"unified_patient_id": ""}]"#, "unified_patient_id")
        .unwrap_err();
    assert!(matches!(err, Error::Snapshot(_)));
  }

  #[test]
  fn fractional_pass_through_values_are_carried() {
    let rows = parse_snapshot(
      r#"[{"unified_patient_id": "P1", "Address": "A", "LastName": "S",
           "age": 51.0, "balance": -12.75}]"#,
      "unified_patient_id",
    )
    .unwrap();

    assert_eq!(rows[0].attributes["age"], AttributeValue::Float(51.0));
    assert_eq!(rows[0].attributes["balance"], AttributeValue::Float(-12.75));
  }

  #[test]
  fn nested_and_oversized_values_are_rejected() {
    for raw in [
      r#"[{"id": "P1", "Address": {"street": "Elm"}}]"#,
      r#"[{"id": "P1", "Tags": ["a", "b"]}]"#,
      r#"[{"id": "P1", "Mrn": 18446744073709551615}]"#,
    ] {
      let err = parse_snapshot(raw, "id").unwrap_err();
      assert!(matches!(err, Error::Snapshot(ref m) if m.contains("P1")));
    }
  }

  #[test]
  fn top_level_must_be_an_array() {
    let err = parse_snapshot(r#"{"id": "P1"}"#, "id").unwrap_err();
    assert!(matches!(err, Error::Snapshot(_)));
  }
}
