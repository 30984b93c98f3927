//! Content digest of a snapshot, recorded in the run log.
//!
//! The digest is a SHA-256 hash over the canonical JSON of every row, taken
//! in entity-id order. Row order in the input does not affect it.

use rcm_core::dimension::SnapshotRow;
use sha2::{Digest, Sha256};

use crate::Result;

/// Hex-encoded SHA-256 digest of `rows`.
pub fn snapshot_digest(rows: &[SnapshotRow]) -> Result<String> {
  let mut sorted: Vec<&SnapshotRow> = rows.iter().collect();
  sorted.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));

  let mut hasher = Sha256::new();
  for row in sorted {
    // Attributes are a BTreeMap, so their JSON key order is stable.
    hasher.update(serde_json::to_vec(row)?);
    hasher.update(b"\n");
  }
  Ok(hex::encode(hasher.finalize()))
}
