//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Calendar dates are stored as `YYYY-MM-DD`, timestamps as RFC 3339
//! strings. Attribute maps, summaries and anomalies are stored as compact
//! JSON. UUIDs are stored as hyphenated lowercase strings.

use chrono::{DateTime, NaiveDate, Utc};
use rcm_core::{
  dimension::{Attributes, EntityId, HistoricalRow},
  reconcile::{Anomaly, ReconcileSummary},
  store::RunRecord,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Dates ───────────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Integers ────────────────────────────────────────────────────────────────

/// SQLite integers are signed 64-bit.
pub fn encode_u64(n: u64, what: &str) -> Result<i64> {
  i64::try_from(n).map_err(|_| Error::Decode(format!("{what} {n} exceeds i64")))
}

pub fn decode_u64(n: i64, what: &str) -> Result<u64> {
  u64::try_from(n).map_err(|_| Error::Decode(format!("negative {what}: {n}")))
}

fn decode_u32(n: i64, what: &str) -> Result<u32> {
  u32::try_from(n).map_err(|_| Error::Decode(format!("{what} {n} out of range")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read from or written to a `dimension_rows` row.
pub struct RawHistoricalRow {
  pub surrogate_key:  i64,
  pub entity_id:      String,
  pub version:        i64,
  pub effective_date: String,
  pub expiry_date:    Option<String>,
  pub is_current:     bool,
  pub attributes:     String,
}

impl RawHistoricalRow {
  pub fn from_row(row: &HistoricalRow) -> Result<Self> {
    Ok(Self {
      surrogate_key:  encode_u64(row.surrogate_key, "surrogate key")?,
      entity_id:      row.entity_id.as_str().to_owned(),
      version:        i64::from(row.version),
      effective_date: encode_date(row.effective_date),
      expiry_date:    row.expiry_date.map(encode_date),
      is_current:     row.is_current,
      attributes:     serde_json::to_string(&row.attributes)?,
    })
  }

  pub fn into_row(self) -> Result<HistoricalRow> {
    let attributes: Attributes = serde_json::from_str(&self.attributes)?;
    Ok(HistoricalRow {
      surrogate_key: decode_u64(self.surrogate_key, "surrogate key")?,
      entity_id: EntityId::new(self.entity_id),
      attributes,
      version: decode_u32(self.version, "version")?,
      effective_date: decode_date(&self.effective_date)?,
      expiry_date: self.expiry_date.as_deref().map(decode_date).transpose()?,
      is_current: self.is_current,
    })
  }
}

/// Raw values read from or written to a `reconciliation_runs` row.
pub struct RawRun {
  pub run_id:          String,
  pub dimension:       String,
  pub as_of:           String,
  pub summary:         String,
  pub anomalies:       String,
  pub snapshot_digest: String,
  pub generation:      i64,
  pub recorded_at:     String,
}

impl RawRun {
  pub fn from_record(run: &RunRecord) -> Result<Self> {
    Ok(Self {
      run_id:          encode_uuid(run.run_id),
      dimension:       run.dimension.clone(),
      as_of:           encode_date(run.summary.as_of),
      summary:         serde_json::to_string(&run.summary)?,
      anomalies:       serde_json::to_string(&run.anomalies)?,
      snapshot_digest: run.snapshot_digest.clone(),
      generation:      encode_u64(run.generation, "generation")?,
      recorded_at:     encode_dt(run.recorded_at),
    })
  }

  pub fn into_record(self) -> Result<RunRecord> {
    let summary: ReconcileSummary = serde_json::from_str(&self.summary)?;
    let anomalies: Vec<Anomaly> = serde_json::from_str(&self.anomalies)?;
    let as_of = decode_date(&self.as_of)?;
    if as_of != summary.as_of {
      return Err(Error::Decode(format!(
        "run {} logged as of {as_of} but its summary says {}",
        self.run_id, summary.as_of
      )));
    }
    Ok(RunRecord {
      run_id: decode_uuid(&self.run_id)?,
      dimension: self.dimension,
      summary,
      anomalies,
      snapshot_digest: self.snapshot_digest,
      generation: decode_u64(self.generation, "generation")?,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}
