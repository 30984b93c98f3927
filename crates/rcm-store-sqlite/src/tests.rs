//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{NaiveDate, Utc};
use rcm_core::{
  dimension::{AttributeValue, HistoricalRow, SnapshotRow},
  policy::TrackedAttributes,
  reconcile,
  store::{DimensionStore, RunRecord},
};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn date(m: u32, d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(2024, m, d).unwrap()
}

fn tracked() -> TrackedAttributes {
  TrackedAttributes::new(["Address"]).unwrap()
}

fn patient(id: &str, address: &str) -> SnapshotRow {
  SnapshotRow::new(id)
    .with("Address", address)
    .with("Age", 40_i64)
    .with("Balance", 1250.75_f64)
    .with("MiddleName", AttributeValue::Null)
}

/// P1 with two versions (A then B) and P2 with one.
fn history() -> Vec<HistoricalRow> {
  let first = reconcile(
    vec![patient("P1", "A"), patient("P2", "X")],
    vec![],
    &tracked(),
    date(1, 1),
  )
  .unwrap();
  reconcile(
    vec![patient("P1", "B"), patient("P2", "X")],
    first.rows,
    &tracked(),
    date(2, 1),
  )
  .unwrap()
  .rows
}

/// Replace `dimension` with `rows`, logging a fresh run alongside.
async fn write_rows(
  s: &SqliteStore,
  dimension: &str,
  expected: u64,
  rows: &[HistoricalRow],
) -> crate::Result<u64> {
  let run = run_record(dimension, expected + 1, date(2, 1));
  s.replace(dimension, expected, rows, &run).await
}

// ─── Load / replace ──────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_dimension_loads_empty_at_generation_zero() {
  let s = store().await;
  let stored = s.load("dim_patients").await.unwrap();
  assert_eq!(stored.generation, 0);
  assert!(stored.rows.is_empty());
}

#[tokio::test]
async fn replace_then_load_returns_the_same_rows() {
  let s = store().await;
  let rows = history();

  let generation = write_rows(&s, "dim_patients", 0, &rows).await.unwrap();
  assert_eq!(generation, 1);

  let stored = s.load("dim_patients").await.unwrap();
  assert_eq!(stored.generation, 1);
  assert_eq!(stored.rows, rows);
  assert_eq!(
    stored.rows[0].attribute("MiddleName"),
    Some(&AttributeValue::Null)
  );
  assert_eq!(
    stored.rows[0].attribute("Balance"),
    Some(&AttributeValue::Float(1250.75))
  );
  assert_eq!(stored.rows[1].expiry_date, None);
  assert_eq!(stored.rows[0].expiry_date, Some(date(1, 31)));
}

#[tokio::test]
async fn replace_is_a_full_rewrite() {
  let s = store().await;
  let rows = history();
  write_rows(&s, "dim_patients", 0, &rows).await.unwrap();

  let only_p2: Vec<HistoricalRow> = rows
    .iter()
    .filter(|r| r.entity_id.as_str() == "P2")
    .cloned()
    .map(|mut r| {
      r.surrogate_key = 0;
      r
    })
    .collect();
  let generation = write_rows(&s, "dim_patients", 1, &only_p2).await.unwrap();
  assert_eq!(generation, 2);

  let stored = s.load("dim_patients").await.unwrap();
  assert_eq!(stored.rows, only_p2);
}

#[tokio::test]
async fn stale_generation_conflicts_and_writes_nothing() {
  let s = store().await;
  let rows = history();
  write_rows(&s, "dim_patients", 0, &rows).await.unwrap();

  // A second writer that loaded before the first write still believes the
  // dimension is at generation 0.
  let err = write_rows(&s, "dim_patients", 0, &rows[..1]).await.unwrap_err();
  assert!(matches!(
    err,
    crate::Error::GenerationConflict { expected: 0, found: 1, .. }
  ));

  let stored = s.load("dim_patients").await.unwrap();
  assert_eq!(stored.generation, 1);
  assert_eq!(stored.rows, rows);
}

#[tokio::test]
async fn dimensions_are_isolated() {
  let s = store().await;
  let rows = history();
  write_rows(&s, "dim_patients", 0, &rows).await.unwrap();

  let providers = s.load("dim_providers").await.unwrap();
  assert_eq!(providers.generation, 0);
  assert!(providers.rows.is_empty());

  write_rows(&s, "dim_providers", 0, &rows[2..]).await.unwrap();
  assert_eq!(s.load("dim_patients").await.unwrap().rows.len(), 3);
}

#[tokio::test]
async fn second_current_row_for_an_entity_is_refused() {
  let s = store().await;
  let mut rows = history();
  rows[0].is_current = true;
  rows[0].expiry_date = None;

  let err = write_rows(&s, "dim_patients", 0, &rows).await.unwrap_err();
  assert!(matches!(err, crate::Error::Database(_)));

  let stored = s.load("dim_patients").await.unwrap();
  assert_eq!(stored.generation, 0);
  assert!(stored.rows.is_empty());
}

#[tokio::test]
async fn file_store_persists_across_reopen() {
  let path =
    std::env::temp_dir().join(format!("rcm-{}.sqlite", Uuid::new_v4()));
  let rows = history();

  {
    let s = SqliteStore::open(&path).await.unwrap();
    write_rows(&s, "dim_patients", 0, &rows).await.unwrap();
  }

  let reopened = SqliteStore::open(&path).await.unwrap();
  let stored = reopened.load("dim_patients").await.unwrap();
  assert_eq!(stored.generation, 1);
  assert_eq!(stored.rows, rows);

  drop(reopened);
  let _ = std::fs::remove_file(&path);
}

// ─── Run log ─────────────────────────────────────────────────────────────────

fn run_record(
  dimension: &str,
  generation: u64,
  as_of: NaiveDate,
) -> RunRecord {
  let outcome =
    reconcile(vec![patient("P1", "A")], vec![], &tracked(), as_of).unwrap();
  RunRecord {
    run_id: Uuid::new_v4(),
    dimension: dimension.into(),
    summary: outcome.summary,
    anomalies: outcome.anomalies,
    snapshot_digest: "abc123".into(),
    generation,
    recorded_at: Utc::now(),
  }
}

#[tokio::test]
async fn runs_are_logged_per_dimension_in_order() {
  let s = store().await;
  let first = run_record("dim_patients", 1, date(1, 1));
  let second = run_record("dim_patients", 2, date(2, 1));
  let other = run_record("dim_providers", 1, date(1, 1));

  s.record_run(first.clone()).await.unwrap();
  s.record_run(second.clone()).await.unwrap();
  s.record_run(other).await.unwrap();

  let runs = s.list_runs("dim_patients").await.unwrap();
  assert_eq!(runs.len(), 2);
  assert_eq!(runs[0].run_id, first.run_id);
  assert_eq!(runs[1].run_id, second.run_id);
  assert_eq!(runs[1].summary, second.summary);
  assert_eq!(runs[1].generation, 2);
}

#[tokio::test]
async fn duplicate_run_id_is_refused() {
  let s = store().await;
  let run = run_record("dim_patients", 1, date(1, 1));
  s.record_run(run.clone()).await.unwrap();

  let err = s.record_run(run).await.unwrap_err();
  assert!(matches!(err, crate::Error::Database(_)));
}

#[tokio::test]
async fn replace_logs_its_run_in_the_same_write() {
  let s = store().await;
  let rows = history();
  let mut run = run_record("dim_patients", 0, date(2, 1));
  run.generation = 99;

  let generation = s.replace("dim_patients", 0, &rows, &run).await.unwrap();
  assert_eq!(generation, 1);

  let runs = s.list_runs("dim_patients").await.unwrap();
  assert_eq!(runs.len(), 1);
  assert_eq!(runs[0].run_id, run.run_id);
  assert_eq!(runs[0].generation, 1);
}

#[tokio::test]
async fn conflicting_replace_logs_no_run() {
  let s = store().await;
  let rows = history();
  write_rows(&s, "dim_patients", 0, &rows).await.unwrap();

  let run = run_record("dim_patients", 1, date(3, 1));
  let err = s.replace("dim_patients", 0, &rows, &run).await.unwrap_err();
  assert!(matches!(err, crate::Error::GenerationConflict { .. }));
  assert_eq!(s.list_runs("dim_patients").await.unwrap().len(), 1);
}

#[tokio::test]
async fn failing_run_log_rolls_back_the_rows() {
  let s = store().await;
  let rows = history();
  let run = run_record("dim_patients", 1, date(2, 1));
  s.record_run(run.clone()).await.unwrap();

  // The run id is already logged, so the insert fails inside the replace.
  let err = s.replace("dim_patients", 0, &rows, &run).await.unwrap_err();
  assert!(matches!(err, crate::Error::Database(_)));

  let stored = s.load("dim_patients").await.unwrap();
  assert_eq!(stored.generation, 0);
  assert!(stored.rows.is_empty());
}
