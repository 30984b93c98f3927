//! One pipeline run: load → reconcile → replace → log.

use chrono::{NaiveDate, Utc};
use rcm_core::{
  dimension::{EntityId, HistoricalRow, SnapshotRow},
  lookup::SurrogateIndex,
  reconcile::{Anomaly, ReconcileSummary, reconcile},
  store::{DimensionStore, RunRecord},
};
use serde::Serialize;
use uuid::Uuid;

use crate::{Error, PipelineConfig, Result, digest::snapshot_digest};

/// What a successful run wrote.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  pub run_id:          Uuid,
  pub dimension:       String,
  pub generation:      u64,
  pub snapshot_digest: String,
  pub summary:         ReconcileSummary,
  pub anomalies:       Vec<Anomaly>,
}

/// Reconcile `snapshot` into the stored history of `config.dimension` as of
/// `as_of` and persist the result.
///
/// The new rows and the run-log entry are committed in one write, so an
/// error means neither was persisted. The write is rejected by the store if
/// another run replaced the dimension after this run loaded it. Nothing is
/// written when reconciliation fails or when an empty snapshot is rejected by
/// configuration.
pub async fn run_once<S: DimensionStore>(
  store: &S,
  config: &PipelineConfig,
  snapshot: Vec<SnapshotRow>,
  as_of: NaiveDate,
) -> Result<RunReport> {
  let dimension = config.dimension.as_str();
  let digest = snapshot_digest(&snapshot)?;

  let stored = store.load(dimension).await.map_err(Error::store)?;
  tracing::info!(
    dimension,
    generation = stored.generation,
    previous_rows = stored.rows.len(),
    snapshot_rows = snapshot.len(),
    %as_of,
    "loaded previous history"
  );

  let outcome =
    reconcile(snapshot, stored.rows, &config.tracked_attributes, as_of)?;

  for anomaly in &outcome.anomalies {
    match anomaly {
      Anomaly::EmptySnapshot { carried_forward }
        if config.reject_empty_snapshot =>
      {
        return Err(Error::EmptySnapshotRejected {
          dimension:       dimension.to_owned(),
          carried_forward: *carried_forward,
        });
      }
      Anomaly::EmptySnapshot { .. } | Anomaly::VersionNeverEffective { .. } => {}
    }
  }

  let run = RunRecord {
    run_id: Uuid::new_v4(),
    dimension: dimension.to_owned(),
    summary: outcome.summary,
    anomalies: outcome.anomalies,
    snapshot_digest: digest,
    generation: stored.generation + 1,
    recorded_at: Utc::now(),
  };
  let generation = store
    .replace(dimension, stored.generation, &outcome.rows, &run)
    .await
    .map_err(Error::store)?;

  tracing::info!(
    dimension,
    generation,
    run_id = %run.run_id,
    changed = run.summary.changed,
    new = run.summary.new,
    "persisted dimension history"
  );

  Ok(RunReport {
    run_id:          run.run_id,
    dimension:       run.dimension,
    generation,
    snapshot_digest: run.snapshot_digest,
    summary:         run.summary,
    anomalies:       run.anomalies,
  })
}

/// Every stored version of `entity_id`, oldest first. Empty if unknown.
pub async fn entity_history<S: DimensionStore>(
  store: &S,
  dimension: &str,
  entity_id: &EntityId,
) -> Result<Vec<HistoricalRow>> {
  let stored = store.load(dimension).await.map_err(Error::store)?;
  let index = SurrogateIndex::build(&stored.rows);
  Ok(index.history(entity_id).iter().map(|r| (*r).clone()).collect())
}

#[cfg(test)]
mod tests {
  use rcm_core::{dimension::AttributeValue, policy::TrackedAttributes};
  use rcm_store_sqlite::SqliteStore;

  use super::*;

  fn config(reject_empty_snapshot: bool) -> PipelineConfig {
    PipelineConfig {
      store_path: ":memory:".into(),
      dimension: "dim_patients".into(),
      entity_id_field: "unified_patient_id".into(),
      tracked_attributes: TrackedAttributes::new(["Address", "LastName"])
        .unwrap(),
      as_of: None,
      reject_empty_snapshot,
    }
  }

  fn date(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, m, d).unwrap()
  }

  fn patient(id: &str, address: &str) -> SnapshotRow {
    SnapshotRow::new(id)
      .with("Address", address)
      .with("LastName", "Smith")
  }

  async fn store() -> SqliteStore {
    SqliteStore::open_in_memory().await.expect("in-memory store")
  }

  #[tokio::test]
  async fn successive_runs_build_history_in_the_store() {
    let s = store().await;
    let cfg = config(false);

    let first = run_once(&s, &cfg, vec![patient("P1", "A")], date(1, 1))
      .await
      .unwrap();
    assert!(first.summary.bootstrap);
    assert_eq!(first.generation, 1);

    let second = run_once(&s, &cfg, vec![patient("P1", "B")], date(2, 1))
      .await
      .unwrap();
    assert_eq!(second.summary.changed, 1);
    assert_eq!(second.generation, 2);

    let history = entity_history(&s, "dim_patients", &"P1".into())
      .await
      .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].expiry_date, Some(date(1, 31)));
    assert_eq!(
      history[1].attribute("Address"),
      Some(&AttributeValue::from("B"))
    );

    let runs = s.list_runs("dim_patients").await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[1].run_id, second.run_id);
    assert_eq!(runs[1].snapshot_digest, second.snapshot_digest);
  }

  #[tokio::test]
  async fn failed_reconciliation_writes_nothing() {
    let s = store().await;
    let cfg = config(false);
    run_once(&s, &cfg, vec![patient("P1", "A")], date(1, 1))
      .await
      .unwrap();

    let missing_last_name = SnapshotRow::new("P1").with("Address", "B");
    let err = run_once(&s, &cfg, vec![missing_last_name], date(2, 1))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Core(rcm_core::Error::Configuration(_))));

    let stored = s.load("dim_patients").await.unwrap();
    assert_eq!(stored.generation, 1);
    assert_eq!(s.list_runs("dim_patients").await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn empty_snapshot_is_logged_or_rejected_by_config() {
    let s = store().await;
    run_once(&s, &config(false), vec![patient("P1", "A")], date(1, 1))
      .await
      .unwrap();

    let err = run_once(&s, &config(true), vec![], date(2, 1))
      .await
      .unwrap_err();
    assert!(matches!(
      err,
      Error::EmptySnapshotRejected { carried_forward: 1, .. }
    ));
    assert_eq!(s.load("dim_patients").await.unwrap().generation, 1);

    let report = run_once(&s, &config(false), vec![], date(2, 1))
      .await
      .unwrap();
    assert_eq!(report.anomalies, vec![Anomaly::EmptySnapshot {
      carried_forward: 1,
    }]);
    assert_eq!(report.generation, 2);
  }

  #[tokio::test]
  async fn same_day_correction_is_persisted_with_its_anomaly() {
    let s = store().await;
    let cfg = config(false);
    run_once(&s, &cfg, vec![patient("P1", "A")], date(3, 1))
      .await
      .unwrap();

    let report = run_once(&s, &cfg, vec![patient("P1", "B")], date(3, 1))
      .await
      .unwrap();
    assert_eq!(report.generation, 2);
    assert!(matches!(
      report.anomalies.as_slice(),
      [Anomaly::VersionNeverEffective { version: 1, .. }]
    ));

    let runs = s.list_runs("dim_patients").await.unwrap();
    assert_eq!(runs[1].anomalies, report.anomalies);
    assert_eq!(runs[1].generation, 2);
  }

  #[tokio::test]
  async fn unknown_entity_has_empty_history() {
    let s = store().await;
    let history = entity_history(&s, "dim_patients", &"P9".into())
      .await
      .unwrap();
    assert!(history.is_empty());
  }
}
