//! [`SqliteStore`] — the SQLite implementation of [`DimensionStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;

use rcm_core::{
  dimension::HistoricalRow,
  store::{DimensionStore, RunRecord, StoredDimension},
};

use crate::{
  encode::{decode_u64, encode_dt, encode_u64, RawHistoricalRow, RawRun},
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A dimension-history store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// What the replace transaction found when it checked the generation.
enum ReplaceOutcome {
  Written(i64),
  Conflict(i64),
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── DimensionStore impl ─────────────────────────────────────────────────────

impl DimensionStore for SqliteStore {
  type Error = Error;

  async fn load(&self, dimension: &str) -> Result<StoredDimension> {
    let dim = dimension.to_owned();

    let (generation, raws): (i64, Vec<RawHistoricalRow>) = self
      .conn
      .call(move |conn| {
        let generation: i64 = conn
          .query_row(
            "SELECT generation FROM dimension_generations WHERE dimension = ?1",
            rusqlite::params![dim],
            |r| r.get(0),
          )
          .optional()?
          .unwrap_or(0);

        let mut stmt = conn.prepare(
          "SELECT surrogate_key, entity_id, version, effective_date,
                  expiry_date, is_current, attributes
           FROM dimension_rows
           WHERE dimension = ?1
           ORDER BY surrogate_key",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![dim], |row| {
            Ok(RawHistoricalRow {
              surrogate_key:  row.get(0)?,
              entity_id:      row.get(1)?,
              version:        row.get(2)?,
              effective_date: row.get(3)?,
              expiry_date:    row.get(4)?,
              is_current:     row.get(5)?,
              attributes:     row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((generation, rows))
      })
      .await?;

    let rows = raws
      .into_iter()
      .map(RawHistoricalRow::into_row)
      .collect::<Result<Vec<_>>>()?;

    Ok(StoredDimension {
      generation: decode_u64(generation, "generation")?,
      rows,
    })
  }

  async fn replace(
    &self,
    dimension:           &str,
    expected_generation: u64,
    rows:                &[HistoricalRow],
    run:                 &RunRecord,
  ) -> Result<u64> {
    let raws = rows
      .iter()
      .map(RawHistoricalRow::from_row)
      .collect::<Result<Vec<_>>>()?;
    let mut raw_run = RawRun::from_record(run)?;
    let dim      = dimension.to_owned();
    let expected = encode_u64(expected_generation, "generation")?;
    let now      = encode_dt(Utc::now());
    let count    = raws.len();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let found: i64 = tx
          .query_row(
            "SELECT generation FROM dimension_generations WHERE dimension = ?1",
            rusqlite::params![dim],
            |r| r.get(0),
          )
          .optional()?
          .unwrap_or(0);

        if found != expected {
          // Dropping `tx` rolls back; nothing has been written.
          return Ok(ReplaceOutcome::Conflict(found));
        }
        let next = found + 1;

        tx.execute(
          "INSERT INTO dimension_generations (dimension, generation, updated_at)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (dimension) DO UPDATE
             SET generation = excluded.generation,
                 updated_at = excluded.updated_at",
          rusqlite::params![dim, next, now],
        )?;

        tx.execute(
          "DELETE FROM dimension_rows WHERE dimension = ?1",
          rusqlite::params![dim],
        )?;

        {
          let mut stmt = tx.prepare(
            "INSERT INTO dimension_rows (
               dimension, surrogate_key, entity_id, version,
               effective_date, expiry_date, is_current, attributes
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          )?;
          for raw in &raws {
            stmt.execute(rusqlite::params![
              dim,
              raw.surrogate_key,
              raw.entity_id,
              raw.version,
              raw.effective_date,
              raw.expiry_date,
              raw.is_current,
              raw.attributes,
            ])?;
          }
        }

        raw_run.generation = next;
        insert_run(&tx, &raw_run)?;

        tx.commit()?;
        Ok(ReplaceOutcome::Written(next))
      })
      .await?;

    match outcome {
      ReplaceOutcome::Written(generation) => {
        let generation = decode_u64(generation, "generation")?;
        tracing::debug!(
          dimension,
          generation,
          rows = count,
          "replaced dimension"
        );
        Ok(generation)
      }
      ReplaceOutcome::Conflict(found) => Err(Error::GenerationConflict {
        dimension: dimension.to_owned(),
        expected:  expected_generation,
        found:     decode_u64(found, "generation")?,
      }),
    }
  }

  async fn record_run(&self, run: RunRecord) -> Result<()> {
    let raw = RawRun::from_record(&run)?;

    self
      .conn
      .call(move |conn| {
        insert_run(conn, &raw)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_runs(&self, dimension: &str) -> Result<Vec<RunRecord>> {
    let dim = dimension.to_owned();

    let raws: Vec<RawRun> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT run_id, dimension, as_of, summary, anomalies,
                  snapshot_digest, generation, recorded_at
           FROM reconciliation_runs
           WHERE dimension = ?1
           ORDER BY recorded_at, rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![dim], |row| {
            Ok(RawRun {
              run_id:          row.get(0)?,
              dimension:       row.get(1)?,
              as_of:           row.get(2)?,
              summary:         row.get(3)?,
              anomalies:       row.get(4)?,
              snapshot_digest: row.get(5)?,
              generation:      row.get(6)?,
              recorded_at:     row.get(7)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRun::into_record).collect()
  }
}

fn insert_run(conn: &rusqlite::Connection, raw: &RawRun) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO reconciliation_runs (
       run_id, dimension, as_of, summary, anomalies,
       snapshot_digest, generation, recorded_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    rusqlite::params![
      raw.run_id,
      raw.dimension,
      raw.as_of,
      raw.summary,
      raw.anomalies,
      raw.snapshot_digest,
      raw.generation,
      raw.recorded_at,
    ],
  )?;
  Ok(())
}
