//! SQL schema for the dimension-history store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Write counter per dimension; bumped by every full-table replace.
CREATE TABLE IF NOT EXISTS dimension_generations (
    dimension   TEXT PRIMARY KEY,
    generation  INTEGER NOT NULL,
    updated_at  TEXT NOT NULL        -- RFC 3339 UTC
);

-- One row per version of an entity. Rewritten wholesale on every run.
CREATE TABLE IF NOT EXISTS dimension_rows (
    dimension       TEXT NOT NULL REFERENCES dimension_generations(dimension),
    surrogate_key   INTEGER NOT NULL,
    entity_id       TEXT NOT NULL,
    version         INTEGER NOT NULL CHECK (version >= 1),
    effective_date  TEXT NOT NULL,   -- YYYY-MM-DD
    expiry_date     TEXT,            -- YYYY-MM-DD or NULL while current
    is_current      INTEGER NOT NULL CHECK (is_current IN (0, 1)),
    attributes      TEXT NOT NULL,   -- JSON object
    PRIMARY KEY (dimension, surrogate_key),
    UNIQUE (dimension, entity_id, version),
    CHECK ((is_current = 1) = (expiry_date IS NULL))
);

CREATE UNIQUE INDEX IF NOT EXISTS dimension_rows_one_current_idx
    ON dimension_rows(dimension, entity_id) WHERE is_current = 1;

-- Append-only log of reconciliation runs.
CREATE TABLE IF NOT EXISTS reconciliation_runs (
    run_id           TEXT PRIMARY KEY,
    dimension        TEXT NOT NULL,
    as_of            TEXT NOT NULL,  -- YYYY-MM-DD
    summary          TEXT NOT NULL,  -- JSON ReconcileSummary
    anomalies        TEXT NOT NULL DEFAULT '[]',
    snapshot_digest  TEXT NOT NULL,
    generation       INTEGER NOT NULL,
    recorded_at      TEXT NOT NULL   -- RFC 3339 UTC
);

CREATE INDEX IF NOT EXISTS reconciliation_runs_dimension_idx
    ON reconciliation_runs(dimension, recorded_at);

PRAGMA user_version = 1;
";
