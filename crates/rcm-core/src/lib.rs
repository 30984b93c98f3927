//! Core types and the SCD Type 2 reconciler for the revenue-cycle warehouse.
//!
//! This crate is deliberately free of database and CLI dependencies. The
//! reconciler is a pure function over in-memory rows; loading and persisting
//! history is the job of a [`store::DimensionStore`] backend.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
#![allow(async_fn_in_trait)]

pub mod classify;
pub mod dimension;
pub mod error;
pub mod invariants;
pub mod lookup;
pub mod policy;
pub mod reconcile;
pub mod store;

pub use error::{Error, Result};
pub use reconcile::{Anomaly, Reconciliation, ReconcileSummary, reconcile};
