//! Orchestration for the dimension-history pipeline.
//!
//! Loads the previous history from a [`DimensionStore`], reconciles it
//! against the snapshot produced by the upstream modeling stage, and writes
//! the result back under a generation check so that at most one run per
//! loaded state can succeed.
//!
//! [`DimensionStore`]: rcm_core::store::DimensionStore

pub mod config;
pub mod digest;
pub mod error;
pub mod run;
pub mod snapshot;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use run::{RunReport, entity_history, run_once};
