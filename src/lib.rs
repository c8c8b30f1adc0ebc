//! philoop - ordered module pipeline with per-cycle integration scoring
//!
//! An `IntegrationLoop` runs a fixed sequence of modules against a shared
//! store, contains per-module failures, computes pairwise cross-predictions
//! and records a phi estimate for every cycle.

pub mod config;
pub mod domain;
pub mod error;
pub mod module;
pub mod runner;
pub mod store;

pub use domain::{LoopCycleResult, LoopStatistics, SavedState};
pub use error::{PhiloopError, Result};
pub use module::{Capability, ModuleDefinition, ModuleExecutor, ModuleInterfaceSpec, Predictor};
pub use runner::{IntegrationLoop, IntegrationLoopConfig};
pub use store::{InMemoryStore, SharedStore};
