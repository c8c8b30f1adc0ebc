//! Cycle orchestration.
//!
//! This module provides the scheduler that drives the module pipeline:
//! - IntegrationLoop for running ordered cycles against a shared store
//! - IntegrationLoopConfig for seeding, retention and executor tuning
//! - ProgressCallback for batch progress reporting

mod integration_loop;

pub use integration_loop::{IntegrationLoop, IntegrationLoopConfig, ProgressCallback};
