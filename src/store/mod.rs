//! Shared store layer.
//!
//! The scheduler talks to the blackboard only through [`SharedStore`].
//! [`InMemoryStore`] is the reference implementation used by the CLI and tests.

mod memory;
mod traits;

pub use memory::{InMemoryStore, InMemoryStoreConfig};
pub use traits::{CrossPrediction, IntegrationsComputed, ModuleState, SharedStore, StateRecord};
