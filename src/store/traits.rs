//! Shared store contract consumed by the scheduler.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PhiloopError, Result};

/// A state written to the store, with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub embedding: Vec<f64>,
    pub metadata: serde_json::Value,
    /// Store epoch at write time
    pub cycle: u64,
    pub timestamp: DateTime<Utc>,
}

/// What a store hands back for a module.
///
/// Stores may keep bare vectors or full records; both expose `embedding()`.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleState {
    Raw(Vec<f64>),
    Record(StateRecord),
}

impl ModuleState {
    pub fn embedding(&self) -> &[f64] {
        match self {
            Self::Raw(v) => v,
            Self::Record(r) => &r.embedding,
        }
    }

    pub fn into_embedding(self) -> Vec<f64> {
        match self {
            Self::Raw(v) => v,
            Self::Record(r) => r.embedding,
        }
    }
}

/// How well `source`'s history predicts `target`'s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossPrediction {
    pub source: String,
    pub target: String,
    pub score: f64,
    pub mse: f64,
    pub samples: usize,
}

impl CrossPrediction {
    /// Metric map recorded in cycle results.
    pub fn to_metrics(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("prediction_score".to_string(), self.score),
            ("mse".to_string(), self.mse),
            ("samples".to_string(), self.samples as f64),
        ])
    }
}

/// Proof that this cycle's cross-predictions have been computed.
///
/// Only the scheduler can mint one, so phi cannot be read before the pairwise
/// pass has run.
#[derive(Debug)]
pub struct IntegrationsComputed {
    cycle: u64,
    pairs: usize,
}

impl IntegrationsComputed {
    pub(crate) fn new(cycle: u64, pairs: usize) -> Self {
        Self { cycle, pairs }
    }

    /// Loop cycle the pairs were computed in.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Number of pairs that produced a result.
    pub fn pairs(&self) -> usize {
        self.pairs
    }
}

/// Blackboard holding each module's latest vector, history and integration metrics.
pub trait SharedStore: Send {
    /// Bump the store epoch. Called once per cycle before any module runs.
    fn advance_cycle(&mut self) -> Result<()>;

    /// Latest state for `name`, or `None` if it was never written.
    fn read_module_state(&self, name: &str) -> Result<Option<ModuleState>>;

    /// Store the latest output for `name` and append it to that module's history.
    fn write_module_state(&mut self, name: &str, embedding: Vec<f64>, metadata: serde_json::Value) -> Result<()>;

    /// Compute and record how well `source` predicts `target`.
    fn compute_cross_prediction(&mut self, source: &str, target: &str) -> Result<CrossPrediction>;

    /// Aggregate score over the cross-predictions recorded this epoch.
    fn compute_phi_from_integrations(&mut self, integrations: &IntegrationsComputed) -> Result<f64>;

    /// Past states for `name`, oldest first.
    fn get_module_history(&self, name: &str) -> Result<Vec<StateRecord>>;
}

/// Lets several loops drive one store. Callers serialize cycles themselves.
impl<S: SharedStore> SharedStore for Arc<Mutex<S>> {
    fn advance_cycle(&mut self) -> Result<()> {
        lock(self)?.advance_cycle()
    }

    fn read_module_state(&self, name: &str) -> Result<Option<ModuleState>> {
        lock(self)?.read_module_state(name)
    }

    fn write_module_state(&mut self, name: &str, embedding: Vec<f64>, metadata: serde_json::Value) -> Result<()> {
        lock(self)?.write_module_state(name, embedding, metadata)
    }

    fn compute_cross_prediction(&mut self, source: &str, target: &str) -> Result<CrossPrediction> {
        lock(self)?.compute_cross_prediction(source, target)
    }

    fn compute_phi_from_integrations(&mut self, integrations: &IntegrationsComputed) -> Result<f64> {
        lock(self)?.compute_phi_from_integrations(integrations)
    }

    fn get_module_history(&self, name: &str) -> Result<Vec<StateRecord>> {
        lock(self)?.get_module_history(name)
    }
}

fn lock<S>(store: &Arc<Mutex<S>>) -> Result<std::sync::MutexGuard<'_, S>> {
    store.lock().map_err(|e| PhiloopError::Store(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_module_state_embedding_both_shapes() {
        let raw = ModuleState::Raw(vec![1.0, 2.0]);
        let record = ModuleState::Record(StateRecord {
            embedding: vec![1.0, 2.0],
            metadata: json!({}),
            cycle: 3,
            timestamp: Utc::now(),
        });
        assert_eq!(raw.embedding(), record.embedding());
        assert_eq!(record.into_embedding(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_cross_prediction_metrics() {
        let cp = CrossPrediction {
            source: "a".to_string(),
            target: "b".to_string(),
            score: 0.5,
            mse: 0.1,
            samples: 4,
        };
        let metrics = cp.to_metrics();
        assert_eq!(metrics["prediction_score"], 0.5);
        assert_eq!(metrics["mse"], 0.1);
        assert_eq!(metrics["samples"], 4.0);
    }

    #[test]
    fn test_integrations_token_accessors() {
        let token = IntegrationsComputed::new(7, 2);
        assert_eq!(token.cycle(), 7);
        assert_eq!(token.pairs(), 2);
    }
}
