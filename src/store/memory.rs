//! In-memory reference store.
//!
//! Keeps a bounded history per module. Cross-prediction is the mean cosine
//! similarity of lagged pairs `(source[t-1], target[t])`; phi is the mean of
//! the positive parts of the scores recorded since the last `advance_cycle`.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::traits::{CrossPrediction, IntegrationsComputed, ModuleState, SharedStore, StateRecord};
use crate::error::{PhiloopError, Result};
use crate::module::vector::{cosine_similarity, mean_squared_error};

/// Tuning for [`InMemoryStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryStoreConfig {
    /// States kept per module.
    pub history_limit: usize,
    /// Lagged pairs considered per cross-prediction.
    pub prediction_window: usize,
    /// Entries each side needs before cross-prediction is possible.
    pub min_history: usize,
}

impl Default for InMemoryStoreConfig {
    fn default() -> Self {
        Self {
            history_limit: 64,
            prediction_window: 16,
            min_history: 2,
        }
    }
}

impl InMemoryStoreConfig {
    /// Reject settings under which no cross-prediction could ever succeed.
    pub fn validate(&self) -> Result<()> {
        let needed = self.min_history.max(2);
        if self.history_limit < needed {
            return Err(PhiloopError::Configuration(format!(
                "store.history_limit ({}) must be >= {} to allow cross-prediction",
                self.history_limit, needed
            )));
        }
        if self.prediction_window == 0 {
            return Err(PhiloopError::Configuration(
                "store.prediction_window must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    config: InMemoryStoreConfig,
    epoch: u64,
    latest: HashMap<String, StateRecord>,
    history: HashMap<String, VecDeque<StateRecord>>,
    integrations: Vec<CrossPrediction>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: InMemoryStoreConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Current store epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Cross-predictions recorded since the last `advance_cycle`.
    pub fn integrations(&self) -> &[CrossPrediction] {
        &self.integrations
    }

    /// Module names with at least one stored state.
    pub fn module_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.latest.keys().cloned().collect();
        names.sort();
        names
    }
}

impl SharedStore for InMemoryStore {
    fn advance_cycle(&mut self) -> Result<()> {
        self.epoch += 1;
        self.integrations.clear();
        Ok(())
    }

    fn read_module_state(&self, name: &str) -> Result<Option<ModuleState>> {
        Ok(self.latest.get(name).cloned().map(ModuleState::Record))
    }

    fn write_module_state(&mut self, name: &str, embedding: Vec<f64>, metadata: serde_json::Value) -> Result<()> {
        let record = StateRecord {
            embedding,
            metadata,
            cycle: self.epoch,
            timestamp: Utc::now(),
        };

        let history = self.history.entry(name.to_string()).or_default();
        history.push_back(record.clone());
        while history.len() > self.config.history_limit.max(1) {
            history.pop_front();
        }
        self.latest.insert(name.to_string(), record);
        Ok(())
    }

    fn compute_cross_prediction(&mut self, source: &str, target: &str) -> Result<CrossPrediction> {
        let empty = VecDeque::new();
        let src = self.history.get(source).unwrap_or(&empty);
        let tgt = self.history.get(target).unwrap_or(&empty);

        let needed = self.config.min_history.max(2);
        if src.len() < needed || tgt.len() < needed {
            return Err(PhiloopError::Metrics(format!(
                "insufficient history for {} -> {} ({} / {} states, need {})",
                source,
                target,
                src.len(),
                tgt.len(),
                needed
            )));
        }

        // Align the most recent entries, source lagging target by one step.
        let len = src.len().min(tgt.len());
        let src: Vec<&StateRecord> = src.iter().skip(src.len() - len).collect();
        let tgt: Vec<&StateRecord> = tgt.iter().skip(tgt.len() - len).collect();
        let pairs = (len - 1).min(self.config.prediction_window.max(1));
        let start = len - pairs;

        let mut score = 0.0;
        let mut mse = 0.0;
        for t in start..len {
            score += cosine_similarity(&src[t - 1].embedding, &tgt[t].embedding);
            mse += mean_squared_error(&src[t - 1].embedding, &tgt[t].embedding);
        }

        let prediction = CrossPrediction {
            source: source.to_string(),
            target: target.to_string(),
            score: score / pairs as f64,
            mse: mse / pairs as f64,
            samples: pairs,
        };
        self.integrations.push(prediction.clone());
        Ok(prediction)
    }

    fn compute_phi_from_integrations(&mut self, _integrations: &IntegrationsComputed) -> Result<f64> {
        if self.integrations.is_empty() {
            return Ok(0.0);
        }
        let total: f64 = self.integrations.iter().map(|p| p.score.max(0.0)).sum();
        Ok(total / self.integrations.len() as f64)
    }

    fn get_module_history(&self, name: &str) -> Result<Vec<StateRecord>> {
        Ok(self
            .history
            .get(name)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(store: &mut InMemoryStore, name: &str, v: Vec<f64>) {
        store.write_module_state(name, v, json!({})).unwrap();
    }

    #[test]
    fn test_store_config_validation() {
        assert!(InMemoryStoreConfig::default().validate().is_ok());

        let short = InMemoryStoreConfig {
            history_limit: 1,
            ..Default::default()
        };
        assert!(matches!(short.validate(), Err(PhiloopError::Configuration(_))));

        let below_min = InMemoryStoreConfig {
            history_limit: 4,
            min_history: 5,
            ..Default::default()
        };
        let err = below_min.validate().unwrap_err();
        assert!(err.to_string().contains("history_limit"));

        let no_window = InMemoryStoreConfig {
            prediction_window: 0,
            ..Default::default()
        };
        assert!(no_window.validate().is_err());
    }

    #[test]
    fn test_read_absent_is_none() {
        let store = InMemoryStore::new();
        assert!(store.read_module_state("missing").unwrap().is_none());
    }

    #[test]
    fn test_write_then_read() {
        let mut store = InMemoryStore::new();
        store.advance_cycle().unwrap();
        write(&mut store, "a", vec![1.0, 0.0]);

        let state = store.read_module_state("a").unwrap().unwrap();
        assert_eq!(state.embedding(), &[1.0, 0.0]);
        match state {
            ModuleState::Record(r) => assert_eq!(r.cycle, 1),
            ModuleState::Raw(_) => panic!("expected a record"),
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let mut store = InMemoryStore::with_config(InMemoryStoreConfig {
            history_limit: 3,
            ..Default::default()
        });
        for i in 0..5 {
            write(&mut store, "a", vec![i as f64]);
        }
        let history = store.get_module_history("a").unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].embedding, vec![2.0]);
        assert_eq!(history[2].embedding, vec![4.0]);
    }

    #[test]
    fn test_cross_prediction_needs_history() {
        let mut store = InMemoryStore::new();
        write(&mut store, "a", vec![1.0]);
        write(&mut store, "b", vec![1.0]);
        let err = store.compute_cross_prediction("a", "b").unwrap_err();
        assert!(matches!(err, PhiloopError::Metrics(_)));
        assert!(store.integrations().is_empty());
    }

    #[test]
    fn test_cross_prediction_lagged_cosine() {
        let mut store = InMemoryStore::new();
        // a[t-1] always matches b[t]
        write(&mut store, "a", vec![1.0, 0.0]);
        write(&mut store, "b", vec![0.0, 1.0]);
        write(&mut store, "a", vec![0.0, 1.0]);
        write(&mut store, "b", vec![1.0, 0.0]);

        let cp = store.compute_cross_prediction("a", "b").unwrap();
        assert_eq!(cp.samples, 1);
        assert!((cp.score - 1.0).abs() < 1e-12);
        assert_eq!(cp.mse, 0.0);
        assert_eq!(store.integrations().len(), 1);
    }

    #[test]
    fn test_phi_is_mean_positive_score_and_resets_on_advance() {
        let mut store = InMemoryStore::new();
        write(&mut store, "a", vec![1.0, 0.0]);
        write(&mut store, "b", vec![0.0, 1.0]);
        write(&mut store, "a", vec![0.0, 1.0]);
        write(&mut store, "b", vec![1.0, 0.0]);

        store.compute_cross_prediction("a", "b").unwrap();
        // b[t-1] = (0,1) vs a[t] = (0,1) -> 1.0
        store.compute_cross_prediction("b", "a").unwrap();

        let token = IntegrationsComputed::new(1, 2);
        let phi = store.compute_phi_from_integrations(&token).unwrap();
        assert!((phi - 1.0).abs() < 1e-12);

        store.advance_cycle().unwrap();
        assert_eq!(store.compute_phi_from_integrations(&token).unwrap(), 0.0);
    }

    #[test]
    fn test_negative_scores_do_not_lower_phi_below_zero() {
        let mut store = InMemoryStore::new();
        write(&mut store, "a", vec![1.0]);
        write(&mut store, "b", vec![1.0]);
        write(&mut store, "a", vec![1.0]);
        write(&mut store, "b", vec![-1.0]);
        let cp = store.compute_cross_prediction("a", "b").unwrap();
        assert!(cp.score < 0.0);

        let phi = store
            .compute_phi_from_integrations(&IntegrationsComputed::new(1, 1))
            .unwrap();
        assert_eq!(phi, 0.0);
    }

    #[test]
    fn test_shared_handle_delegates() {
        use std::sync::{Arc, Mutex};

        let mut shared = Arc::new(Mutex::new(InMemoryStore::new()));
        shared.advance_cycle().unwrap();
        shared.write_module_state("a", vec![1.0], json!({})).unwrap();
        assert!(shared.read_module_state("a").unwrap().is_some());
        assert_eq!(shared.lock().unwrap().epoch(), 1);
    }
}
