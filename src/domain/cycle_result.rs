//! Per-cycle result record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `source -> target -> metric name -> value`
pub type CrossPredictionScores = BTreeMap<String, BTreeMap<String, BTreeMap<String, f64>>>;

/// Summary of one pass through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopCycleResult {
    /// 1-based, +1 per cycle of the owning loop
    pub cycle_number: u64,
    pub cycle_duration_ms: f64,
    /// Modules that completed, in run order
    pub modules_executed: Vec<String>,
    /// `(module_name, message)` for every module that failed
    pub errors_occurred: Vec<(String, String)>,
    pub cross_prediction_scores: CrossPredictionScores,
    pub phi_estimate: f64,
    pub timestamp: DateTime<Utc>,
}

impl LoopCycleResult {
    /// No module failed and the pipeline showed some integration.
    pub fn success(&self) -> bool {
        self.errors_occurred.is_empty() && self.phi_estimate > 0.0
    }

    /// Number of `(source, target)` pairs with a recorded score.
    pub fn cross_prediction_count(&self) -> usize {
        self.cross_prediction_scores.values().map(BTreeMap::len).sum()
    }

    /// Error message for `module`, if it failed this cycle.
    pub fn error_for(&self, module: &str) -> Option<&str> {
        self.errors_occurred
            .iter()
            .find(|(name, _)| name == module)
            .map(|(_, message)| message.as_str())
    }
}
