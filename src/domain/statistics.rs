//! Aggregate statistics derived from cycle history.

use serde::{Deserialize, Serialize};

use super::cycle_result::LoopCycleResult;
use crate::module::ExecutorStatistics;

/// Phi distribution over retained history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhiSummary {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    pub nonzero_count: usize,
}

impl PhiSummary {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        Self {
            mean,
            max,
            min,
            nonzero_count: values.iter().filter(|v| **v != 0.0).count(),
        }
    }
}

/// Loop-level statistics, recomputed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopStatistics {
    /// Every `execute_cycle` call, including evicted history
    pub total_cycles: u64,
    /// Cycles currently held in history
    pub retained_cycles: usize,
    pub successful_cycles: usize,
    pub success_rate: f64,
    pub avg_cycle_duration_ms: f64,
    pub phi: PhiSummary,
    pub module_statistics: Vec<ExecutorStatistics>,
}

impl LoopStatistics {
    pub fn compute<'a, I>(total_cycles: u64, history: I, module_statistics: Vec<ExecutorStatistics>) -> Self
    where
        I: IntoIterator<Item = &'a LoopCycleResult>,
    {
        let mut retained_cycles = 0;
        let mut successful_cycles = 0;
        let mut duration_sum = 0.0;
        let mut phis = Vec::new();

        for result in history {
            retained_cycles += 1;
            if result.success() {
                successful_cycles += 1;
            }
            duration_sum += result.cycle_duration_ms;
            phis.push(result.phi_estimate);
        }

        let (success_rate, avg_cycle_duration_ms) = if retained_cycles == 0 {
            (0.0, 0.0)
        } else {
            (
                successful_cycles as f64 / retained_cycles as f64,
                duration_sum / retained_cycles as f64,
            )
        };

        Self {
            total_cycles,
            retained_cycles,
            successful_cycles,
            success_rate,
            avg_cycle_duration_ms,
            phi: PhiSummary::from_values(&phis),
            module_statistics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CrossPredictionScores;
    use chrono::Utc;

    fn cycle(n: u64, phi: f64, failed: bool) -> LoopCycleResult {
        LoopCycleResult {
            cycle_number: n,
            cycle_duration_ms: 2.0 * n as f64,
            modules_executed: vec![],
            errors_occurred: if failed {
                vec![("m".to_string(), "x".to_string())]
            } else {
                vec![]
            },
            cross_prediction_scores: CrossPredictionScores::new(),
            phi_estimate: phi,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_phi_summary_empty() {
        assert_eq!(PhiSummary::from_values(&[]), PhiSummary::default());
    }

    #[test]
    fn test_phi_summary_values() {
        let s = PhiSummary::from_values(&[0.0, 0.5, 1.0]);
        assert_eq!(s.mean, 0.5);
        assert_eq!(s.max, 1.0);
        assert_eq!(s.min, 0.0);
        assert_eq!(s.nonzero_count, 2);
    }

    #[test]
    fn test_compute_statistics() {
        let history = vec![cycle(1, 0.0, false), cycle(2, 0.5, false), cycle(3, 0.9, true)];
        let stats = LoopStatistics::compute(3, &history, vec![]);

        assert_eq!(stats.total_cycles, 3);
        assert_eq!(stats.retained_cycles, 3);
        assert_eq!(stats.successful_cycles, 1);
        assert!((stats.success_rate - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(stats.avg_cycle_duration_ms, 4.0);
        assert_eq!(stats.phi.nonzero_count, 2);
    }

    #[test]
    fn test_compute_statistics_no_history() {
        let stats = LoopStatistics::compute(0, &Vec::<LoopCycleResult>::new(), vec![]);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.avg_cycle_duration_ms, 0.0);
    }
}
