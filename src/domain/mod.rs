//! Domain types for cycle results, statistics and telemetry export.

mod cycle_result;
mod statistics;
mod telemetry;

pub use cycle_result::{CrossPredictionScores, LoopCycleResult};
pub use statistics::{LoopStatistics, PhiSummary};
pub use telemetry::{CycleTelemetry, RECENT_CYCLES_EXPORTED, SavedState};
