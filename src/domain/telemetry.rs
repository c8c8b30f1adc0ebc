//! Telemetry document written by `IntegrationLoop::save_state`.
//!
//! Only loop telemetry is exported; store contents are not.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::cycle_result::LoopCycleResult;
use super::statistics::LoopStatistics;
use crate::error::Result;

/// Cycles kept in `recent_cycles`.
pub const RECENT_CYCLES_EXPORTED: usize = 100;

/// Compact per-cycle entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleTelemetry {
    pub cycle: u64,
    pub success: bool,
    pub phi: f64,
    pub modules_executed: Vec<String>,
}

impl From<&LoopCycleResult> for CycleTelemetry {
    fn from(result: &LoopCycleResult) -> Self {
        Self {
            cycle: result.cycle_number,
            success: result.success(),
            phi: result.phi_estimate,
            modules_executed: result.modules_executed.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedState {
    pub cycle_count: u64,
    pub total_cycles_executed: u64,
    pub statistics: LoopStatistics,
    pub phi_progression: Vec<f64>,
    pub recent_cycles: Vec<CycleTelemetry>,
}

impl SavedState {
    /// Build the document, keeping only the last [`RECENT_CYCLES_EXPORTED`] cycles.
    pub fn from_history<'a, I>(
        cycle_count: u64,
        total_cycles_executed: u64,
        statistics: LoopStatistics,
        history: I,
    ) -> Self
    where
        I: IntoIterator<Item = &'a LoopCycleResult>,
        I::IntoIter: DoubleEndedIterator,
    {
        let mut phi_progression = Vec::new();
        let mut recent_cycles = Vec::new();
        for result in history.into_iter().rev() {
            phi_progression.push(result.phi_estimate);
            if recent_cycles.len() < RECENT_CYCLES_EXPORTED {
                recent_cycles.push(CycleTelemetry::from(result));
            }
        }
        phi_progression.reverse();
        recent_cycles.reverse();

        Self {
            cycle_count,
            total_cycles_executed,
            statistics,
            phi_progression,
            recent_cycles,
        }
    }

    /// Write as pretty JSON, creating parent directories.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
