//! Integration loop - drives the module pipeline one cycle at a time.
//!
//! Each cycle:
//! 1. Advances the store epoch
//! 2. Runs every module once, in declaration order, containing failures
//! 3. Computes pairwise cross-predictions between modules that ran (optional)
//! 4. Reads phi from the store, which requires step 3's token
//! 5. Appends the result to history

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::{CrossPredictionScores, LoopCycleResult, LoopStatistics, SavedState};
use crate::error::{PhiloopError, Result};
use crate::module::{ExecutorConfig, ModuleDefinition, ModuleExecutor};
use crate::store::{IntegrationsComputed, SharedStore, StateRecord};

/// Configuration for an [`IntegrationLoop`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationLoopConfig {
    /// Base seed for executor random sources. `None` draws one from entropy.
    pub seed: Option<u64>,
    /// Cycle results kept in memory. `None` keeps everything.
    pub history_capacity: Option<usize>,
    /// Numeric tuning for every executor.
    pub executor: ExecutorConfig,
}

impl Default for IntegrationLoopConfig {
    fn default() -> Self {
        Self {
            seed: None,
            history_capacity: Some(10_000),
            executor: ExecutorConfig::default(),
        }
    }
}

impl IntegrationLoopConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_history_capacity(mut self, capacity: Option<usize>) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }
}

/// Progress hook for [`IntegrationLoop::run_cycles`]: `(completed, total, result)`.
pub type ProgressCallback<'a> = &'a mut dyn FnMut(usize, usize, &LoopCycleResult);

/// Scheduler owning the module sequence, one executor per module and the store.
pub struct IntegrationLoop<S: SharedStore> {
    store: S,
    loop_sequence: Vec<String>,
    executors: HashMap<String, ModuleExecutor>,
    history_capacity: Option<usize>,
    cycle_count: u64,
    total_cycles_executed: u64,
    cycle_history: VecDeque<LoopCycleResult>,
}

impl<S: SharedStore> IntegrationLoop<S> {
    /// Build a loop. Modules run in the order given.
    pub fn new<I>(store: S, modules: I, config: IntegrationLoopConfig) -> Result<Self>
    where
        I: IntoIterator<Item = ModuleDefinition>,
    {
        if config.history_capacity == Some(0) {
            return Err(PhiloopError::Configuration(
                "history_capacity must be > 0 when set".to_string(),
            ));
        }

        config.executor.validate()?;

        let base_seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let mut loop_sequence = Vec::new();
        let mut executors = HashMap::new();

        for (index, module) in modules.into_iter().enumerate() {
            let name = module.spec.name().to_string();
            if executors.contains_key(&name) {
                return Err(PhiloopError::Configuration(format!("duplicate module name: {}", name)));
            }
            let seed = base_seed.wrapping_add(index as u64);
            let executor = ModuleExecutor::new(module.spec, module.capability, config.executor.clone(), seed);
            loop_sequence.push(name.clone());
            executors.insert(name, executor);
        }

        for name in &loop_sequence {
            for input in executors[name].spec().required_inputs() {
                if !executors.contains_key(input) {
                    tracing::debug!(module = %name, input = %input, "Input is not a pipeline module, expecting it from the store");
                }
            }
        }

        tracing::info!(modules = loop_sequence.len(), seed = base_seed, "Integration loop created");

        Ok(Self {
            store,
            loop_sequence,
            executors,
            history_capacity: config.history_capacity,
            cycle_count: 0,
            total_cycles_executed: 0,
            cycle_history: VecDeque::new(),
        })
    }

    pub fn loop_sequence(&self) -> &[String] {
        &self.loop_sequence
    }

    pub fn executor(&self, name: &str) -> Option<&ModuleExecutor> {
        self.executors.get(name)
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn total_cycles_executed(&self) -> u64 {
        self.total_cycles_executed
    }

    /// Retained cycle results, oldest first.
    pub fn cycle_history(&self) -> impl Iterator<Item = &LoopCycleResult> {
        self.cycle_history.iter()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Past states of one module, as kept by the store.
    pub fn module_history(&self, name: &str) -> Result<Vec<StateRecord>> {
        self.store.get_module_history(name)
    }

    /// Run one full pass through the pipeline.
    ///
    /// Module failures are recorded and never abort the cycle. Only a failing
    /// `advance_cycle` is returned as an error.
    pub fn execute_cycle(&mut self, collect_metrics: bool) -> Result<LoopCycleResult> {
        let start = Instant::now();
        self.cycle_count += 1;
        self.total_cycles_executed += 1;
        let cycle_number = self.cycle_count;

        self.store.advance_cycle()?;

        let mut modules_executed = Vec::with_capacity(self.loop_sequence.len());
        let mut errors_occurred = Vec::new();

        for name in &self.loop_sequence {
            let Some(executor) = self.executors.get_mut(name) else {
                errors_occurred.push((name.clone(), "no executor registered".to_string()));
                continue;
            };
            match executor.execute(&mut self.store, None) {
                Ok(_) => modules_executed.push(name.clone()),
                Err(e) => {
                    tracing::warn!(cycle = cycle_number, module = %name, error = %e, "Module failed, continuing cycle");
                    errors_occurred.push((name.clone(), e.cycle_message()));
                }
            }
        }

        let (cross_prediction_scores, phi_estimate) = if collect_metrics && modules_executed.len() > 1 {
            let (scores, integrations) = self.compute_cross_predictions(cycle_number, &modules_executed);
            let phi = self.compute_phi(&integrations);
            (scores, phi)
        } else {
            (CrossPredictionScores::new(), 0.0)
        };

        let result = LoopCycleResult {
            cycle_number,
            cycle_duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            modules_executed,
            errors_occurred,
            cross_prediction_scores,
            phi_estimate,
            timestamp: Utc::now(),
        };

        tracing::debug!(
            cycle = cycle_number,
            executed = result.modules_executed.len(),
            errors = result.errors_occurred.len(),
            phi = phi_estimate,
            "Cycle complete"
        );

        self.push_history(result.clone());
        Ok(result)
    }

    /// Await-able form of [`execute_cycle`](Self::execute_cycle).
    ///
    /// Yields to the host runtime once, then runs the cycle synchronously.
    pub async fn execute_cycle_async(&mut self, collect_metrics: bool) -> Result<LoopCycleResult> {
        tokio::task::yield_now().await;
        self.execute_cycle(collect_metrics)
    }

    /// Run `num_cycles` cycles, collecting metrics on every
    /// `collect_metrics_every`-th cycle (1-based).
    pub fn run_cycles(
        &mut self,
        num_cycles: usize,
        collect_metrics_every: usize,
        mut progress_callback: Option<ProgressCallback<'_>>,
    ) -> Result<Vec<LoopCycleResult>> {
        if collect_metrics_every == 0 {
            return Err(PhiloopError::Configuration(
                "collect_metrics_every must be > 0".to_string(),
            ));
        }

        let mut results = Vec::with_capacity(num_cycles);
        for i in 1..=num_cycles {
            let result = self.execute_cycle(i % collect_metrics_every == 0)?;
            if let Some(callback) = progress_callback.as_deref_mut() {
                callback(i, num_cycles, &result);
            }
            results.push(result);
        }
        Ok(results)
    }

    pub fn get_statistics(&self) -> LoopStatistics {
        let module_statistics = self
            .loop_sequence
            .iter()
            .filter_map(|name| self.executors.get(name))
            .map(ModuleExecutor::get_statistics)
            .collect();
        LoopStatistics::compute(self.total_cycles_executed, &self.cycle_history, module_statistics)
    }

    /// Phi of each retained cycle, in cycle order.
    pub fn get_phi_progression(&self) -> Vec<f64> {
        self.cycle_history.iter().map(|r| r.phi_estimate).collect()
    }

    /// Export loop telemetry as JSON. Store contents are not included.
    pub fn save_state(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let saved = SavedState::from_history(
            self.cycle_count,
            self.total_cycles_executed,
            self.get_statistics(),
            &self.cycle_history,
        );
        saved.write(path)?;
        tracing::info!(path = %path.display(), cycles = self.cycle_history.len(), "Saved loop state");
        Ok(())
    }

    fn compute_cross_predictions(
        &mut self,
        cycle_number: u64,
        executed: &[String],
    ) -> (CrossPredictionScores, IntegrationsComputed) {
        let mut scores = CrossPredictionScores::new();
        let mut pairs = 0;

        for source in executed {
            for target in executed {
                if source == target {
                    continue;
                }
                match self.store.compute_cross_prediction(source, target) {
                    Ok(prediction) => {
                        scores
                            .entry(source.clone())
                            .or_default()
                            .insert(target.clone(), prediction.to_metrics());
                        pairs += 1;
                    }
                    Err(e) => {
                        tracing::debug!(source = %source, target = %target, error = %e, "Cross-prediction skipped");
                    }
                }
            }
        }

        (scores, IntegrationsComputed::new(cycle_number, pairs))
    }

    fn compute_phi(&mut self, integrations: &IntegrationsComputed) -> f64 {
        match self.store.compute_phi_from_integrations(integrations) {
            Ok(phi) if phi.is_finite() && phi >= 0.0 => phi,
            Ok(phi) => {
                tracing::warn!(cycle = integrations.cycle(), phi = phi, "Store returned invalid phi, using 0.0");
                0.0
            }
            Err(e) => {
                tracing::warn!(cycle = integrations.cycle(), error = %e, "Phi computation failed, using 0.0");
                0.0
            }
        }
    }

    fn push_history(&mut self, result: LoopCycleResult) {
        if let Some(capacity) = self.history_capacity {
            while self.cycle_history.len() >= capacity {
                self.cycle_history.pop_front();
            }
        }
        self.cycle_history.push_back(result);
    }
}

impl<S: SharedStore> std::fmt::Debug for IntegrationLoop<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationLoop")
            .field("loop_sequence", &self.loop_sequence)
            .field("cycle_count", &self.cycle_count)
            .field("history_len", &self.cycle_history.len())
            .finish_non_exhaustive()
    }
}
