//! Module executor - runs one pipeline stage against the shared store.
//!
//! Each invocation:
//! 1. Gathers declared inputs from the store
//! 2. Computes an output vector (or a zero-vector fallback)
//! 3. Writes the output back when the module produces one
//! 4. Updates call, error and timing counters

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::capability::Capability;
use super::spec::ModuleInterfaceSpec;
use super::vector::{elementwise_mean, is_all_zero, l2_normalize, resize};
use crate::error::{PhiloopError, Result};
use crate::store::SharedStore;

/// Numeric tuning shared by all executors of a loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Standard deviation of the perturbation added before normalization.
    pub noise_std: f64,
    /// Scale of the random seed vector synthesized by root stages.
    pub seed_amplitude: f64,
    /// Inputs with every element within this of zero count as empty.
    pub zero_tolerance: f64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            noise_std: 0.01,
            seed_amplitude: 0.1,
            zero_tolerance: 1e-9,
        }
    }
}

impl ExecutorConfig {
    /// Reject settings that would silently disable noise or the zero fallback.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("noise_std", self.noise_std),
            ("seed_amplitude", self.seed_amplitude),
            ("zero_tolerance", self.zero_tolerance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PhiloopError::Configuration(format!(
                    "executor.{} must be finite and >= 0, got {}",
                    field, value
                )));
            }
        }
        Ok(())
    }
}

/// Why an executor produced the zero vector instead of computing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    /// Predictor stage had nothing to predict from
    NoInputs,
    /// A declared input has never been written
    MissingInput,
    /// A declared input is all zeros
    ZeroInput,
}

/// Result of one successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleOutput {
    pub output: Vec<f64>,
    /// Names of the store entries actually consumed
    pub inputs_used: Vec<String>,
    pub fallback: Option<Fallback>,
}

/// Per-module counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorStatistics {
    pub module_name: String,
    pub call_count: u64,
    pub error_count: u64,
    pub avg_execution_time_ms: f64,
}

/// Wraps one module, its capability and its random source.
#[derive(Debug)]
pub struct ModuleExecutor {
    module_name: String,
    spec: ModuleInterfaceSpec,
    capability: Capability,
    config: ExecutorConfig,
    rng: StdRng,
    call_count: u64,
    error_count: u64,
    total_execution_time: Duration,
}

impl ModuleExecutor {
    pub fn new(spec: ModuleInterfaceSpec, capability: Capability, config: ExecutorConfig, seed: u64) -> Self {
        Self {
            module_name: spec.name().to_string(),
            spec,
            capability,
            config,
            rng: StdRng::seed_from_u64(seed),
            call_count: 0,
            error_count: 0,
            total_execution_time: Duration::ZERO,
        }
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn spec(&self) -> &ModuleInterfaceSpec {
        &self.spec
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    pub fn call_count(&self) -> u64 {
        self.call_count
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    /// Run the module once.
    ///
    /// `input_module` overrides the declared inputs with a single named state.
    /// Failures are counted and returned; containing them is up to the caller.
    pub fn execute<S>(&mut self, store: &mut S, input_module: Option<&str>) -> Result<ModuleOutput>
    where
        S: SharedStore + ?Sized,
    {
        let start = Instant::now();
        self.call_count += 1;

        let result = self.run(store, input_module);
        self.total_execution_time += start.elapsed();

        result.map_err(|e| {
            self.error_count += 1;
            tracing::error!(module = %self.module_name, error = %e, "Module execution failed");
            match e {
                PhiloopError::ModuleExecution { .. } => e,
                other => PhiloopError::module(self.module_name.clone(), other.to_string()),
            }
        })
    }

    pub fn get_statistics(&self) -> ExecutorStatistics {
        let avg_execution_time_ms = if self.call_count == 0 {
            0.0
        } else {
            self.total_execution_time.as_secs_f64() * 1000.0 / self.call_count as f64
        };
        ExecutorStatistics {
            module_name: self.module_name.clone(),
            call_count: self.call_count,
            error_count: self.error_count,
            avg_execution_time_ms,
        }
    }

    fn run<S>(&mut self, store: &mut S, input_module: Option<&str>) -> Result<ModuleOutput>
    where
        S: SharedStore + ?Sized,
    {
        let expected: Vec<String> = match input_module {
            Some(name) => vec![name.to_string()],
            None => self.spec.required_inputs().to_vec(),
        };

        let mut inputs = Vec::with_capacity(expected.len());
        let mut inputs_used = Vec::with_capacity(expected.len());
        let mut missing = Vec::new();
        for name in &expected {
            match store.read_module_state(name)? {
                Some(state) => {
                    inputs.push(state.into_embedding());
                    inputs_used.push(name.clone());
                }
                None => missing.push(name.as_str()),
            }
        }

        let (output, fallback) = self.compute(&inputs, &missing)?;

        if self.spec.produces_output() {
            let metadata = json!({
                "inputs": inputs_used,
                "call_index": self.call_count,
                "fallback": fallback,
            });
            store.write_module_state(&self.module_name, output.clone(), metadata)?;
        }

        Ok(ModuleOutput {
            output,
            inputs_used,
            fallback,
        })
    }

    fn compute(&mut self, inputs: &[Vec<f64>], missing: &[&str]) -> Result<(Vec<f64>, Option<Fallback>)> {
        let dim = self.spec.embedding_dim();

        if let Capability::Predict(predictor) = &self.capability {
            let Some(current) = inputs.first() else {
                tracing::debug!(module = %self.module_name, "No input to predict from, emitting zero vector");
                return Ok((vec![0.0; dim], Some(Fallback::NoInputs)));
            };
            let predicted = predictor.predict_next_state(current)?;
            return Ok((l2_normalize(resize(&predicted, dim)), None));
        }

        if let Some(name) = missing.first() {
            tracing::warn!(module = %self.module_name, input = %name, "Required input missing, emitting zero vector");
            return Ok((vec![0.0; dim], Some(Fallback::MissingInput)));
        }
        if inputs.iter().any(|v| is_all_zero(v, self.config.zero_tolerance)) {
            tracing::warn!(module = %self.module_name, "Required input is all zeros, emitting zero vector");
            return Ok((vec![0.0; dim], Some(Fallback::ZeroInput)));
        }

        let resized: Vec<Vec<f64>> = inputs.iter().map(|v| resize(v, dim)).collect();
        let base = match &mut self.capability {
            Capability::Transform(t) => t.transform(&resized)?,
            _ => match elementwise_mean(&resized) {
                Some(mean) => mean,
                None => seed_vector(&mut self.rng, dim, self.config.seed_amplitude),
            },
        };

        let mut output = resize(&base, dim);
        if self.config.noise_std > 0.0 {
            for x in output.iter_mut() {
                let eps: f64 = self.rng.sample(StandardNormal);
                *x += self.config.noise_std * eps;
            }
        }
        Ok((l2_normalize(output), None))
    }
}

fn seed_vector(rng: &mut StdRng, dim: usize, amplitude: f64) -> Vec<f64> {
    (0..dim)
        .map(|_| {
            let eps: f64 = rng.sample(StandardNormal);
            amplitude * eps
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::capability::{RollPredictor, Transform};
    use crate::module::vector::norm;
    use crate::store::InMemoryStore;

    fn executor(spec: ModuleInterfaceSpec) -> ModuleExecutor {
        ModuleExecutor::new(spec, Capability::Blend, ExecutorConfig::default(), 7)
    }

    struct FailingTransform;

    impl Transform for FailingTransform {
        fn transform(&mut self, _inputs: &[Vec<f64>]) -> Result<Vec<f64>> {
            Err(PhiloopError::Metrics("boom".to_string()))
        }
    }

    struct DoublingTransform;

    impl Transform for DoublingTransform {
        fn transform(&mut self, inputs: &[Vec<f64>]) -> Result<Vec<f64>> {
            Ok(inputs.iter().flatten().map(|x| x * 2.0).collect())
        }
    }

    #[test]
    fn test_executor_config_validation() {
        assert!(ExecutorConfig::default().validate().is_ok());

        let nan_noise = ExecutorConfig {
            noise_std: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(nan_noise.validate(), Err(PhiloopError::Configuration(_))));

        let negative_tolerance = ExecutorConfig {
            zero_tolerance: -1e-9,
            ..Default::default()
        };
        let err = negative_tolerance.validate().unwrap_err();
        assert!(err.to_string().contains("zero_tolerance"));

        let infinite_seed = ExecutorConfig {
            seed_amplitude: f64::INFINITY,
            ..Default::default()
        };
        assert!(infinite_seed.validate().is_err());
    }

    #[test]
    fn test_root_module_produces_unit_vector() {
        let mut store = InMemoryStore::new();
        let mut exec = executor(ModuleInterfaceSpec::new("root", 6).unwrap());

        let out = exec.execute(&mut store, None).unwrap();
        assert_eq!(out.output.len(), 6);
        assert!((norm(&out.output) - 1.0).abs() < 1e-9);
        assert!(out.fallback.is_none());
        assert!(store.read_module_state("root").unwrap().is_some());
    }

    #[test]
    fn test_huge_input_still_normalized() {
        let mut store = InMemoryStore::new();
        store.write_module_state("ext", vec![1e200; 4], json!({})).unwrap();
        let spec = ModuleInterfaceSpec::new("b", 4).unwrap().with_inputs(["ext"]);
        let mut exec = executor(spec);

        let out = exec.execute(&mut store, None).unwrap();
        assert!(out.output.iter().all(|x| x.is_finite()));
        assert!((norm(&out.output) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_input_yields_zero_vector() {
        let mut store = InMemoryStore::new();
        let spec = ModuleInterfaceSpec::new("b", 4).unwrap().with_inputs(["a"]);
        let mut exec = executor(spec);

        let out = exec.execute(&mut store, None).unwrap();
        assert_eq!(out.output, vec![0.0; 4]);
        assert_eq!(out.fallback, Some(Fallback::MissingInput));
        assert_eq!(exec.error_count(), 0);
    }

    #[test]
    fn test_zero_input_yields_zero_vector() {
        let mut store = InMemoryStore::new();
        store.write_module_state("a", vec![0.0; 4], json!({})).unwrap();
        let spec = ModuleInterfaceSpec::new("b", 4).unwrap().with_inputs(["a"]);
        let mut exec = executor(spec);

        let out = exec.execute(&mut store, None).unwrap();
        assert_eq!(out.output, vec![0.0; 4]);
        assert_eq!(out.fallback, Some(Fallback::ZeroInput));
    }

    #[test]
    fn test_output_resized_to_embedding_dim() {
        let mut store = InMemoryStore::new();
        store.write_module_state("wide", vec![1.0; 10], json!({})).unwrap();
        store.write_module_state("narrow", vec![1.0; 2], json!({})).unwrap();

        let spec = ModuleInterfaceSpec::new("mix", 5).unwrap().with_inputs(["wide", "narrow"]);
        let mut exec = executor(spec);
        let out = exec.execute(&mut store, None).unwrap();

        assert_eq!(out.output.len(), 5);
        assert!((norm(&out.output) - 1.0).abs() < 1e-9);
        assert_eq!(out.inputs_used, vec!["wide".to_string(), "narrow".to_string()]);
    }

    #[test]
    fn test_input_module_override() {
        let mut store = InMemoryStore::new();
        store.write_module_state("other", vec![1.0, 0.0], json!({})).unwrap();
        let spec = ModuleInterfaceSpec::new("b", 2).unwrap().with_inputs(["a"]);
        let mut exec = executor(spec);

        let out = exec.execute(&mut store, Some("other")).unwrap();
        assert_eq!(out.inputs_used, vec!["other".to_string()]);
        assert!(out.fallback.is_none());
    }

    #[test]
    fn test_no_output_module_does_not_write() {
        let mut store = InMemoryStore::new();
        let spec = ModuleInterfaceSpec::new("sink", 3).unwrap().with_output(false);
        let mut exec = executor(spec);

        exec.execute(&mut store, None).unwrap();
        assert!(store.read_module_state("sink").unwrap().is_none());
    }

    #[test]
    fn test_write_metadata_records_inputs_and_call_index() {
        let mut store = InMemoryStore::new();
        store.write_module_state("a", vec![1.0, 1.0], json!({})).unwrap();
        let spec = ModuleInterfaceSpec::new("b", 2).unwrap().with_inputs(["a"]);
        let mut exec = executor(spec);

        exec.execute(&mut store, None).unwrap();
        exec.execute(&mut store, None).unwrap();

        let history = store.get_module_history("b").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].metadata["call_index"], 2);
        assert_eq!(history[1].metadata["inputs"], json!(["a"]));
    }

    #[test]
    fn test_predictor_without_inputs_returns_zero() {
        let mut store = InMemoryStore::new();
        let spec = ModuleInterfaceSpec::new("expectation", 3).unwrap().with_inputs(["memory"]);
        let mut exec = ModuleExecutor::new(
            spec,
            Capability::predictor(RollPredictor { shift: 1 }),
            ExecutorConfig::default(),
            1,
        );

        let out = exec.execute(&mut store, None).unwrap();
        assert_eq!(out.output, vec![0.0; 3]);
        assert_eq!(out.fallback, Some(Fallback::NoInputs));
    }

    #[test]
    fn test_predictor_delegates() {
        let mut store = InMemoryStore::new();
        store.write_module_state("memory", vec![1.0, 0.0, 0.0], json!({})).unwrap();
        let spec = ModuleInterfaceSpec::new("expectation", 3).unwrap().with_inputs(["memory"]);
        let mut exec = ModuleExecutor::new(
            spec,
            Capability::predictor(RollPredictor { shift: 1 }),
            ExecutorConfig::default(),
            1,
        );

        let out = exec.execute(&mut store, None).unwrap();
        assert_eq!(out.output, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_transform_replaces_blend() {
        let mut store = InMemoryStore::new();
        store.write_module_state("a", vec![3.0, 4.0], json!({})).unwrap();
        let spec = ModuleInterfaceSpec::new("b", 2).unwrap().with_inputs(["a"]);
        let config = ExecutorConfig {
            noise_std: 0.0,
            ..Default::default()
        };
        let mut exec = ModuleExecutor::new(spec, Capability::transform(DoublingTransform), config, 1);

        let out = exec.execute(&mut store, None).unwrap();
        assert!((out.output[0] - 0.6).abs() < 1e-12);
        assert!((out.output[1] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_failure_counts_and_propagates() {
        let mut store = InMemoryStore::new();
        let spec = ModuleInterfaceSpec::new("broken", 2).unwrap();
        let mut exec = ModuleExecutor::new(spec, Capability::transform(FailingTransform), ExecutorConfig::default(), 1);

        let err = exec.execute(&mut store, None).unwrap_err();
        match err {
            PhiloopError::ModuleExecution { module, message } => {
                assert_eq!(module, "broken");
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let stats = exec.get_statistics();
        assert_eq!(stats.call_count, 1);
        assert_eq!(stats.error_count, 1);
        assert!(store.read_module_state("broken").unwrap().is_none());
    }

    #[test]
    fn test_same_seed_same_output() {
        let mut store_a = InMemoryStore::new();
        let mut store_b = InMemoryStore::new();
        let mut a = executor(ModuleInterfaceSpec::new("root", 4).unwrap());
        let mut b = executor(ModuleInterfaceSpec::new("root", 4).unwrap());

        assert_eq!(
            a.execute(&mut store_a, None).unwrap().output,
            b.execute(&mut store_b, None).unwrap().output
        );
    }

    #[test]
    fn test_statistics_fresh_executor() {
        let exec = executor(ModuleInterfaceSpec::new("root", 4).unwrap());
        let stats = exec.get_statistics();
        assert_eq!(stats.module_name, "root");
        assert_eq!(stats.call_count, 0);
        assert_eq!(stats.avg_execution_time_ms, 0.0);
    }
}
