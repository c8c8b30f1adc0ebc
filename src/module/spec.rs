//! Module interface descriptors.

use serde::{Deserialize, Serialize};

use crate::error::{PhiloopError, Result};

/// Immutable descriptor of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawModuleInterfaceSpec")]
pub struct ModuleInterfaceSpec {
    name: String,
    embedding_dim: usize,
    required_inputs: Vec<String>,
    produces_output: bool,
    latency_ms: f64,
}

/// Unchecked wire form; only reachable through `TryFrom`.
#[derive(Deserialize)]
struct RawModuleInterfaceSpec {
    name: String,
    embedding_dim: usize,
    #[serde(default)]
    required_inputs: Vec<String>,
    #[serde(default = "default_produces_output")]
    produces_output: bool,
    #[serde(default)]
    latency_ms: f64,
}

fn default_produces_output() -> bool {
    true
}

impl TryFrom<RawModuleInterfaceSpec> for ModuleInterfaceSpec {
    type Error = PhiloopError;

    fn try_from(raw: RawModuleInterfaceSpec) -> Result<Self> {
        Ok(Self::new(raw.name, raw.embedding_dim)?
            .with_inputs(raw.required_inputs)
            .with_output(raw.produces_output)
            .with_latency_ms(raw.latency_ms))
    }
}

impl ModuleInterfaceSpec {
    /// Create a spec for a module with no inputs that writes its output.
    pub fn new(name: impl Into<String>, embedding_dim: usize) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PhiloopError::Configuration(
                "module name cannot be empty".to_string(),
            ));
        }
        if embedding_dim == 0 {
            return Err(PhiloopError::Configuration(format!(
                "module '{}': embedding_dim must be > 0",
                name
            )));
        }
        Ok(Self {
            name,
            embedding_dim,
            required_inputs: Vec::new(),
            produces_output: true,
            latency_ms: 0.0,
        })
    }

    /// Declare the modules whose latest output this module consumes.
    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Set whether the module writes its output back to the store.
    pub fn with_output(mut self, produces_output: bool) -> Self {
        self.produces_output = produces_output;
        self
    }

    /// Set the informational latency.
    pub fn with_latency_ms(mut self, latency_ms: f64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    pub fn required_inputs(&self) -> &[String] {
        &self.required_inputs
    }

    pub fn produces_output(&self) -> bool {
        self.produces_output
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency_ms
    }

    /// A root stage has nothing upstream and seeds the pipeline.
    pub fn is_root(&self) -> bool {
        self.required_inputs.is_empty()
    }
}
