//! Pipeline declarations as written in config files.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::module::{CapabilityConfig, ModuleDefinition, ModuleInterfaceSpec};

/// One module declaration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModuleConfig {
    pub name: String,

    #[serde(rename = "embedding-dim")]
    pub embedding_dim: usize,

    /// Modules whose latest output this one consumes.
    #[serde(default)]
    pub inputs: Vec<String>,

    #[serde(rename = "produces-output", default = "default_true")]
    pub produces_output: bool,

    #[serde(rename = "latency-ms", default)]
    pub latency_ms: f64,

    #[serde(default)]
    pub capability: CapabilityConfig,
}

fn default_true() -> bool {
    true
}

impl ModuleConfig {
    pub fn new(name: &str, embedding_dim: usize, inputs: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            embedding_dim,
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            produces_output: true,
            latency_ms: 0.0,
            capability: CapabilityConfig::Blend,
        }
    }

    pub fn with_capability(mut self, capability: CapabilityConfig) -> Self {
        self.capability = capability;
        self
    }

    /// Validate and instantiate the module.
    pub fn to_definition(&self) -> Result<ModuleDefinition> {
        let spec = ModuleInterfaceSpec::new(self.name.clone(), self.embedding_dim)?
            .with_inputs(self.inputs.iter().cloned())
            .with_output(self.produces_output)
            .with_latency_ms(self.latency_ms);
        Ok(ModuleDefinition::with_capability(spec, self.capability.build()))
    }
}

/// Built-in five-stage pipeline used when no config declares one.
pub fn default_pipeline() -> Vec<ModuleConfig> {
    vec![
        ModuleConfig::new("perception", 16, &[]),
        ModuleConfig::new("attention", 16, &["perception"]),
        ModuleConfig::new("memory", 16, &["perception", "attention"]),
        ModuleConfig::new("expectation", 16, &["memory"]).with_capability(CapabilityConfig::Damped { decay: 0.9 }),
        ModuleConfig::new("integration", 16, &["attention", "memory", "expectation"]),
    ]
}
