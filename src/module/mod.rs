//! Pipeline modules - interface descriptors, capabilities and executors.

mod capability;
mod executor;
mod spec;
pub mod vector;

pub use capability::{
    Capability, CapabilityConfig, DampedPredictor, IdentityPredictor, Predictor, RollPredictor, Transform,
};
pub use executor::{ExecutorConfig, ExecutorStatistics, Fallback, ModuleExecutor, ModuleOutput};
pub use spec::ModuleInterfaceSpec;

/// A module as handed to the loop: its interface plus how it computes.
#[derive(Debug)]
pub struct ModuleDefinition {
    pub spec: ModuleInterfaceSpec,
    pub capability: Capability,
}

impl ModuleDefinition {
    /// A module using the default mean blend.
    pub fn blend(spec: ModuleInterfaceSpec) -> Self {
        Self {
            spec,
            capability: Capability::Blend,
        }
    }

    pub fn with_capability(spec: ModuleInterfaceSpec, capability: Capability) -> Self {
        Self { spec, capability }
    }
}

impl From<ModuleInterfaceSpec> for ModuleDefinition {
    fn from(spec: ModuleInterfaceSpec) -> Self {
        Self::blend(spec)
    }
}
