//! Configuration for philoop.
//!
//! Loaded from an explicit path, ./philoop.yml, or ~/.config/philoop/philoop.yml,
//! falling back to defaults.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub use self::pipeline::{ModuleConfig, default_pipeline};

mod pipeline;

use crate::runner::{IntegrationLoop, IntegrationLoopConfig};
use crate::store::{InMemoryStore, InMemoryStoreConfig};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,

    /// Scheduler settings.
    #[serde(rename = "loop")]
    pub integration: IntegrationLoopConfig,

    /// Reference store settings.
    pub store: InMemoryStoreConfig,

    /// Batch run defaults.
    pub run: RunConfig,

    /// Modules in execution order.
    pub pipeline: Vec<ModuleConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            integration: IntegrationLoopConfig::default(),
            store: InMemoryStoreConfig::default(),
            run: RunConfig::default(),
            pipeline: default_pipeline(),
        }
    }
}

/// Defaults for `philoop run`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    pub cycles: usize,

    #[serde(rename = "collect-metrics-every")]
    pub collect_metrics_every: usize,

    /// Where telemetry is written after a run.
    pub output: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            cycles: 100,
            collect_metrics_every: 1,
            output: dirs::data_local_dir().map(|dir| dir.join("philoop").join("state.json")),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. philoop.yml in current directory
    /// 3. ~/.config/philoop/philoop.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from("philoop.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from philoop.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load philoop.yml: {}", e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("philoop").join("philoop.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.is_empty() {
            eyre::bail!("pipeline must declare at least one module");
        }
        if self.run.collect_metrics_every == 0 {
            eyre::bail!("run.collect-metrics-every must be > 0");
        }
        if self.integration.history_capacity == Some(0) {
            eyre::bail!("loop.history_capacity must be > 0 when set");
        }

        self.integration.executor.validate().context("invalid loop.executor settings")?;
        self.store.validate().context("invalid store settings")?;

        let mut seen = HashSet::new();
        for module in &self.pipeline {
            if !seen.insert(module.name.as_str()) {
                eyre::bail!("duplicate module name: {}", module.name);
            }
            module
                .to_definition()
                .with_context(|| format!("invalid module '{}'", module.name))?;
        }
        Ok(())
    }

    /// Build a loop over a fresh in-memory store.
    pub fn build_loop(&self) -> Result<IntegrationLoop<InMemoryStore>> {
        let modules = self
            .pipeline
            .iter()
            .map(ModuleConfig::to_definition)
            .collect::<crate::Result<Vec<_>>>()?;
        let store = InMemoryStore::with_config(self.store.clone());
        let integration_loop = IntegrationLoop::new(store, modules, self.integration.clone())?;
        Ok(integration_loop)
    }
}
