//! Module capabilities - how a stage turns its inputs into an output.
//!
//! Capabilities are chosen when the pipeline is declared. The scheduler never
//! inspects module names to decide behavior.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Pure next-state predictor used by expectation-style stages.
pub trait Predictor: Send {
    /// Predict the next embedding from the current one. Must not have side effects.
    fn predict_next_state(&self, current: &[f64]) -> Result<Vec<f64>>;

    /// Short name used in logs and pipeline listings.
    fn name(&self) -> &str {
        "predictor"
    }
}

/// Custom computation replacing the default mean blend.
pub trait Transform: Send {
    /// Compute an output from inputs already resized to the module's dimension.
    fn transform(&mut self, inputs: &[Vec<f64>]) -> Result<Vec<f64>>;

    fn name(&self) -> &str {
        "transform"
    }
}

/// How a module computes its output.
pub enum Capability {
    /// Elementwise mean of inputs (or a random seed for root stages)
    Blend,
    /// Delegate to a predictor with the single available input
    Predict(Box<dyn Predictor>),
    /// Delegate to a custom transform
    Transform(Box<dyn Transform>),
}

impl Capability {
    pub fn predictor(p: impl Predictor + 'static) -> Self {
        Self::Predict(Box::new(p))
    }

    pub fn transform(t: impl Transform + 'static) -> Self {
        Self::Transform(Box::new(t))
    }

    pub fn label(&self) -> String {
        match self {
            Self::Blend => "blend".to_string(),
            Self::Predict(p) => format!("predict:{}", p.name()),
            Self::Transform(t) => format!("transform:{}", t.name()),
        }
    }
}

impl Default for Capability {
    fn default() -> Self {
        Self::Blend
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Capability").field(&self.label()).finish()
    }
}

/// Returns its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPredictor;

impl Predictor for IdentityPredictor {
    fn predict_next_state(&self, current: &[f64]) -> Result<Vec<f64>> {
        Ok(current.to_vec())
    }

    fn name(&self) -> &str {
        "identity"
    }
}

/// Rotates the embedding by `shift` positions.
#[derive(Debug, Clone, Copy)]
pub struct RollPredictor {
    pub shift: usize,
}

impl Predictor for RollPredictor {
    fn predict_next_state(&self, current: &[f64]) -> Result<Vec<f64>> {
        let mut next = current.to_vec();
        if !next.is_empty() {
            let k = self.shift % next.len();
            next.rotate_right(k);
        }
        Ok(next)
    }

    fn name(&self) -> &str {
        "roll"
    }
}

/// Blends the state toward its own mean, `x' = decay * x + (1 - decay) * mean(x)`.
#[derive(Debug, Clone, Copy)]
pub struct DampedPredictor {
    pub decay: f64,
}

impl Predictor for DampedPredictor {
    fn predict_next_state(&self, current: &[f64]) -> Result<Vec<f64>> {
        if current.is_empty() {
            return Ok(Vec::new());
        }
        let mean = current.iter().sum::<f64>() / current.len() as f64;
        Ok(current
            .iter()
            .map(|x| self.decay * x + (1.0 - self.decay) * mean)
            .collect())
    }

    fn name(&self) -> &str {
        "damped"
    }
}

/// Declarative capability selection, as written in pipeline config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CapabilityConfig {
    #[default]
    Blend,
    Identity,
    Roll {
        #[serde(default = "default_shift")]
        shift: usize,
    },
    Damped {
        #[serde(default = "default_decay")]
        decay: f64,
    },
}

fn default_shift() -> usize {
    1
}

fn default_decay() -> f64 {
    0.9
}

impl CapabilityConfig {
    /// Instantiate the capability this declaration names.
    pub fn build(&self) -> Capability {
        match self {
            Self::Blend => Capability::Blend,
            Self::Identity => Capability::predictor(IdentityPredictor),
            Self::Roll { shift } => Capability::predictor(RollPredictor { shift: *shift }),
            Self::Damped { decay } => Capability::predictor(DampedPredictor { decay: *decay }),
        }
    }
}
