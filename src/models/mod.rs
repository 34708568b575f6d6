//! Pretrained models
//!
//! Provides functionality for:
//! - The [`Model`] trait concrete architectures implement
//! - [`Pretrained`], which ties a model to its config and backing artifacts
//! - Loading from a local bundle or the hub, saving, and pushing back

pub mod pretrained;
pub mod sequence_labeling;

pub use pretrained::Pretrained;

use crate::config::Config;
use crate::error::{HubError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Whether a model is built for inference or training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelMode {
    #[default]
    Inference,
    Training,
}

impl ModelMode {
    pub fn list() -> &'static [ModelMode] {
        &[ModelMode::Inference, ModelMode::Training]
    }

    pub fn is_training(&self) -> bool {
        matches!(self, ModelMode::Training)
    }
}

impl std::fmt::Display for ModelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inference => write!(f, "inference"),
            Self::Training => write!(f, "training"),
        }
    }
}

impl std::str::FromStr for ModelMode {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inference" => Ok(Self::Inference),
            "training" => Ok(Self::Training),
            other => Err(HubError::InvalidInput(format!(
                "unknown model mode '{}', expected one of: inference, training",
                other
            ))),
        }
    }
}

/// A concrete model architecture
///
/// Only weight persistence is required. Everything else is optional and
/// reports [`HubError::NotImplemented`] until the architecture provides it.
pub trait Model: Sized + Send + 'static {
    type Config: Config;
    type Inputs;
    type Outputs;
    type Prediction;

    /// Construct the framework module from a resolved config
    fn build_model(_config: &Self::Config, _mode: ModelMode) -> Result<Self> {
        Err(HubError::not_implemented::<Self>("build_model"))
    }

    fn forward(&mut self, _inputs: Self::Inputs) -> Result<Self::Outputs> {
        Err(HubError::not_implemented::<Self>("forward"))
    }

    fn predict(&mut self, _inputs: Self::Inputs) -> Result<Self::Prediction> {
        Err(HubError::not_implemented::<Self>("predict"))
    }

    fn postprocess(&self, _outputs: Self::Outputs) -> Result<Self::Prediction> {
        Err(HubError::not_implemented::<Self>("postprocess"))
    }

    fn load_weights(&mut self, path: &Path) -> Result<()>;

    fn save_weights(&self, path: &Path) -> Result<()>;
}
