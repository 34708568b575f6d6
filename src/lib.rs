//! modelhub - pretrained model and tokenizer lifecycle against a model hub
//!
//! Resolves artifact bundles from a local directory or a hub repo, looks up
//! the implementation named by the bundle's config in a process-wide
//! registry, builds it with merged configuration, and saves or pushes it
//! back.

pub mod config;
pub mod error;
pub mod hub;
pub mod metrics;
pub mod models;
pub mod preprocessors;
pub mod registry;
pub mod repo;

pub use config::{Config, ConfigOverrides, HubSettings};
pub use error::{HubError, Result};
pub use hub::{HfHubClient, HubApi};
pub use models::sequence_labeling::{DistilBertSequenceLabeling, DistilBertSequenceLabelingConfig};
pub use models::{Model, ModelMode, Pretrained};
pub use preprocessors::Tokenizer;
pub use preprocessors::tokenizers::{WordPieceConfig, WordPieceTokenizer, WordPieceTrainConfig};
pub use registry::{Registration, Registry, RegistryKind, register_model, register_preprocessor};
pub use repo::Repo;
