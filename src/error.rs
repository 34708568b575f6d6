//! Error types for hub, registry and pretrained artifact operations

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T, E = HubError> = std::result::Result<T, E>;

/// Errors raised by the library
///
/// Nothing here is retried locally; every failure propagates to the caller.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("{kind} '{name}' is not registered")]
    NotFound { kind: &'static str, name: String },

    #[error("`{method}` is not implemented for {type_name}")]
    NotImplemented {
        type_name: &'static str,
        method: &'static str,
    },

    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("'{name}' is registered as {registered}, not {requested}")]
    TypeMismatch {
        name: String,
        registered: &'static str,
        requested: &'static str,
    },

    #[error("Expected file not found: {0:?}")]
    MissingFile(PathBuf),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Download failed: {0}")]
    Download(#[from] hf_hub::api::tokio::ApiError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Hub returned {status}: {message}")]
    Hub { status: u16, message: String },

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Tensor error: {0}")]
    Candle(#[from] candle_core::Error),
}

impl HubError {
    /// Error for a provided trait method the concrete type did not override
    pub fn not_implemented<T: ?Sized>(method: &'static str) -> Self {
        HubError::NotImplemented {
            type_name: std::any::type_name::<T>(),
            method,
        }
    }

    /// Wrap an error coming out of the `tokenizers` crate
    pub fn tokenizer(err: impl std::fmt::Display) -> Self {
        HubError::Tokenizer(err.to_string())
    }
}
