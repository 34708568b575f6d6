//! Configuration structures and loading logic
//!
//! Two kinds of configuration live here:
//! - [`HubSettings`]: where the hub is, which organization owns pushed repos,
//!   and where downloads are cached. Loaded from TOML plus environment.
//! - [`Config`]: the per-model / per-tokenizer option sets persisted next to
//!   artifacts, and [`ConfigOverrides`] for merging caller-supplied values.

use crate::error::{HubError, Result};
use crate::hub::cache::get_cache_dir;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// Hub connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HubSettings {
    pub endpoint: String,
    /// Organization that owns repos created by `push_to_hub`
    pub organization: String,
    pub revision: String,
    pub cache_dir: PathBuf,
    pub progress: bool,

    /// Never written back to disk
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            organization: default_organization(),
            revision: default_revision(),
            cache_dir: get_cache_dir(),
            progress: false,
            token: None,
        }
    }
}

impl HubSettings {
    /// Load settings from file with environment variable overrides
    pub fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let mut settings = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        // Environment variable overrides
        if let Ok(endpoint) = std::env::var("MODELHUB_ENDPOINT")
            .or_else(|_| std::env::var("HF_ENDPOINT"))
        {
            settings.endpoint = endpoint;
        }
        if let Ok(org) = std::env::var("MODELHUB_ORG") {
            settings.organization = org;
        }
        if let Ok(cache_dir) = std::env::var("MODELHUB_CACHE") {
            settings.cache_dir = PathBuf::from(cache_dir);
        }
        if let Ok(revision) = std::env::var("MODELHUB_REVISION") {
            settings.revision = revision;
        }
        if let Ok(token) = std::env::var("HF_TOKEN") {
            settings.token = Some(token);
        }

        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            anyhow::bail!(
                "Hub endpoint must be an http(s) URL (got '{}')",
                self.endpoint
            );
        }
        if self.organization.is_empty() {
            anyhow::bail!("Hub organization cannot be empty");
        }
        if self.organization.contains('/') {
            anyhow::bail!(
                "Hub organization '{}' cannot contain '/'",
                self.organization
            );
        }
        if self.revision.is_empty() {
            anyhow::bail!("Hub revision cannot be empty");
        }
        Ok(())
    }
}

fn default_endpoint() -> String {
    "https://huggingface.co".to_string()
}
fn default_organization() -> String {
    "modelhub".to_string()
}
fn default_revision() -> String {
    "main".to_string()
}

/// Option set persisted alongside a model or tokenizer
///
/// Implementors derive serde with `#[serde(default)]` so every option has a
/// default; [`Config::resolve`] then fills derived options and rejects
/// configurations that are still missing something required.
pub trait Config: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    /// Registry key of the implementation this config belongs to
    fn name(&self) -> &str;

    fn pretrained_path(&self) -> Option<&str>;

    fn set_pretrained_path(&mut self, path: Option<String>);

    /// Fill derived options and validate required ones
    fn resolve(&mut self) -> Result<()> {
        Ok(())
    }

    /// Apply overrides on top of this config, then resolve
    fn merge(self, overrides: &ConfigOverrides) -> Result<Self> {
        let mut merged = overrides.apply(&self)?;
        merged.resolve()?;
        Ok(merged)
    }

    fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(HubError::MissingFile(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Caller-supplied option values that take precedence over a config
///
/// Keys may be dotted paths into nested tables, e.g. `train_config.vocab_size`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    values: Vec<(String, toml::Value)>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an override
    pub fn set(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.values.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.values.push((key, value)),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        self.values.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Build a new config of the same type with the overrides applied
    ///
    /// Keys that do not survive the round trip through `C` are unknown
    /// options and are rejected.
    pub fn apply<C>(&self, base: &C) -> Result<C>
    where
        C: Serialize + DeserializeOwned,
    {
        if self.values.is_empty() {
            return Ok(toml::Value::try_from(base)?.try_into()?);
        }

        let mut root = match toml::Value::try_from(base)? {
            toml::Value::Table(table) => table,
            other => {
                return Err(HubError::InvalidConfig(format!(
                    "expected a table, got {}",
                    other.type_str()
                )));
            }
        };

        for (key, value) in &self.values {
            set_path(&mut root, key, value.clone())?;
        }

        let merged: C = toml::Value::Table(root).try_into()?;

        // Detect keys serde silently ignored
        let check = toml::Value::try_from(&merged)?;
        for (key, _) in &self.values {
            if lookup_path(&check, key).is_none() {
                return Err(HubError::InvalidConfig(format!("unknown option '{}'", key)));
            }
        }

        Ok(merged)
    }
}

fn set_path(root: &mut toml::Table, key: &str, value: toml::Value) -> Result<()> {
    let mut parts = key.split('.').peekable();
    let mut table = root;
    while let Some(part) = parts.next() {
        if part.is_empty() {
            return Err(HubError::InvalidConfig(format!("invalid option key '{}'", key)));
        }
        if parts.peek().is_none() {
            table.insert(part.to_string(), value);
            return Ok(());
        }
        let entry = table
            .entry(part.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        table = match entry {
            toml::Value::Table(inner) => inner,
            _ => {
                return Err(HubError::InvalidConfig(format!(
                    "option '{}' is not a table",
                    part
                )));
            }
        };
    }
    Ok(())
}

fn lookup_path<'a>(value: &'a toml::Value, key: &str) -> Option<&'a toml::Value> {
    key.split('.')
        .try_fold(value, |current, part| current.as_table()?.get(part))
}
