//! Artifact bundles on disk
//!
//! A [`Repo`] is a local directory holding one pretrained bundle, either
//! given directly by the caller or downloaded from the hub into the cache:
//! ```text
//! <repo_dir>/
//! ├── config.toml
//! ├── model.safetensors
//! └── preprocessor/
//!     ├── tokenizer.json
//!     └── tokenizer_config.toml
//! ```

use crate::config::Config;
use crate::error::{HubError, Result};
use crate::hub::{HubApi, resolve_pretrained_path};
use candle_core::{Device, Tensor};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.toml";
pub const MODEL_FILE: &str = "model.safetensors";
pub const PREPROCESSOR_SUBFOLDER: &str = "preprocessor";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.toml";

/// Named tensors loaded from a weights file
pub type StateDict = HashMap<String, Tensor>;

/// A resolved artifact bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repo {
    /// What the caller asked for (local path or hub id)
    source: String,
    /// Fully qualified hub id when the bundle came from the hub
    repo_id: Option<String>,
    repo_dir: PathBuf,
}

impl Repo {
    /// Resolve `path` to a local bundle, downloading it when it is not a local directory
    pub async fn resolve(path: &str, hub: &dyn HubApi) -> Result<Self> {
        if Path::new(path).is_dir() {
            return Self::local(path);
        }

        let repo_id = resolve_pretrained_path(path, hub.organization());
        let repo_dir = hub.download_snapshot(&repo_id).await?;
        tracing::debug!(repo_id = %repo_id, path = ?repo_dir, "Resolved hub repo");

        Ok(Self {
            source: path.to_string(),
            repo_id: Some(repo_id),
            repo_dir,
        })
    }

    /// Wrap an existing local directory
    pub fn local(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(HubError::MissingFile(dir.to_path_buf()));
        }
        Ok(Self {
            source: dir.to_string_lossy().to_string(),
            repo_id: None,
            repo_dir: dir.to_path_buf(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn repo_id(&self) -> Option<&str> {
        self.repo_id.as_deref()
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn is_local(&self) -> bool {
        self.repo_id.is_none()
    }

    /// Registry key stored under `name` in the bundle's config
    pub fn registry_name(&self) -> Result<String> {
        self.registry_name_in(CONFIG_FILE)
    }

    /// Registry key stored under `name` in `config_file`
    pub fn registry_name_in(&self, config_file: &str) -> Result<String> {
        read_registry_name(&self.existing(config_file)?)
    }

    /// Read the bundle's model config
    pub fn get_config<C: Config>(&self) -> Result<C> {
        self.get_config_file(CONFIG_FILE)
    }

    /// Read a config from a file inside the bundle
    pub fn get_config_file<C: Config>(&self, config_file: &str) -> Result<C> {
        C::load(&self.existing(config_file)?)
    }

    /// Path of the weights file
    pub fn model_file(&self) -> Result<PathBuf> {
        self.existing(MODEL_FILE)
    }

    /// Load the weights file into named tensors
    pub fn get_model(&self, device: &Device) -> Result<StateDict> {
        let path = self.model_file()?;
        Ok(candle_core::safetensors::load(path, device)?)
    }

    pub fn preprocessor_dir(&self) -> PathBuf {
        self.repo_dir.join(PREPROCESSOR_SUBFOLDER)
    }

    /// Path of the tokenizer artifact
    pub fn tokenizer_file(&self) -> Result<PathBuf> {
        self.existing(&format!("{}/{}", PREPROCESSOR_SUBFOLDER, TOKENIZER_FILE))
    }

    fn existing(&self, relative: &str) -> Result<PathBuf> {
        let path = self.repo_dir.join(relative);
        if path.is_file() {
            Ok(path)
        } else {
            Err(HubError::MissingFile(path))
        }
    }

    /// Copy the bundle at `src` into `dst`, removing `src` unless `keep_source`
    ///
    /// Symlinks (as found in hub cache snapshots) are followed, so `dst`
    /// always receives real files.
    pub fn move_repo(src: &Path, dst: &Path, keep_source: bool) -> Result<()> {
        if !src.is_dir() {
            return Err(HubError::MissingFile(src.to_path_buf()));
        }
        let (src_canonical, dst_canonical) = (std::fs::canonicalize(src)?, canonical_target(dst)?);
        if src_canonical == dst_canonical {
            tracing::debug!(path = ?src, "Source and destination are the same, nothing to copy");
            return Ok(());
        }
        if dst_canonical.starts_with(&src_canonical) {
            return Err(HubError::InvalidInput(format!(
                "cannot copy {:?} into its own subdirectory {:?}",
                src, dst
            )));
        }

        std::fs::create_dir_all(dst)?;
        copy_dir(src, dst)?;

        if !keep_source {
            std::fs::remove_dir_all(src)?;
        }

        tracing::debug!(src = ?src, dst = ?dst, keep_source, "Copied repo");
        Ok(())
    }
}

/// Read the `name` key of a config file without deserializing the rest
pub fn read_registry_name(path: &Path) -> Result<String> {
    let table: toml::Table = toml::from_str(&std::fs::read_to_string(path)?)?;
    table
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| HubError::MissingConfig(format!("`name` is not set in {:?}", path)))
}

/// Canonical form of `path`, which may not exist yet
///
/// The nearest existing ancestor is canonicalized and the missing tail
/// appended, so nothing is created on disk.
fn canonical_target(path: &Path) -> Result<PathBuf> {
    let mut existing = path;
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => break,
        }
    }

    let base = if existing.as_os_str().is_empty() {
        std::env::current_dir()?
    } else {
        std::fs::canonicalize(existing)?
    };
    Ok(missing.into_iter().rev().fold(base, |acc, name| acc.join(name)))
}

fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    for entry in std::fs::read_dir(src)? {
        let path = entry?.path();
        let Some(name) = path.file_name() else {
            continue;
        };
        let target = dst.join(name);
        if path.is_dir() {
            std::fs::create_dir_all(&target)?;
            copy_dir(&path, &target)?;
        } else {
            std::fs::copy(&path, &target)?;
        }
    }
    Ok(())
}
