//! Lifecycle of a model backed by an artifact bundle

use super::{Model, ModelMode};
use crate::config::{Config, ConfigOverrides};
use crate::error::Result;
use crate::hub::{HubApi, ensure_repo, resolve_pretrained_path};
use crate::registry;
use crate::repo::{CONFIG_FILE, MODEL_FILE, Repo};
use std::path::Path;

/// A built model together with its config and the bundle it came from
pub struct Pretrained<M: Model> {
    repo: Option<Repo>,
    config: M::Config,
    mode: ModelMode,
    model: M,
}

impl<M: Model> std::fmt::Debug for Pretrained<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pretrained")
            .field("model", &std::any::type_name::<M>())
            .field("repo", &self.repo)
            .field("config", &self.config)
            .field("mode", &self.mode)
            .finish()
    }
}

impl<M: Model> Pretrained<M> {
    /// Merge `overrides` into `config`, resolve it and build the model
    pub fn new(
        config: M::Config,
        mode: ModelMode,
        repo: Option<Repo>,
        overrides: &ConfigOverrides,
    ) -> Result<Self> {
        let config = config.merge(overrides)?;
        let model = M::build_model(&config, mode)?;

        tracing::debug!(
            name = %config.name(),
            mode = %mode,
            overrides = overrides.len(),
            "Model built"
        );

        Ok(Self {
            repo,
            config,
            mode,
            model,
        })
    }

    /// Load a model from a local bundle directory or a hub repo
    ///
    /// Bare hub names are qualified with the hub's organization. The bundle's
    /// registry name must map to `M`.
    pub async fn from_pretrained(
        path: &str,
        overrides: &ConfigOverrides,
        hub: &dyn HubApi,
    ) -> Result<Self> {
        let repo = Repo::resolve(path, hub).await?;

        let name = repo.registry_name()?;
        registry::models()
            .lookup(&name)?
            .ensure::<M, M::Config>()?;

        let config: M::Config = repo.get_config()?;
        let model_file = repo.model_file()?;

        let mut pretrained = Self::new(config, ModelMode::Inference, Some(repo), overrides)?;
        pretrained.model.load_weights(&model_file)?;

        tracing::info!(path = %path, name = %name, "Model loaded");
        Ok(pretrained)
    }

    /// Write the bundle to `path`
    ///
    /// Files of the backing bundle are copied first, then the current config
    /// and weights overwrite their counterparts.
    pub fn save_pretrained(&self, path: &Path) -> Result<()> {
        match &self.repo {
            Some(repo) => Repo::move_repo(repo.repo_dir(), path, true)?,
            None => std::fs::create_dir_all(path)?,
        }

        self.config.save(&path.join(CONFIG_FILE))?;
        self.model.save_weights(&path.join(MODEL_FILE))?;

        tracing::info!(path = ?path, "Model saved");
        Ok(())
    }

    /// Upload the bundle to `repo_id`, returning the qualified hub id
    ///
    /// The bundle is staged in a temporary directory so the backing
    /// directory is left untouched.
    pub async fn push_to_hub(&self, repo_id: &str, hub: &dyn HubApi) -> Result<String> {
        let repo_id = resolve_pretrained_path(repo_id, hub.organization());
        ensure_repo(hub, &repo_id).await?;

        let staging = tempfile::tempdir()?;
        self.save_pretrained(staging.path())?;

        let config_path = staging.path().join(CONFIG_FILE);
        let mut staged = M::Config::load(&config_path)?;
        staged.set_pretrained_path(Some(repo_id.clone()));
        staged.save(&config_path)?;

        hub.upload_folder(staging.path(), &repo_id, ".").await?;

        tracing::info!(repo_id = %repo_id, "Model pushed to hub");
        Ok(repo_id)
    }

    pub fn forward(&mut self, inputs: M::Inputs) -> Result<M::Outputs> {
        self.model.forward(inputs)
    }

    pub fn predict(&mut self, inputs: M::Inputs) -> Result<M::Prediction> {
        self.model.predict(inputs)
    }

    pub fn postprocess(&self, outputs: M::Outputs) -> Result<M::Prediction> {
        self.model.postprocess(outputs)
    }

    pub fn config(&self) -> &M::Config {
        &self.config
    }

    pub fn mode(&self) -> ModelMode {
        self.mode
    }

    pub fn repo(&self) -> Option<&Repo> {
        self.repo.as_ref()
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }
}
