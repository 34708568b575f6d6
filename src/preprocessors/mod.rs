//! Preprocessors that turn raw text into model inputs
//!
//! A tokenizer bundle lives in the `preprocessor/` folder of an artifact
//! bundle: the `tokenizers`-native `tokenizer.json` next to our own
//! `tokenizer_config.toml`.

pub mod tokenizers;

use crate::config::{Config, ConfigOverrides};
use crate::error::{HubError, Result};
use crate::hub::{HubApi, ensure_repo, resolve_pretrained_path};
use crate::registry;
use crate::repo::{PREPROCESSOR_SUBFOLDER, TOKENIZER_CONFIG_FILE, TOKENIZER_FILE, read_registry_name};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A tokenizer wrapping one `tokenizers::Tokenizer`
#[async_trait]
pub trait Tokenizer: Sized + Send + Sync + 'static {
    type Config: Config;
    type TrainConfig: Clone + std::fmt::Debug + Send + Sync;

    fn from_parts(tokenizer: ::tokenizers::Tokenizer, config: Self::Config) -> Self;

    fn config(&self) -> &Self::Config;

    fn inner(&self) -> &::tokenizers::Tokenizer;

    fn inner_mut(&mut self) -> &mut ::tokenizers::Tokenizer;

    /// Build the wrapped tokenizer described by a resolved config
    async fn build(config: &Self::Config, hub: &dyn HubApi) -> Result<::tokenizers::Tokenizer>;

    /// Retrain the vocabulary in place from text files
    fn train(&mut self, files: &[PathBuf], config: &Self::TrainConfig) -> Result<()>;

    /// Retrain the vocabulary in place from an iterator of texts
    fn train_from_iterator<I, S>(&mut self, dataset: I, config: &Self::TrainConfig) -> Result<()>
    where
        I: Iterator<Item = S> + Send,
        S: AsRef<str> + Send;

    /// Merge `overrides` into `config` and build
    async fn from_config(
        config: Self::Config,
        overrides: &ConfigOverrides,
        hub: &dyn HubApi,
    ) -> Result<Self> {
        let config = config.merge(overrides)?;
        let tokenizer = Self::build(&config, hub).await?;
        Ok(Self::from_parts(tokenizer, config))
    }

    /// Load from a local bundle directory or a hub repo
    ///
    /// Only the tokenizer files are fetched, never the model weights.
    async fn from_pretrained(
        path: &str,
        overrides: &ConfigOverrides,
        hub: &dyn HubApi,
    ) -> Result<Self> {
        let config_file = format!("{}/{}", PREPROCESSOR_SUBFOLDER, TOKENIZER_CONFIG_FILE);
        let (source, config_path) = if Path::new(path).is_dir() {
            (path.to_string(), Path::new(path).join(&config_file))
        } else {
            let repo_id = resolve_pretrained_path(path, hub.organization());
            let local = hub.download_file(&repo_id, &config_file).await?;
            (repo_id, local)
        };
        if !config_path.is_file() {
            return Err(HubError::MissingFile(config_path));
        }

        let name = read_registry_name(&config_path)?;
        registry::preprocessors()
            .lookup(&name)?
            .ensure::<Self, Self::Config>()?;

        let mut config = Self::Config::load(&config_path)?;
        config.set_pretrained_path(Some(source));

        let tokenizer = Self::from_config(config, overrides, hub).await?;
        tracing::info!(path = %path, name = %name, "Tokenizer loaded");
        Ok(tokenizer)
    }

    /// Encode a batch of texts
    fn encode(&self, texts: &[&str], add_special_tokens: bool) -> Result<Vec<::tokenizers::Encoding>> {
        self.inner()
            .encode_batch(texts.to_vec(), add_special_tokens)
            .map_err(HubError::tokenizer)
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.inner()
            .decode(ids, skip_special_tokens)
            .map_err(HubError::tokenizer)
    }

    /// Full vocabulary, added tokens included
    fn vocab(&self) -> HashMap<String, u32> {
        self.inner().get_vocab(true)
    }

    fn vocab_size(&self) -> usize {
        self.inner().get_vocab_size(true)
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.inner().token_to_id(token)
    }

    /// Write `preprocessor/` under the bundle directory `path`
    fn save_pretrained(&self, path: &Path) -> Result<()> {
        let dir = path.join(PREPROCESSOR_SUBFOLDER);
        std::fs::create_dir_all(&dir)?;

        self.inner()
            .save(dir.join(TOKENIZER_FILE), true)
            .map_err(HubError::tokenizer)?;
        self.config().save(&dir.join(TOKENIZER_CONFIG_FILE))?;

        tracing::info!(path = ?path, "Tokenizer saved");
        Ok(())
    }

    /// Upload into `preprocessor/` of `repo_id`, returning the qualified hub id
    async fn push_to_hub(&self, repo_id: &str, hub: &dyn HubApi) -> Result<String> {
        let repo_id = resolve_pretrained_path(repo_id, hub.organization());
        ensure_repo(hub, &repo_id).await?;

        let staging = tempfile::tempdir()?;
        self.save_pretrained(staging.path())?;

        let staged_dir = staging.path().join(PREPROCESSOR_SUBFOLDER);
        let config_path = staged_dir.join(TOKENIZER_CONFIG_FILE);
        let mut staged = Self::Config::load(&config_path)?;
        staged.set_pretrained_path(Some(repo_id.clone()));
        staged.save(&config_path)?;

        hub.upload_folder(&staged_dir, &repo_id, PREPROCESSOR_SUBFOLDER)
            .await?;

        tracing::info!(repo_id = %repo_id, "Tokenizer pushed to hub");
        Ok(repo_id)
    }
}
