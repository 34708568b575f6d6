//! Hub access
//!
//! Provides functionality for:
//! - Qualifying bare repo names with the owning organization
//! - Detecting snapshots already present in the local cache
//! - Downloading single files and whole snapshots
//! - Listing and creating repos, and uploading artifact folders

pub mod cache;
pub mod client;
pub mod upload;

pub use cache::{
    cached_snapshot, get_cache_dir, get_cache_size, list_cached_repos, mark_snapshot_complete,
};
pub use client::HfHubClient;

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Operations the library needs from a model hub
///
/// `HfHubClient` talks to a real hub; tests substitute an in-memory or
/// directory-backed implementation.
#[async_trait]
pub trait HubApi: Send + Sync {
    /// Organization that owns repos created by `push_to_hub`
    fn organization(&self) -> &str;

    /// Full ids (`author/name`) of all model repos owned by `author`
    async fn list_models(&self, author: &str) -> Result<Vec<String>>;

    async fn create_repo(&self, repo_id: &str) -> Result<()>;

    /// Fetch one file (may include a subfolder, e.g. `preprocessor/tokenizer.json`)
    async fn download_file(&self, repo_id: &str, filename: &str) -> Result<PathBuf>;

    /// Fetch every file of the repo, returning the local snapshot root
    async fn download_snapshot(&self, repo_id: &str) -> Result<PathBuf>;

    /// Upload every file under `folder` into `path_in_repo` (`.` is the root)
    async fn upload_folder(&self, folder: &Path, repo_id: &str, path_in_repo: &str) -> Result<()>;
}

/// Qualify a bare repo name with `organization`
///
/// Names that already carry a namespace are returned unchanged.
pub fn resolve_pretrained_path(path: &str, organization: &str) -> String {
    if path.contains('/') {
        path.to_string()
    } else {
        format!("{}/{}", organization, path)
    }
}

/// Last path segment of a repo id
pub fn repo_basename(repo_id: &str) -> &str {
    repo_id.rsplit('/').next().unwrap_or(repo_id)
}

/// Create `repo_id` unless the organization already owns a repo with the same base name
///
/// Returns `true` when a repo was created.
pub async fn ensure_repo(hub: &dyn HubApi, repo_id: &str) -> Result<bool> {
    let name = repo_basename(repo_id);
    let existing = hub.list_models(hub.organization()).await?;

    if existing.iter().any(|id| repo_basename(id) == name) {
        tracing::info!(repo_id = %repo_id, "Repo already exists, skipping creation");
        return Ok(false);
    }

    hub.create_repo(repo_id).await?;
    tracing::info!(repo_id = %repo_id, "Created repo");
    Ok(true)
}
