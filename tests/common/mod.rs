//! Shared fixtures for integration tests
//!
//! `MockHub` stores "remote" repos as plain directories and records every
//! write so tests can assert on repo creation and uploads without network.

#![allow(dead_code)]

use async_trait::async_trait;
use modelhub::hub::HubApi;
use modelhub::{HubError, Repo, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

pub const ORG: &str = "modelhub-test";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub repo_id: String,
    pub path_in_repo: String,
    pub files: Vec<String>,
}

pub struct MockHub {
    remote: TempDir,
    downloads: TempDir,
    repos: Mutex<BTreeSet<String>>,
    created: Mutex<Vec<String>>,
    uploads: Mutex<Vec<Upload>>,
    downloaded: Mutex<Vec<String>>,
}

impl MockHub {
    pub fn new() -> Self {
        Self {
            remote: TempDir::new().unwrap(),
            downloads: TempDir::new().unwrap(),
            repos: Mutex::new(BTreeSet::new()),
            created: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            downloaded: Mutex::new(Vec::new()),
        }
    }

    /// Pretend `repo_id` already exists on the hub (without files)
    pub fn with_existing(self, repo_id: &str) -> Self {
        self.repos.lock().unwrap().insert(repo_id.to_string());
        std::fs::create_dir_all(self.remote_dir(repo_id)).unwrap();
        self
    }

    /// Publish the contents of `bundle` as `repo_id`
    pub fn seed(&self, repo_id: &str, bundle: &Path) {
        self.repos.lock().unwrap().insert(repo_id.to_string());
        Repo::move_repo(bundle, &self.remote_dir(repo_id), true).unwrap();
    }

    pub fn remote_dir(&self, repo_id: &str) -> PathBuf {
        self.remote.path().join(repo_id)
    }

    pub fn download_root(&self) -> &Path {
        self.downloads.path()
    }

    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }

    /// `repo_id/filename` of every single-file download
    pub fn downloaded(&self) -> Vec<String> {
        self.downloaded.lock().unwrap().clone()
    }

    fn not_found(repo_id: &str) -> HubError {
        HubError::Hub {
            status: 404,
            message: format!("repo {} not found", repo_id),
        }
    }
}

#[async_trait]
impl HubApi for MockHub {
    fn organization(&self) -> &str {
        ORG
    }

    async fn list_models(&self, author: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", author);
        Ok(self
            .repos
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn create_repo(&self, repo_id: &str) -> Result<()> {
        self.created.lock().unwrap().push(repo_id.to_string());
        self.repos.lock().unwrap().insert(repo_id.to_string());
        std::fs::create_dir_all(self.remote_dir(repo_id))?;
        Ok(())
    }

    async fn download_file(&self, repo_id: &str, filename: &str) -> Result<PathBuf> {
        let source = self.remote_dir(repo_id).join(filename);
        if !source.is_file() {
            return Err(Self::not_found(&format!("{}/{}", repo_id, filename)));
        }
        let target = self.downloads.path().join(repo_id).join(filename);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&source, &target)?;
        self.downloaded
            .lock()
            .unwrap()
            .push(format!("{}/{}", repo_id, filename));
        Ok(target)
    }

    async fn download_snapshot(&self, repo_id: &str) -> Result<PathBuf> {
        let source = self.remote_dir(repo_id);
        if !source.is_dir() {
            return Err(Self::not_found(repo_id));
        }
        let target = self.downloads.path().join(repo_id);
        Repo::move_repo(&source, &target, true)?;
        Ok(target)
    }

    async fn upload_folder(&self, folder: &Path, repo_id: &str, path_in_repo: &str) -> Result<()> {
        let files = modelhub::hub::upload::collect_files(folder, path_in_repo)?
            .into_iter()
            .map(|f| f.path_in_repo)
            .collect();

        let mut target = self.remote_dir(repo_id);
        if path_in_repo != "." && !path_in_repo.is_empty() {
            target = target.join(path_in_repo);
        }
        Repo::move_repo(folder, &target, true)?;

        self.uploads.lock().unwrap().push(Upload {
            repo_id: repo_id.to_string(),
            path_in_repo: path_in_repo.to_string(),
            files,
        });
        Ok(())
    }
}

/// Texts small enough to train a tokenizer in milliseconds
pub const CORPUS: &[&str] = &[
    "the quick brown fox jumps over the lazy dog",
    "the lazy dog sleeps in the sun",
    "a quick brown dog jumps over a fox",
    "john lives in paris and mary lives in london",
    "foxes and dogs are not friends",
];
