//! Hub client backed by hf-hub and the hub REST API
//!
//! Downloads go through the native Rust hf-hub crate so the cache layout stays
//! compatible with other HuggingFace tooling. Listing, repo creation and
//! commits are not covered by hf-hub and use reqwest directly.

use super::HubApi;
use super::cache::{cached_snapshot, mark_snapshot_complete};
use super::upload::{
    LfsBatchRequest, LfsBatchResponse, LfsObject, PreuploadFile,
    PreuploadRequest, PreuploadResponse, UploadMode, collect_files, commit_payload,
    next_page_link, plan_commit, sample,
};
use crate::config::HubSettings;
use crate::error::{HubError, Result};
use async_trait::async_trait;
use hf_hub::api::tokio::{Api, ApiBuilder, ApiRepo};
use hf_hub::{Repo as HfRepo, RepoType};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Production [`HubApi`] implementation
pub struct HfHubClient {
    settings: HubSettings,
    api: Api,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ModelSummary {
    #[serde(default)]
    id: Option<String>,
    /// Older hub versions only send `modelId`
    #[serde(default, rename = "modelId")]
    model_id: Option<String>,
}

impl HfHubClient {
    /// Create a client from settings
    pub fn new(settings: HubSettings) -> Result<Self> {
        let api = ApiBuilder::new()
            .with_endpoint(settings.endpoint.clone())
            .with_cache_dir(settings.cache_dir.clone())
            .with_token(settings.token.clone())
            .with_progress(settings.progress)
            .build()?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("modelhub/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            settings,
            api,
            http,
        })
    }

    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    fn repo(&self, repo_id: &str) -> ApiRepo {
        self.api.repo(HfRepo::with_revision(
            repo_id.to_string(),
            RepoType::Model,
            self.settings.revision.clone(),
        ))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.endpoint.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.settings.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn require_token(&self) -> Result<()> {
        if self.settings.token.is_none() {
            return Err(HubError::MissingConfig(
                "a hub token (HF_TOKEN) is required for write operations".to_string(),
            ));
        }
        Ok(())
    }

    /// Turn non-success responses into `HubError::Hub`
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(HubError::Hub {
            status: status.as_u16(),
            message,
        })
    }

    async fn preupload(
        &self,
        repo_id: &str,
        files: &[(String, Vec<u8>)],
    ) -> Result<HashMap<String, UploadMode>> {
        let request = PreuploadRequest {
            files: files
                .iter()
                .map(|(path, content)| PreuploadFile {
                    path: path.clone(),
                    sample: sample(content),
                    size: content.len() as u64,
                })
                .collect(),
        };

        let url = self.url(&format!(
            "/api/models/{}/preupload/{}",
            repo_id, self.settings.revision
        ));
        let response = self
            .authorized(self.http.post(url))
            .json(&request)
            .send()
            .await?;
        let parsed: PreuploadResponse = Self::check(response).await?.json().await?;

        Ok(parsed
            .files
            .into_iter()
            .map(|f| (f.path, f.upload_mode))
            .collect())
    }

    /// Push LFS objects the hub does not have yet
    ///
    /// Takes ownership of the contents so each body is handed to reqwest
    /// without another copy.
    async fn upload_lfs(&self, repo_id: &str, objects: Vec<(LfsObject, Vec<u8>)>) -> Result<()> {
        // identical files share an oid and are sent once
        let mut requested = Vec::with_capacity(objects.len());
        let mut contents: HashMap<String, Vec<u8>> = HashMap::with_capacity(objects.len());
        for (object, content) in objects {
            if !contents.contains_key(&object.oid) {
                contents.insert(object.oid.clone(), content);
                requested.push(object);
            }
        }
        let request = LfsBatchRequest::upload(requested);
        let url = self.url(&format!("/{}.git/info/lfs/objects/batch", repo_id));

        let response = self
            .authorized(self.http.post(url))
            .header("Accept", "application/vnd.git-lfs+json")
            .header("Content-Type", "application/vnd.git-lfs+json")
            .body(serde_json::to_vec(&request)?)
            .send()
            .await?;
        let batch: LfsBatchResponse = Self::check(response).await?.json().await?;

        for object in batch.objects {
            if let Some(error) = object.error {
                return Err(HubError::Hub {
                    status: error.code,
                    message: format!("LFS object {}: {}", object.oid, error.message),
                });
            }

            let Some(actions) = object.actions else {
                tracing::debug!(oid = %object.oid, "LFS object already present");
                continue;
            };

            let content = contents.remove(&object.oid).ok_or_else(|| {
                HubError::InvalidInput(format!("hub requested unknown LFS object {}", object.oid))
            })?;

            if let Some(upload) = actions.upload {
                let mut put = self.http.put(&upload.href).body(content);
                for (name, value) in &upload.header {
                    put = put.header(name, value);
                }
                Self::check(put.send().await?).await?;
                tracing::debug!(oid = %object.oid, size = object.size, "Uploaded LFS object");
            }

            if let Some(verify) = actions.verify {
                let mut post = self.authorized(self.http.post(&verify.href)).json(&LfsObject {
                    oid: object.oid.clone(),
                    size: object.size,
                });
                for (name, value) in &verify.header {
                    post = post.header(name, value);
                }
                Self::check(post.send().await?).await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl HubApi for HfHubClient {
    fn organization(&self) -> &str {
        &self.settings.organization
    }

    async fn list_models(&self, author: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut next = Some(self.url(&format!("/api/models?author={}&limit=1000", author)));

        while let Some(url) = next.take() {
            let response = Self::check(self.authorized(self.http.get(&url)).send().await?).await?;
            next = response
                .headers()
                .get(reqwest::header::LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_page_link);

            let page: Vec<ModelSummary> = response.json().await?;
            ids.extend(page.into_iter().filter_map(|m| m.id.or(m.model_id)));
        }

        tracing::debug!(author = %author, count = ids.len(), "Listed hub models");
        Ok(ids)
    }

    async fn create_repo(&self, repo_id: &str) -> Result<()> {
        self.require_token()?;

        let (organization, name) = match repo_id.split_once('/') {
            Some((org, name)) => (Some(org), name),
            None => (None, repo_id),
        };
        let body = serde_json::json!({
            "type": "model",
            "name": name,
            "organization": organization,
            "private": false,
        });

        let response = self
            .authorized(self.http.post(self.url("/api/repos/create")))
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            tracing::info!(repo_id = %repo_id, "Repo already exists on the hub");
            return Ok(());
        }
        Self::check(response).await?;

        crate::metrics::record_repo_created(repo_id);
        tracing::info!(repo_id = %repo_id, "Created hub repo");
        Ok(())
    }

    async fn download_file(&self, repo_id: &str, filename: &str) -> Result<PathBuf> {
        tracing::debug!(repo_id = %repo_id, file = %filename, "Downloading file");
        let path = self.repo(repo_id).get(filename).await?;
        crate::metrics::record_download("file", repo_id);
        Ok(path)
    }

    async fn download_snapshot(&self, repo_id: &str) -> Result<PathBuf> {
        if let Some(snapshot) =
            cached_snapshot(&self.settings.cache_dir, repo_id, &self.settings.revision)
        {
            tracing::debug!(repo_id = %repo_id, path = ?snapshot, "Using cached snapshot");
            crate::metrics::record_cache_hit(repo_id);
            return Ok(snapshot);
        }

        tracing::info!(repo_id = %repo_id, "Starting snapshot download via hf-hub");

        let repo = self.repo(repo_id);
        let info = repo.info().await?;

        let mut root: Option<PathBuf> = None;
        for sibling in &info.siblings {
            tracing::debug!(repo_id = %repo_id, file = %sibling.rfilename, "Downloading file");
            let path = repo.get(&sibling.rfilename).await?;
            if root.is_none() {
                root = snapshot_root(&path, &sibling.rfilename);
            }
        }

        let root = root.ok_or_else(|| HubError::Hub {
            status: 404,
            message: format!("repo {} has no files", repo_id),
        })?;

        if let Err(e) = mark_snapshot_complete(&self.settings.cache_dir, repo_id, &root) {
            tracing::warn!(repo_id = %repo_id, error = %e, "Failed to mark snapshot complete");
        }

        crate::metrics::record_download("snapshot", repo_id);
        Ok(root)
    }

    async fn upload_folder(&self, folder: &Path, repo_id: &str, path_in_repo: &str) -> Result<()> {
        self.require_token()?;

        let files = collect_files(folder, path_in_repo)?;
        let mut contents = Vec::with_capacity(files.len());
        for file in &files {
            contents.push((file.path_in_repo.clone(), tokio::fs::read(&file.local_path).await?));
        }

        let modes = self.preupload(repo_id, &contents).await?;

        let (operations, lfs) = plan_commit(contents, &modes);

        let lfs_files = lfs.len();
        if !lfs.is_empty() {
            self.upload_lfs(repo_id, lfs).await?;
        }

        let summary = format!("Upload {} files with modelhub", operations.len());
        let url = self.url(&format!(
            "/api/models/{}/commit/{}",
            repo_id, self.settings.revision
        ));
        let response = self
            .authorized(self.http.post(url))
            .header("Content-Type", "application/x-ndjson")
            .body(commit_payload(&summary, &operations)?)
            .send()
            .await?;
        Self::check(response).await?;

        let bytes = files.iter().map(|f| f.size).sum();
        crate::metrics::record_upload(repo_id, files.len(), bytes);
        tracing::info!(
            repo_id = %repo_id,
            files = operations.len(),
            lfs_files,
            "Committed folder to hub"
        );
        Ok(())
    }
}

/// Strip `rfilename`'s components off a downloaded path to get the snapshot root
fn snapshot_root(path: &Path, rfilename: &str) -> Option<PathBuf> {
    let depth = rfilename.split('/').filter(|s| !s.is_empty()).count();
    let mut root = path;
    for _ in 0..depth {
        root = root.parent()?;
    }
    Some(root.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(cache_dir: &Path) -> HubSettings {
        HubSettings {
            cache_dir: cache_dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_client_creation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let client = HfHubClient::new(settings(temp_dir.path()));
        assert!(client.is_ok());
        assert_eq!(client.unwrap().organization(), "modelhub");
    }

    #[test]
    fn test_url_joins_endpoint() {
        let temp_dir = tempfile::tempdir().unwrap();
        let client = HfHubClient::new(HubSettings {
            endpoint: "https://hub.example/".to_string(),
            ..settings(temp_dir.path())
        })
        .unwrap();
        assert_eq!(
            client.url("/api/repos/create"),
            "https://hub.example/api/repos/create"
        );
    }

    #[test]
    fn test_snapshot_root() {
        let path = Path::new("/cache/models--a--b/snapshots/abc/preprocessor/tokenizer.json");
        assert_eq!(
            snapshot_root(path, "preprocessor/tokenizer.json"),
            Some(PathBuf::from("/cache/models--a--b/snapshots/abc"))
        );
        let path = Path::new("/cache/models--a--b/snapshots/abc/config.toml");
        assert_eq!(
            snapshot_root(path, "config.toml"),
            Some(PathBuf::from("/cache/models--a--b/snapshots/abc"))
        );
    }

    #[test]
    fn test_model_summary_accepts_model_id() {
        let parsed: Vec<ModelSummary> = serde_json::from_str(
            r#"[{"modelId":"org/a"},{"id":"org/b"},{"id":"org/c","modelId":"org/c"}]"#,
        )
        .unwrap();
        let ids: Vec<_> = parsed
            .into_iter()
            .filter_map(|m| m.id.or(m.model_id))
            .collect();
        assert_eq!(ids, vec!["org/a", "org/b", "org/c"]);
    }

    /// Seed `models--modelhub--tiny` at commit `c0ffee` holding only `files`
    fn seed_snapshot(cache_dir: &Path, files: &[&str]) -> PathBuf {
        let repo_dir = cache_dir.join("models--modelhub--tiny");
        std::fs::create_dir_all(repo_dir.join("refs")).unwrap();
        std::fs::write(repo_dir.join("refs/main"), "c0ffee").unwrap();
        let snapshot = repo_dir.join("snapshots/c0ffee");
        std::fs::create_dir_all(&snapshot).unwrap();
        for file in files {
            std::fs::write(snapshot.join(file), "x").unwrap();
        }
        snapshot
    }

    fn offline_settings(cache_dir: &Path) -> HubSettings {
        HubSettings {
            // nothing listens on the discard port
            endpoint: "http://127.0.0.1:9".to_string(),
            ..settings(cache_dir)
        }
    }

    #[tokio::test]
    async fn test_snapshot_served_from_cache() {
        let temp_dir = tempfile::tempdir().unwrap();
        let snapshot = seed_snapshot(temp_dir.path(), &["config.toml", "model.safetensors"]);
        mark_snapshot_complete(temp_dir.path(), "modelhub/tiny", &snapshot).unwrap();

        let client = HfHubClient::new(offline_settings(temp_dir.path())).unwrap();
        let path = client.download_snapshot("modelhub/tiny").await.unwrap();
        assert_eq!(path, snapshot);
    }

    #[tokio::test]
    async fn test_interrupted_snapshot_goes_back_to_hub() {
        let temp_dir = tempfile::tempdir().unwrap();
        // first download stopped after config.toml
        seed_snapshot(temp_dir.path(), &["config.toml"]);

        let client = HfHubClient::new(offline_settings(temp_dir.path())).unwrap();
        let result = client.download_snapshot("modelhub/tiny").await;
        assert!(matches!(result, Err(HubError::Download(_))));
    }

    #[tokio::test]
    async fn test_write_operations_require_token() {
        let temp_dir = tempfile::tempdir().unwrap();
        let client = HfHubClient::new(settings(temp_dir.path())).unwrap();
        let err = client.create_repo("modelhub/x").await.unwrap_err();
        assert!(matches!(err, HubError::MissingConfig(_)));

        let err = client
            .upload_folder(temp_dir.path(), "modelhub/x", ".")
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::MissingConfig(_)));
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_list_models_live() {
        let temp_dir = tempfile::tempdir().unwrap();
        let client = HfHubClient::new(settings(temp_dir.path())).unwrap();
        let models = client.list_models("hf-internal-testing").await.unwrap();
        assert!(!models.is_empty());
    }
}
