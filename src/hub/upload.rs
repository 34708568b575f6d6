//! Wire types and helpers for pushing folders to the hub
//!
//! A push is three steps:
//! 1. `preupload` classifies every file as `regular` or `lfs`
//! 2. LFS files go through the git-lfs batch API (sha256 oid, basic transfer)
//! 3. one NDJSON commit carries regular files inline (base64) and LFS pointers

use crate::error::{HubError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Bytes of each file sent to `preupload` for content sniffing
const SAMPLE_SIZE: usize = 512;

/// A file scheduled for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path_in_repo: String,
    pub local_path: PathBuf,
    pub size: u64,
}

/// Collect every file under `folder`, mapped into `path_in_repo`
///
/// Paths use `/` separators and come back sorted.
pub fn collect_files(folder: &Path, path_in_repo: &str) -> Result<Vec<LocalFile>> {
    if !folder.is_dir() {
        return Err(HubError::MissingFile(folder.to_path_buf()));
    }

    let mut files = Vec::new();
    walk(folder, folder, path_in_repo, &mut files)?;
    files.sort_by(|a, b| a.path_in_repo.cmp(&b.path_in_repo));
    Ok(files)
}

fn walk(root: &Path, dir: &Path, prefix: &str, files: &mut Vec<LocalFile>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(root, &path, prefix, files)?;
            continue;
        }

        let relative = path
            .strip_prefix(root)
            .map_err(|_| HubError::InvalidInput(format!("{:?} escapes {:?}", path, root)))?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        files.push(LocalFile {
            path_in_repo: join_repo_path(prefix, &relative),
            size: std::fs::metadata(&path)?.len(),
            local_path: path,
        });
    }
    Ok(())
}

/// Join a repo-relative prefix and a file path; `.` and `` mean the root
pub fn join_repo_path(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() || prefix == "." {
        relative.to_string()
    } else {
        format!("{}/{}", prefix, relative)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    Regular,
    Lfs,
}

#[derive(Debug, Serialize)]
pub struct PreuploadRequest {
    pub files: Vec<PreuploadFile>,
}

#[derive(Debug, Serialize)]
pub struct PreuploadFile {
    pub path: String,
    pub sample: String,
    pub size: u64,
}

#[derive(Debug, Deserialize)]
pub struct PreuploadResponse {
    pub files: Vec<PreuploadResult>,
}

#[derive(Debug, Deserialize)]
pub struct PreuploadResult {
    pub path: String,
    #[serde(rename = "uploadMode")]
    pub upload_mode: UploadMode,
}

/// Base64 of the leading bytes of a file
pub fn sample(content: &[u8]) -> String {
    STANDARD.encode(&content[..content.len().min(SAMPLE_SIZE)])
}

pub fn sha256_hex(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[derive(Debug, Serialize)]
pub struct LfsBatchRequest {
    pub operation: &'static str,
    pub transfers: Vec<&'static str>,
    pub objects: Vec<LfsObject>,
    pub hash_algo: &'static str,
}

impl LfsBatchRequest {
    pub fn upload(objects: Vec<LfsObject>) -> Self {
        Self {
            operation: "upload",
            transfers: vec!["basic"],
            objects,
            hash_algo: "sha256",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LfsObject {
    pub oid: String,
    pub size: u64,
}

#[derive(Debug, Deserialize)]
pub struct LfsBatchResponse {
    pub objects: Vec<LfsBatchObject>,
}

#[derive(Debug, Deserialize)]
pub struct LfsBatchObject {
    pub oid: String,
    pub size: u64,
    /// Absent when the hub already stores the object
    #[serde(default)]
    pub actions: Option<LfsActions>,
    #[serde(default)]
    pub error: Option<LfsObjectError>,
}

#[derive(Debug, Deserialize)]
pub struct LfsActions {
    pub upload: Option<LfsAction>,
    pub verify: Option<LfsAction>,
}

#[derive(Debug, Deserialize)]
pub struct LfsAction {
    pub href: String,
    #[serde(default)]
    pub header: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct LfsObjectError {
    pub code: u16,
    pub message: String,
}

/// One entry of a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOperation {
    File { path: String, content: Vec<u8> },
    LfsFile { path: String, oid: String, size: u64 },
}

/// Split read files into commit operations and the LFS objects to push first
///
/// Buffers are moved, never copied: regular files end up inside their
/// operation, LFS files next to their pointer. Files the hub did not
/// classify are sent inline.
pub fn plan_commit(
    contents: Vec<(String, Vec<u8>)>,
    modes: &HashMap<String, UploadMode>,
) -> (Vec<CommitOperation>, Vec<(LfsObject, Vec<u8>)>) {
    let mut operations = Vec::with_capacity(contents.len());
    let mut lfs = Vec::new();
    for (path, content) in contents {
        match modes.get(&path).copied().unwrap_or(UploadMode::Regular) {
            UploadMode::Regular => operations.push(CommitOperation::File { path, content }),
            UploadMode::Lfs => {
                let object = LfsObject {
                    oid: sha256_hex(&content),
                    size: content.len() as u64,
                };
                operations.push(CommitOperation::LfsFile {
                    path,
                    oid: object.oid.clone(),
                    size: object.size,
                });
                lfs.push((object, content));
            }
        }
    }
    (operations, lfs)
}

/// Render the NDJSON body of a commit
pub fn commit_payload(summary: &str, operations: &[CommitOperation]) -> Result<String> {
    let mut lines = Vec::with_capacity(operations.len() + 1);
    lines.push(serde_json::to_string(&serde_json::json!({
        "key": "header",
        "value": { "summary": summary, "description": "" }
    }))?);

    for op in operations {
        let line = match op {
            CommitOperation::File { path, content } => serde_json::json!({
                "key": "file",
                "value": {
                    "path": path,
                    "content": STANDARD.encode(content),
                    "encoding": "base64"
                }
            }),
            CommitOperation::LfsFile { path, oid, size } => serde_json::json!({
                "key": "lfsFile",
                "value": { "path": path, "algo": "sha256", "oid": oid, "size": size }
            }),
        };
        lines.push(serde_json::to_string(&line)?);
    }

    Ok(lines.join("\n"))
}

/// Extract the `rel="next"` URL from a `Link` header
pub fn next_page_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let url = pieces.next()?.trim();
        let is_next = pieces.any(|p| p.trim() == r#"rel="next""#);
        if is_next {
            url.strip_prefix('<')
                .and_then(|u| u.strip_suffix('>'))
                .map(str::to_string)
        } else {
            None
        }
    })
}
