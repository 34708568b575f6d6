//! Hub cache detection utilities
//!
//! Locates repos that `hf-hub` already downloaded so that resolution can
//! skip the network. Cache structure:
//! ```text
//! <cache_dir>/
//! ├── models--modelhub--distilbert-ner/
//! │   ├── snapshots/
//! │   │   └── {commit}/
//! │   │       ├── config.toml
//! │   │       ├── model.safetensors
//! │   │       └── preprocessor/
//! │   │           ├── tokenizer.json
//! │   │           └── tokenizer_config.toml
//! │   └── refs/
//! │       └── main
//! └── models--org--other/
//!     └── ...
//! ```

use std::path::{Path, PathBuf};

/// Get the hub cache directory
///
/// Checks in order:
/// 1. `$MODELHUB_CACHE`
/// 2. `$HF_HOME/hub`
/// 3. `$XDG_CACHE_HOME/huggingface/hub`
/// 4. `~/.cache/huggingface/hub`
pub fn get_cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MODELHUB_CACHE") {
        return PathBuf::from(dir);
    }

    if let Ok(hf_home) = std::env::var("HF_HOME") {
        return PathBuf::from(hf_home).join("hub");
    }

    if let Ok(xdg_cache) = std::env::var("XDG_CACHE_HOME") {
        return PathBuf::from(xdg_cache).join("huggingface/hub");
    }

    dirs::home_dir()
        .map(|h| h.join(".cache/huggingface/hub"))
        .unwrap_or_else(|| PathBuf::from("/tmp/huggingface/hub"))
}

/// Convert repo ID to cache directory name
///
/// e.g., "modelhub/distilbert-ner" -> "models--modelhub--distilbert-ner"
fn repo_id_to_cache_name(repo_id: &str) -> String {
    format!("models--{}", repo_id.replace('/', "--"))
}

/// Convert cache directory name back to repo ID
fn cache_name_to_repo_id(cache_name: &str) -> Option<String> {
    cache_name
        .strip_prefix("models--")
        .map(|s| s.replacen("--", "/", 1))
}

/// Directory under a cached repo holding one empty file per fully fetched commit
///
/// Kept beside `snapshots/` so bundle copies never pick it up.
const COMPLETE_DIR: &str = ".complete";

/// Get the cached snapshot of `repo_id` at `revision`, if it was fully fetched
///
/// A snapshot only counts once [`mark_snapshot_complete`] recorded it. A
/// download that died halfway leaves no marker, so the next resolution goes
/// back to the hub.
pub fn cached_snapshot(cache_dir: &Path, repo_id: &str, revision: &str) -> Option<PathBuf> {
    let repo_dir = cache_dir.join(repo_id_to_cache_name(repo_id));

    let refs = repo_dir.join("refs").join(revision);
    let commit = std::fs::read_to_string(refs).ok()?;
    let commit = commit.trim();
    let snapshot = repo_dir.join("snapshots").join(commit);

    if snapshot.is_dir() && repo_dir.join(COMPLETE_DIR).join(commit).is_file() {
        Some(snapshot)
    } else {
        None
    }
}

/// Record that every file of `snapshot` (a `snapshots/{commit}` dir) is present
pub fn mark_snapshot_complete(cache_dir: &Path, repo_id: &str, snapshot: &Path) -> std::io::Result<()> {
    let commit = snapshot.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is not a snapshot directory", snapshot.display()),
        )
    })?;
    let markers = cache_dir.join(repo_id_to_cache_name(repo_id)).join(COMPLETE_DIR);
    std::fs::create_dir_all(&markers)?;
    std::fs::write(markers.join(commit), b"")
}

/// Get the total size of a cached repo in bytes
pub fn get_cache_size(cache_dir: &Path, repo_id: &str) -> Option<u64> {
    let repo_dir = cache_dir.join(repo_id_to_cache_name(repo_id));

    if !repo_dir.exists() {
        return None;
    }

    Some(dir_size(&repo_dir))
}

/// Recursively calculate directory size
fn dir_size(path: &Path) -> u64 {
    let mut size = 0;

    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                size += dir_size(&path);
            } else if let Ok(metadata) = std::fs::metadata(&path) {
                size += metadata.len();
            }
        }
    }

    size
}

/// List all cached repos
pub fn list_cached_repos(cache_dir: &Path) -> Vec<String> {
    let mut repos = Vec::new();

    if let Ok(entries) = std::fs::read_dir(cache_dir) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if !entry.path().join("snapshots").is_dir() {
                continue;
            }
            if let Some(repo_id) = cache_name_to_repo_id(&name) {
                repos.push(repo_id);
            }
        }
    }

    repos.sort();
    repos
}
