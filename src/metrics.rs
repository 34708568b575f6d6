//! Hub traffic counters
//!
//! Emitted through the `metrics` facade; they are no-ops until the embedding
//! application installs a recorder.

/// Record a download from the hub
pub fn record_download(kind: &'static str, repo_id: &str) {
    metrics::counter!("modelhub_downloads_total",
        "kind" => kind,
        "repo" => repo_id.to_string()
    )
    .increment(1);
}

/// Record a snapshot served from the local cache
pub fn record_cache_hit(repo_id: &str) {
    metrics::counter!("modelhub_cache_hits_total",
        "repo" => repo_id.to_string()
    )
    .increment(1);
}

/// Record a committed upload
pub fn record_upload(repo_id: &str, files: usize, bytes: u64) {
    metrics::counter!("modelhub_uploads_total",
        "repo" => repo_id.to_string()
    )
    .increment(1);
    metrics::counter!("modelhub_uploaded_files_total").increment(files as u64);
    metrics::counter!("modelhub_uploaded_bytes_total").increment(bytes);
}

/// Record repo creation
pub fn record_repo_created(repo_id: &str) {
    metrics::counter!("modelhub_repos_created_total",
        "repo" => repo_id.to_string()
    )
    .increment(1);
}
