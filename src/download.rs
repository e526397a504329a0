//! Single-file download orchestration.
//!
//! Flow: metadata resolution, ref persistence, cache fast paths,
//! advisory lock, retrying resumable transfer into `.incomplete`,
//! atomic rename into the blob store, pointer materialization.

use crate::auth::check_connectivity;
use crate::cache;
use crate::config::{CacheConfig, NetworkConfig};
use crate::error::{HubError, Result};
use crate::paths::{self, is_commit_hash};
use crate::transfer;
use crate::{Client, DownloadParams};
use std::path::PathBuf;
use tracing::{debug, info};

impl Client {
    /// Download a single file into the cache and return the absolute
    /// pointer path under the snapshot tree.
    pub(crate) async fn file_download(&self, params: &DownloadParams) -> Result<PathBuf> {
        let repo_id = params.repo.id.as_str();
        let repo_type = params.repo.repo_type.as_str();
        let revision = params.effective_revision();

        let filename = match (&params.subfolder, &params.filename) {
            (Some(subfolder), Some(name)) => format!("{}/{}", subfolder, name),
            (None, Some(name)) => name.clone(),
            _ => {
                return Err(HubError::Config {
                    message: "file download requires a filename".to_string(),
                })
            }
        };

        // Offline mode and local-only requests resolve from the cache
        // or fail with a distinct error.
        if check_connectivity(params.local_files_only).is_err() {
            return cache::find_in_cache(
                self.cache_dir(),
                repo_id,
                repo_type,
                &filename,
                &revision,
            );
        }

        let storage = paths::storage_folder(self.cache_dir(), repo_id, repo_type);
        std::fs::create_dir_all(&storage).map_err(|e| HubError::io_with_path(e, &storage))?;

        // Pinned-commit fast path: the snapshot entry for an immutable
        // revision never goes stale, so no metadata round-trip is
        // needed. Callers that must revalidate set force_download.
        if is_commit_hash(&revision) {
            let pointer_path = storage
                .join(CacheConfig::SNAPSHOTS_DIR)
                .join(&revision)
                .join(&filename);
            if pointer_path.exists() && !params.force_download {
                debug!("cache hit for {}@{}", filename, revision);
                return Ok(pointer_path);
            }
        }

        let metadata = self.file_metadata(repo_id, &filename).await?;

        let blob_path = storage.join(CacheConfig::BLOBS_DIR).join(&metadata.etag);
        let pointer_path = storage
            .join(CacheConfig::SNAPSHOTS_DIR)
            .join(&metadata.commit_hash)
            .join(&filename);

        for path in [&blob_path, &pointer_path] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| HubError::io_with_path(e, parent))?;
            }
        }

        if revision != metadata.commit_hash {
            cache::write_ref(&storage, &revision, &metadata.commit_hash)?;
        }

        if !params.force_download {
            if pointer_path.exists() {
                debug!("pointer already materialized for {}", filename);
                return Ok(pointer_path);
            }
            if blob_path.exists() {
                debug!("blob {} already cached, materializing pointer", metadata.etag);
                cache::create_symlink(&blob_path, &pointer_path)?;
                return Ok(pointer_path);
            }
        }

        // Exclusive transfer rights for this blob across processes.
        let lock_path = paths::lock_path(self.cache_dir(), repo_id, repo_type, &metadata.etag);
        let lock = cache::acquire_blob_lock(&lock_path, &metadata.etag)?;

        let tmp_path = PathBuf::from(format!(
            "{}{}",
            blob_path.display(),
            NetworkConfig::DOWNLOAD_TEMP_SUFFIX
        ));

        info!(
            "downloading {}/{} ({} bytes) to blob {}",
            repo_id, filename, metadata.size, metadata.etag
        );

        let row = self.progress().add_row(&filename, metadata.size);
        let result = transfer::download_with_retry(
            self.transfer_client(),
            &metadata.location,
            &tmp_path,
            self.token(),
            row.as_ref(),
        )
        .await;

        if let Err(e) = result {
            // The .incomplete file stays behind for the next attempt.
            drop(lock);
            return Err(e);
        }

        tokio::fs::rename(&tmp_path, &blob_path)
            .await
            .map_err(|e| HubError::io_with_path(e, &blob_path))?;

        cache::create_symlink(&blob_path, &pointer_path)?;
        row.finish();
        drop(lock);

        Ok(pointer_path)
    }
}
