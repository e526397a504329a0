//! Parallel snapshot download orchestration.
//!
//! Lists the repository, filters the file tree, then fans the single
//! file flow out across a bounded set of workers. Worker errors are
//! collected through a bounded channel and the first one surfaces after
//! all workers have joined.

use crate::auth::check_connectivity;
use crate::cache;
use crate::config::{CacheConfig, NetworkConfig};
use crate::error::Result;
use crate::patterns::filter_files;
use crate::paths;
use crate::{Client, DownloadParams};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

impl Client {
    /// Download a filtered snapshot of a repository at a revision and
    /// return the absolute snapshot root path.
    pub(crate) async fn snapshot_download(&self, params: &DownloadParams) -> Result<PathBuf> {
        let repo_id = params.repo.id.clone();
        let repo_type = params.repo.repo_type;
        let revision = params.effective_revision();

        if check_connectivity(params.local_files_only).is_err() {
            return cache::find_cached_snapshot(
                self.cache_dir(),
                &repo_id,
                repo_type.as_str(),
                &revision,
            );
        }

        let info = self.repo_info(&params.repo, &revision).await?;

        let storage = paths::storage_folder(self.cache_dir(), &repo_id, repo_type.as_str());
        let snapshot_folder = storage.join(CacheConfig::SNAPSHOTS_DIR).join(&info.sha);

        if revision != info.sha {
            cache::write_ref(&storage, &revision, &info.sha)?;
        }

        let files = filter_files(
            &info.filenames(),
            &params.allow_patterns,
            &params.ignore_patterns,
        );

        info!(
            "fetching {} of {} files for {} at {}",
            files.len(),
            info.siblings.len(),
            repo_id,
            info.sha
        );

        let batch_row = Arc::new(self.progress().add_row(
            &format!("Fetching {} files for {}", files.len(), repo_id),
            files.len() as u64,
        ));

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency()));
        let (error_tx, mut error_rx) = mpsc::channel(NetworkConfig::ERROR_CHANNEL_CAPACITY);

        let mut handles = Vec::with_capacity(files.len());
        for filename in files {
            let client = self.clone();
            let semaphore = semaphore.clone();
            let error_tx = error_tx.clone();
            let batch_row = batch_row.clone();
            let file_params = DownloadParams {
                repo: params.repo.clone(),
                filename: Some(filename.clone()),
                subfolder: None,
                revision: Some(info.sha.clone()),
                force_download: params.force_download,
                local_files_only: params.local_files_only,
                allow_patterns: Vec::new(),
                ignore_patterns: Vec::new(),
            };

            handles.push(tokio::spawn(async move {
                // The semaphore bounds live transfers, not spawned tasks.
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };

                match client.file_download(&file_params).await {
                    Ok(_) => {
                        batch_row.advance(1);
                    }
                    Err(e) => {
                        warn!("failed to download {}: {}", filename, e);
                        let _ = error_tx.send(e).await;
                    }
                }
            }));
        }
        drop(error_tx);

        for handle in handles {
            let _ = handle.await;
        }
        batch_row.finish();

        if let Some(err) = error_rx.recv().await {
            return Err(err);
        }

        Ok(snapshot_folder)
    }
}
