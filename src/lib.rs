//! Content-addressed cache and concurrent download client for
//! Hugging Face-compatible model hubs.
//!
//! Files are materialized into a shared cache layout: payloads live in
//! a content-addressed blob store, human-readable paths are symlinks
//! under revision-keyed snapshot trees, and `refs/` maps symbolic
//! revisions to commit hashes. The layout is the shared hub cache
//! format, so caches are interchangeable with other tools.
//!
//! # Example
//!
//! ```rust,ignore
//! use hubcache::{Client, DownloadParams, Repo};
//!
//! #[tokio::main]
//! async fn main() -> hubcache::Result<()> {
//!     let client = Client::from_env()?;
//!
//!     // Single file
//!     let params = DownloadParams::file(
//!         Repo::model("stable-diffusion-v1-5/stable-diffusion-v1-5"),
//!         "unet/diffusion_pytorch_model.safetensors",
//!     );
//!     let path = client.download(&params).await?;
//!     println!("downloaded to {}", path.display());
//!
//!     // Filtered snapshot
//!     let mut params = DownloadParams::snapshot(Repo::model("owner/name"));
//!     params.allow_patterns = vec!["text_encoder/*".to_string()];
//!     let snapshot = client.download(&params).await?;
//!     println!("snapshot at {}", snapshot.display());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod metadata;
pub mod paths;
pub mod patterns;
pub mod pipeline;
pub mod progress;
pub mod repo;
pub mod sources;

mod download;
mod snapshot;
mod transfer;

pub use error::{HubError, Result};
pub use metadata::FileMetadata;
pub use pipeline::{DownloadOptions, ModelIndex, PipelineDownloader};
pub use progress::{NullProgress, ProgressRow, ProgressSink, TermProgress};
pub use repo::{RepoInfo, RepoSibling};
pub use sources::{CivitaiSource, DirectUrlSource, DownloadSource, RemoteFileInfo};
pub use transfer::RetryPolicy;

use crate::config::{CacheConfig, NetworkConfig};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Kind of repository on the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RepoType {
    #[default]
    Model,
    Dataset,
    Space,
}

impl RepoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoType::Model => "model",
            RepoType::Dataset => "dataset",
            RepoType::Space => "space",
        }
    }
}

impl fmt::Display for RepoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepoType {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "model" | "" => Ok(RepoType::Model),
            "dataset" => Ok(RepoType::Dataset),
            "space" => Ok(RepoType::Space),
            other => Err(HubError::UnsupportedRepoType(other.to_string())),
        }
    }
}

/// A repository reference: `owner/name`, its kind and an optional
/// pinned revision.
#[derive(Debug, Clone, Default)]
pub struct Repo {
    pub id: String,
    pub repo_type: RepoType,
    pub revision: Option<String>,
}

impl Repo {
    pub fn new(id: impl Into<String>, repo_type: RepoType) -> Self {
        Self {
            id: id.into(),
            repo_type,
            revision: None,
        }
    }

    /// Model repository at the default revision.
    pub fn model(id: impl Into<String>) -> Self {
        Self::new(id, RepoType::Model)
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }
}

/// Parameters for a download request. With `filename` set the request
/// is single-file; otherwise the whole (filtered) snapshot is
/// materialized.
#[derive(Debug, Clone, Default)]
pub struct DownloadParams {
    pub repo: Repo,
    pub filename: Option<String>,
    /// Prepended to `filename` in single-file mode.
    pub subfolder: Option<String>,
    /// Overrides the repo's revision; defaults to `main`.
    pub revision: Option<String>,
    pub force_download: bool,
    pub local_files_only: bool,
    pub allow_patterns: Vec<String>,
    pub ignore_patterns: Vec<String>,
}

impl DownloadParams {
    /// Single-file request.
    pub fn file(repo: Repo, filename: impl Into<String>) -> Self {
        Self {
            repo,
            filename: Some(filename.into()),
            ..Default::default()
        }
    }

    /// Snapshot request.
    pub fn snapshot(repo: Repo) -> Self {
        Self {
            repo,
            ..Default::default()
        }
    }

    pub(crate) fn effective_revision(&self) -> String {
        self.revision
            .clone()
            .or_else(|| self.repo.revision.clone())
            .unwrap_or_else(|| "main".to_string())
    }
}

/// Client for hub downloads.
///
/// Holds two HTTP clients: an API client with a total timeout and
/// redirects disabled (so the metadata phase reads `Location` from the
/// first response), and a transfer client with no total timeout but
/// bounded socket phases. Cloning is cheap; clones share connection
/// pools and the progress sink.
#[derive(Clone)]
pub struct Client {
    endpoint: String,
    token: Option<String>,
    cache_dir: PathBuf,
    max_concurrency: usize,
    api_client: reqwest::Client,
    transfer_client: reqwest::Client,
    progress: Arc<dyn ProgressSink>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.endpoint)
            .field("cache_dir", &self.cache_dir)
            .field("has_token", &self.token.is_some())
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

impl Client {
    /// Create a builder for custom configuration.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a client from the environment: `HF_ENDPOINT`, `HF_TOKEN`
    /// (or the shared token file) and the documented cache directory
    /// precedence.
    pub fn from_env() -> Result<Self> {
        Self::builder().build()
    }

    /// Download per the request: single-file when `filename` is set,
    /// snapshot otherwise. Returns the absolute pointer path
    /// (single-file) or the snapshot root.
    pub async fn download(&self, params: &DownloadParams) -> Result<PathBuf> {
        if params.filename.is_some() {
            self.file_download(params).await
        } else {
            self.snapshot_download(params).await
        }
    }

    /// Replace the bearer token on an existing client.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub(crate) fn api_client(&self) -> &reqwest::Client {
        &self.api_client
    }

    pub(crate) fn transfer_client(&self) -> &reqwest::Client {
        &self.transfer_client
    }

    pub(crate) fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub(crate) fn progress(&self) -> &Arc<dyn ProgressSink> {
        &self.progress
    }

    pub(crate) fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub(crate) fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", token),
            ),
            None => request,
        }
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    endpoint: Option<String>,
    token: Option<String>,
    cache_dir: Option<PathBuf>,
    user_agent: String,
    progress: Option<Arc<dyn ProgressSink>>,
    max_concurrency: usize,
}

impl ClientBuilder {
    fn new() -> Self {
        Self {
            endpoint: None,
            token: None,
            cache_dir: None,
            user_agent: NetworkConfig::USER_AGENT.to_string(),
            progress: None,
            max_concurrency: NetworkConfig::DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Width of the snapshot worker semaphore.
    pub fn max_concurrency(mut self, width: usize) -> Self {
        self.max_concurrency = width.max(1);
        self
    }

    pub fn build(self) -> Result<Client> {
        let endpoint = self
            .endpoint
            .or_else(|| {
                std::env::var(CacheConfig::ENDPOINT_ENV)
                    .ok()
                    .filter(|v| !v.is_empty())
            })
            .unwrap_or_else(|| NetworkConfig::DEFAULT_ENDPOINT.to_string());

        let token = self.token.or_else(auth::resolve_token);

        let cache_dir = match self.cache_dir {
            Some(dir) => paths::expand_path(&dir.to_string_lossy())?,
            None => paths::expand_path(&paths::default_cache_dir()?.to_string_lossy())?,
        };
        std::fs::create_dir_all(&cache_dir)
            .map_err(|e| HubError::io_with_path(e, &cache_dir))?;

        let api_client = reqwest::Client::builder()
            .timeout(NetworkConfig::API_REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| HubError::Network {
                message: format!("failed to create API client: {}", e),
                cause: None,
            })?;

        // No total timeout: multi-gigabyte transfers outlive any fixed
        // deadline. Socket phases stay individually bounded.
        let transfer_client = reqwest::Client::builder()
            .connect_timeout(NetworkConfig::SOCKET_PHASE_TIMEOUT)
            .read_timeout(NetworkConfig::SOCKET_PHASE_TIMEOUT)
            .pool_idle_timeout(NetworkConfig::SOCKET_PHASE_TIMEOUT)
            .user_agent(self.user_agent)
            .build()
            .map_err(|e| HubError::Network {
                message: format!("failed to create transfer client: {}", e),
                cause: None,
            })?;

        Ok(Client {
            endpoint,
            token,
            cache_dir,
            max_concurrency: self.max_concurrency,
            api_client,
            transfer_client,
            progress: self.progress.unwrap_or_else(|| Arc::new(NullProgress)),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
