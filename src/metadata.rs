//! File metadata resolution against the hub's resolve endpoint.
//!
//! A HEAD request against `/{repo}/resolve/main/{file}` yields the
//! content hash, commit hash, size and CDN location from response
//! headers. Large files stored as pointers lack those headers; the
//! fallback fetches the raw pointer document and the repo's commit
//! hash separately.

use crate::error::{HubError, Result};
use crate::Client;
use tracing::debug;

/// Resolved metadata for one file at one revision. All fields are
/// populated before a transfer begins; `etag` keys the blob store.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// 40-char hex commit hash the file was resolved at.
    pub commit_hash: String,
    /// Opaque content hash, safe as a single path component.
    pub etag: String,
    /// Absolute download URL (CDN redirect target, or the resolve URL).
    pub location: String,
    /// Size in bytes.
    pub size: u64,
}

/// Parsed large-file pointer document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LfsPointer {
    pub sha256: String,
    pub size: u64,
}

/// Extract `oid sha256:<hex>` and `size <n>` lines from a pointer body.
/// Other lines are ignored.
pub(crate) fn parse_lfs_pointer(body: &str) -> Result<LfsPointer> {
    let mut sha256 = None;
    let mut size = None;

    for line in body.lines() {
        if let Some(rest) = line.strip_prefix("oid sha256:") {
            sha256 = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("size ") {
            size = rest.trim().parse::<u64>().ok();
        }
    }

    match (sha256, size) {
        (Some(sha256), Some(size)) if !sha256.is_empty() && size > 0 => {
            Ok(LfsPointer { sha256, size })
        }
        _ => Err(HubError::InvalidPointer {
            message: "pointer document missing oid or size".to_string(),
        }),
    }
}

impl Client {
    /// Resolve [`FileMetadata`] for a file via a HEAD request, with the
    /// pointer fallback when headers are absent.
    pub(crate) async fn file_metadata(&self, repo_id: &str, filename: &str) -> Result<FileMetadata> {
        let url = format!("{}/{}/resolve/main/{}", self.endpoint(), repo_id, filename);

        let response = self
            .with_auth(self.api_client().head(&url))
            .send()
            .await
            .map_err(|e| HubError::Metadata {
                filename: filename.to_string(),
                message: format!("HEAD request failed: {}", e),
            })?;

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let mut etag = header("etag")
            .map(|v| v.trim_matches('"').to_string())
            .unwrap_or_default();
        let mut commit_hash = header("x-repo-commit").unwrap_or_default();
        let mut size: u64 = header("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let location = header("location").unwrap_or_default();

        // Pointer fallback: the resolve endpoint did not hand us enough
        // to address the blob, so read the raw pointer document and look
        // up the commit hash through the API.
        if etag.is_empty() || commit_hash.is_empty() {
            debug!("metadata headers incomplete for {}, using pointer fallback", filename);
            let pointer = self.fetch_lfs_pointer(repo_id, filename).await?;
            etag = pointer.sha256;
            size = pointer.size;
            commit_hash = self.fetch_commit_hash(repo_id).await?;
        }

        Ok(FileMetadata {
            commit_hash,
            etag,
            size,
            location: if location.is_empty() { url } else { location },
        })
    }

    async fn fetch_lfs_pointer(&self, repo_id: &str, filename: &str) -> Result<LfsPointer> {
        let url = format!("{}/{}/raw/main/{}", self.endpoint(), repo_id, filename);

        let response = self
            .with_auth(self.api_client().get(&url))
            .send()
            .await
            .map_err(|e| HubError::Metadata {
                filename: filename.to_string(),
                message: format!("pointer fetch failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(HubError::Metadata {
                filename: filename.to_string(),
                message: format!("pointer fetch returned {}", response.status()),
            });
        }

        let body = response.text().await.map_err(|e| HubError::Metadata {
            filename: filename.to_string(),
            message: format!("failed to read pointer body: {}", e),
        })?;

        parse_lfs_pointer(&body)
    }

    async fn fetch_commit_hash(&self, repo_id: &str) -> Result<String> {
        let url = format!("{}/api/models/{}", self.endpoint(), repo_id);

        let response = self
            .with_auth(self.api_client().get(&url))
            .send()
            .await
            .map_err(|e| HubError::Metadata {
                filename: repo_id.to_string(),
                message: format!("commit hash fetch failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(HubError::Metadata {
                filename: repo_id.to_string(),
                message: format!("commit hash fetch returned {}", response.status()),
            });
        }

        #[derive(serde::Deserialize)]
        struct CommitRecord {
            sha: String,
        }

        let record: CommitRecord = response.json().await.map_err(|e| HubError::Metadata {
            filename: repo_id.to_string(),
            message: format!("failed to decode commit hash: {}", e),
        })?;

        Ok(record.sha)
    }
}
