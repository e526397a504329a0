//! Generic download sources outside the hub cache layout.
//!
//! A [`DownloadSource`] yields remote file info and downloads through
//! the same resumable, retrying transfer as the hub client, writing to
//! a `.tmp` sibling and renaming on success.

use crate::config::NetworkConfig;
use crate::error::{HubError, Result};
use crate::progress::ProgressSink;
use crate::transfer;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Remote file description produced by a source before transfer.
#[derive(Debug, Clone)]
pub struct RemoteFileInfo {
    pub url: String,
    pub size: Option<u64>,
    pub filename: Option<String>,
}

/// A remote location that can describe and deliver one file.
#[async_trait]
pub trait DownloadSource: Send + Sync {
    /// Resolve the concrete download URL, size and filename.
    async fn file_info(&self) -> Result<RemoteFileInfo>;

    /// Download the file to `dest` with resume and retry.
    async fn fetch(&self, dest: &Path, progress: &dyn ProgressSink) -> Result<()>;
}

fn transfer_client(user_agent: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(NetworkConfig::SOCKET_PHASE_TIMEOUT)
        .read_timeout(NetworkConfig::SOCKET_PHASE_TIMEOUT)
        .pool_idle_timeout(NetworkConfig::SOCKET_PHASE_TIMEOUT)
        .user_agent(user_agent.to_string())
        .build()
        .map_err(|e| HubError::Network {
            message: format!("failed to create transfer client: {}", e),
            cause: None,
        })
}

async fn fetch_with_resume(
    http: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    size: Option<u64>,
    dest: &Path,
    progress: &dyn ProgressSink,
) -> Result<()> {
    let tmp_path = PathBuf::from(format!("{}.tmp", dest.display()));
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| HubError::io_with_path(e, parent))?;
    }

    let label = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| url.to_string());
    let row = progress.add_row(&label, size.unwrap_or(0));

    transfer::download_with_retry(http, url, &tmp_path, bearer, row.as_ref()).await?;

    tokio::fs::rename(&tmp_path, dest)
        .await
        .map_err(|e| HubError::io_with_path(e, dest))?;
    row.finish();

    info!("downloaded {} to {}", url, dest.display());
    Ok(())
}

/// Plain URL source: the filename is the URL's last path segment.
pub struct DirectUrlSource {
    url: String,
    http: reqwest::Client,
}

impl DirectUrlSource {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            http: transfer_client(NetworkConfig::USER_AGENT)?,
        })
    }
}

#[async_trait]
impl DownloadSource for DirectUrlSource {
    async fn file_info(&self) -> Result<RemoteFileInfo> {
        let filename = self
            .url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(String::from);
        Ok(RemoteFileInfo {
            url: self.url.clone(),
            size: None,
            filename,
        })
    }

    async fn fetch(&self, dest: &Path, progress: &dyn ProgressSink) -> Result<()> {
        let info = self.file_info().await?;
        fetch_with_resume(&self.http, &info.url, None, info.size, dest, progress).await
    }
}

/// Civitai-style source: the API answers with a redirect whose
/// `Location` carries the CDN URL and, in its query string, the
/// intended filename.
pub struct CivitaiSource {
    url: String,
    api_key: Option<String>,
    probe: reqwest::Client,
    http: reqwest::Client,
}

impl CivitaiSource {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let probe = reqwest::Client::builder()
            .timeout(NetworkConfig::API_REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| HubError::Network {
                message: format!("failed to create probe client: {}", e),
                cause: None,
            })?;

        Ok(Self {
            url: url.into(),
            api_key,
            probe,
            http: transfer_client(NetworkConfig::USER_AGENT)?,
        })
    }
}

/// Pull `filename="..."` out of a `response-content-disposition` value.
fn filename_from_disposition(disposition: &str) -> Option<String> {
    let start = disposition.find("filename=\"")? + "filename=\"".len();
    let rest = &disposition[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

#[async_trait]
impl DownloadSource for CivitaiSource {
    async fn file_info(&self) -> Result<RemoteFileInfo> {
        let mut request = self.probe.get(&self.url);
        if let Some(key) = &self.api_key {
            request = request.header(reqwest::header::AUTHORIZATION, format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(HubError::from)?;
        let status = response.status();
        if !status.is_redirection() {
            return Err(HubError::BadStatus {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| HubError::Metadata {
                filename: self.url.clone(),
                message: "no redirect location found".to_string(),
            })?;

        let redirect_url = reqwest::Url::parse(&location).map_err(|e| HubError::Metadata {
            filename: self.url.clone(),
            message: format!("failed to parse redirect location: {}", e),
        })?;

        let mut filename = redirect_url
            .query_pairs()
            .find(|(key, _)| key == "response-content-disposition")
            .and_then(|(_, value)| filename_from_disposition(&value));

        if filename.is_none() {
            filename = redirect_url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|s| !s.is_empty())
                .map(String::from);
        }

        let size = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        Ok(RemoteFileInfo {
            url: location,
            size,
            filename,
        })
    }

    async fn fetch(&self, dest: &Path, progress: &dyn ProgressSink) -> Result<()> {
        let info = self.file_info().await?;
        fetch_with_resume(
            &self.http,
            &info.url,
            self.api_key.as_deref(),
            info.size,
            dest,
            progress,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_direct_url_filename_from_path() {
        let source = DirectUrlSource::new("https://example.com/files/model.safetensors").unwrap();
        let info = source.file_info().await.unwrap();
        assert_eq!(info.filename.as_deref(), Some("model.safetensors"));
        assert_eq!(info.url, "https://example.com/files/model.safetensors");
    }

    #[test]
    fn test_filename_from_disposition() {
        assert_eq!(
            filename_from_disposition("attachment; filename=\"model.ckpt\""),
            Some("model.ckpt".to_string())
        );
        assert_eq!(filename_from_disposition("attachment"), None);
    }
}
