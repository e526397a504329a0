//! Repository listing via the hub API.

use crate::error::{HubError, Result};
use crate::{Client, Repo};
use serde::Deserialize;
use tracing::debug;

/// Repository record: the resolved commit hash for the requested
/// revision and the flat list of files at that commit.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoInfo {
    pub sha: String,
    #[serde(default)]
    pub siblings: Vec<RepoSibling>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoSibling {
    pub rfilename: String,
}

impl RepoInfo {
    /// Flatten siblings into relative path strings.
    pub fn filenames(&self) -> Vec<String> {
        self.siblings.iter().map(|s| s.rfilename.clone()).collect()
    }
}

impl Client {
    /// Fetch the repository record for a repo at a revision.
    ///
    /// Non-`main` revisions are addressed with a `/resolve/<rev>`
    /// suffix on the API URL.
    pub(crate) async fn repo_info(&self, repo: &Repo, revision: &str) -> Result<RepoInfo> {
        let mut url = format!("{}/api/models/{}", self.endpoint(), repo.id);
        if !revision.is_empty() && revision != "main" {
            url = format!("{}/resolve/{}", url, revision);
        }

        debug!("fetching repo info from {}", url);

        let response = self
            .with_auth(self.api_client().get(&url))
            .send()
            .await
            .map_err(|e| HubError::RepoInfo {
                message: format!("request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(HubError::RepoInfo {
                message: format!("API request failed with status {}", response.status()),
            });
        }

        let info: RepoInfo = response.json().await.map_err(|e| HubError::RepoInfo {
            message: format!("failed to parse repo info: {}", e),
        })?;

        if info.sha.is_empty() {
            return Err(HubError::RepoInfo {
                message: "invalid API response: missing commit hash".to_string(),
            });
        }

        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_info_decodes_siblings() {
        let json = r#"{
            "sha": "0123456789abcdef0123456789abcdef01234567",
            "siblings": [
                {"rfilename": "config.json"},
                {"rfilename": "unet/diffusion_pytorch_model.safetensors"}
            ]
        }"#;
        let info: RepoInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.sha, "0123456789abcdef0123456789abcdef01234567");
        assert_eq!(
            info.filenames(),
            vec![
                "config.json".to_string(),
                "unet/diffusion_pytorch_model.safetensors".to_string()
            ]
        );
    }

    #[test]
    fn test_repo_info_tolerates_missing_siblings() {
        let info: RepoInfo =
            serde_json::from_str(r#"{"sha": "abc"}"#).unwrap();
        assert!(info.filenames().is_empty());
    }
}
