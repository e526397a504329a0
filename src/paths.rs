//! Cache path computation and filesystem layout helpers.
//!
//! The on-disk layout under the cache root:
//!
//! ```text
//! <root>/<type>s--<owner>--<name>/
//!   blobs/<etag>
//!   snapshots/<commit>/<path>   -> ../../blobs/<etag>
//!   refs/<revision>
//! <root>/.locks/<type>s--<owner>--<name>/<etag>.lock
//! ```

use crate::config::CacheConfig;
use crate::error::{HubError, Result};
use std::path::{Path, PathBuf};

/// Convert `owner/name` into the cache folder name for a repo type,
/// e.g. `models--owner--name`.
pub fn repo_folder_name(repo_id: &str, repo_type: &str) -> String {
    let mut parts = vec![format!("{}s", repo_type)];
    parts.extend(repo_id.split('/').map(String::from));
    parts.join("--")
}

/// Expand a leading `~` to the user's home directory and return the
/// absolute, cleaned form of the path.
pub fn expand_path(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        return Err(HubError::Config {
            message: "empty cache path".to_string(),
        });
    }

    let expanded = if path == "~" {
        dirs::home_dir().ok_or_else(|| HubError::Config {
            message: "failed to resolve user home directory".to_string(),
        })?
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .ok_or_else(|| HubError::Config {
                message: "failed to resolve user home directory".to_string(),
            })?
            .join(rest)
    } else {
        PathBuf::from(path)
    };

    std::path::absolute(&expanded).map_err(|e| HubError::io_with_path(e, expanded))
}

/// Check whether a revision string is a full 40-character hex commit hash.
pub fn is_commit_hash(s: &str) -> bool {
    s.len() == 40 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Resolve the default cache root from the documented environment
/// precedence: `$XDG_CACHE_HOME/huggingface/hub`, `$HF_HUB_CACHE`,
/// `$HF_HOME/hub`, `~/.cache/huggingface/hub`.
pub fn default_cache_dir() -> Result<PathBuf> {
    if let Some(xdg) = non_empty_env(CacheConfig::XDG_CACHE_ENV) {
        return Ok(PathBuf::from(xdg).join("huggingface").join("hub"));
    }
    if let Some(cache) = non_empty_env(CacheConfig::HUB_CACHE_ENV) {
        return Ok(PathBuf::from(cache));
    }
    if let Some(home) = non_empty_env(CacheConfig::HF_HOME_ENV) {
        return Ok(PathBuf::from(home).join("hub"));
    }

    let home = dirs::home_dir().ok_or_else(|| HubError::Config {
        message: "failed to resolve user home directory".to_string(),
    })?;
    Ok(home.join(".cache").join("huggingface").join("hub"))
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Storage folder for a repo under the cache root.
pub fn storage_folder(cache_dir: &Path, repo_id: &str, repo_type: &str) -> PathBuf {
    cache_dir.join(repo_folder_name(repo_id, repo_type))
}

/// Lock file path for a blob under the cache root.
pub fn lock_path(cache_dir: &Path, repo_id: &str, repo_type: &str, etag: &str) -> PathBuf {
    cache_dir
        .join(CacheConfig::LOCKS_DIR)
        .join(repo_folder_name(repo_id, repo_type))
        .join(format!("{}.lock", etag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_folder_name() {
        assert_eq!(
            repo_folder_name("owner/name", "model"),
            "models--owner--name"
        );
        assert_eq!(
            repo_folder_name("owner/name", "dataset"),
            "datasets--owner--name"
        );
        assert_eq!(repo_folder_name("single", "space"), "spaces--single");
    }

    #[test]
    fn test_is_commit_hash() {
        assert!(is_commit_hash("0123456789abcdef0123456789abcdef01234567"));
        assert!(!is_commit_hash("main"));
        assert!(!is_commit_hash("0123456789ABCDEF0123456789ABCDEF01234567"));
        assert!(!is_commit_hash("0123456789abcdef0123456789abcdef0123456"));
        assert!(!is_commit_hash(
            "0123456789abcdef0123456789abcdef01234567ff"
        ));
    }

    #[test]
    fn test_expand_path_home() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_path("~").unwrap(), home);
        assert_eq!(expand_path("~/x/y").unwrap(), home.join("x").join("y"));
    }

    #[test]
    fn test_expand_path_absolute_passthrough() {
        assert_eq!(
            expand_path("/tmp/cache").unwrap(),
            PathBuf::from("/tmp/cache")
        );
    }

    #[test]
    fn test_expand_path_empty_rejected() {
        assert!(expand_path("").is_err());
    }

    #[test]
    fn test_lock_path_layout() {
        let path = lock_path(Path::new("/cache"), "owner/name", "model", "E1");
        assert_eq!(
            path,
            PathBuf::from("/cache/.locks/models--owner--name/E1.lock")
        );
    }
}
