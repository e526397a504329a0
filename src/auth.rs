//! Token resolution and offline-mode detection.

use crate::config::CacheConfig;
use crate::error::{HubError, Result};

/// Resolve a bearer token from the environment or the shared token file.
///
/// Checks in order:
/// 1. `HF_TOKEN` environment variable
/// 2. `~/.cache/huggingface/token` (trimmed)
///
/// Returns `None` when neither source yields a non-empty token.
pub fn resolve_token() -> Option<String> {
    if let Ok(token) = std::env::var(CacheConfig::TOKEN_ENV) {
        let token = token.trim().to_string();
        if !token.is_empty() {
            return Some(token);
        }
    }

    let home = dirs::home_dir()?;
    let token_path = home.join(".cache").join("huggingface").join("token");
    if let Ok(token) = std::fs::read_to_string(token_path) {
        let token = token.trim().to_string();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}

/// Check whether offline mode is enabled via `HF_HUB_OFFLINE=1`.
pub fn is_offline_mode() -> bool {
    std::env::var(CacheConfig::OFFLINE_ENV).as_deref() == Ok("1")
}

/// Gate network access. Fails when offline mode is on or the request
/// asked for local files only; orchestrators then fall back to a
/// cache-only resolution.
pub fn check_connectivity(local_files_only: bool) -> Result<()> {
    if is_offline_mode() {
        return Err(HubError::OfflineNotCached {
            message: "offline mode is enabled (HF_HUB_OFFLINE=1)".to_string(),
        });
    }
    if local_files_only {
        return Err(HubError::OfflineNotCached {
            message: "local_files_only is set".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_files_only_blocks_network() {
        let err = check_connectivity(true).unwrap_err();
        assert!(matches!(err, HubError::OfflineNotCached { .. }));
    }

    #[test]
    fn test_connectivity_allowed_by_default() {
        // HF_HUB_OFFLINE is not set to "1" in the test environment.
        if !is_offline_mode() {
            assert!(check_connectivity(false).is_ok());
        }
    }
}
