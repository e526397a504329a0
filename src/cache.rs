//! Cache tree operations: pointer materialization, cache-only
//! resolution, ref persistence and per-blob advisory locking.

use crate::config::CacheConfig;
use crate::error::{HubError, Result};
use crate::paths::{is_commit_hash, repo_folder_name};
use fs4::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Create a snapshot pointer as a relative symlink into the blob store.
///
/// The link target is stored relative to the pointer's parent directory
/// so the cache root can be relocated. Falls back to a byte copy when
/// symlinks are unavailable. Idempotent: an existing entry at the
/// pointer path is replaced.
pub fn create_symlink(blob_path: &Path, pointer_path: &Path) -> Result<()> {
    let src = std::path::absolute(blob_path).map_err(|e| HubError::io_with_path(e, blob_path))?;
    let dst =
        std::path::absolute(pointer_path).map_err(|e| HubError::io_with_path(e, pointer_path))?;

    let parent = dst.parent().ok_or_else(|| HubError::SymlinkFailed {
        src: src.clone(),
        dest: dst.clone(),
        reason: "pointer path has no parent directory".to_string(),
    })?;

    let rel = relative_path(parent, &src);

    if dst.symlink_metadata().is_ok() {
        fs::remove_file(&dst).map_err(|e| HubError::io_with_path(e, &dst))?;
    }
    fs::create_dir_all(parent).map_err(|e| HubError::io_with_path(e, parent))?;

    if let Err(e) = symlink_file(&rel, &dst) {
        warn!(
            "symlink creation failed ({}), copying {} instead",
            e,
            src.display()
        );
        fs::copy(&src, &dst).map_err(|copy_err| HubError::SymlinkFailed {
            src: src.clone(),
            dest: dst.clone(),
            reason: format!("symlink failed ({}) and copy failed ({})", e, copy_err),
        })?;
    }

    Ok(())
}

#[cfg(unix)]
fn symlink_file(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_file(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// Compute the path of `target` relative to `base` (both absolute).
fn relative_path(base: &Path, target: &Path) -> PathBuf {
    let base_parts: Vec<Component> = base.components().collect();
    let target_parts: Vec<Component> = target.components().collect();

    let common = base_parts
        .iter()
        .zip(target_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..base_parts.len() {
        rel.push("..");
    }
    for part in &target_parts[common..] {
        rel.push(part);
    }
    rel
}

/// Locate a single cached file for a repo at a revision, resolving
/// symbolic revisions through `refs/`.
pub fn find_in_cache(
    cache_dir: &Path,
    repo_id: &str,
    repo_type: &str,
    filename: &str,
    revision: &str,
) -> Result<PathBuf> {
    let storage = cache_dir.join(repo_folder_name(repo_id, repo_type));

    if is_commit_hash(revision) {
        let path = storage
            .join(CacheConfig::SNAPSHOTS_DIR)
            .join(revision)
            .join(filename);
        if path.exists() {
            return Ok(path);
        }
        return Err(HubError::OfflineNotCached {
            message: format!("file not found in cache at revision {}", revision),
        });
    }

    let commit_hash = read_ref(&storage, revision)?;
    let path = storage
        .join(CacheConfig::SNAPSHOTS_DIR)
        .join(&commit_hash)
        .join(filename);
    if path.exists() {
        return Ok(path);
    }

    Err(HubError::OfflineNotCached {
        message: format!("file {} not found in cache", filename),
    })
}

/// Locate a cached snapshot directory for a repo at a revision.
pub fn find_cached_snapshot(
    cache_dir: &Path,
    repo_id: &str,
    repo_type: &str,
    revision: &str,
) -> Result<PathBuf> {
    let storage = cache_dir.join(repo_folder_name(repo_id, repo_type));

    if is_commit_hash(revision) {
        let path = storage.join(CacheConfig::SNAPSHOTS_DIR).join(revision);
        if path.is_dir() {
            return Ok(path);
        }
    }

    let commit_hash = read_ref(&storage, revision)?;
    let path = storage.join(CacheConfig::SNAPSHOTS_DIR).join(&commit_hash);
    if path.is_dir() {
        return Ok(path);
    }

    Err(HubError::OfflineNotCached {
        message: format!("snapshot for revision {} not found in cache", revision),
    })
}

fn read_ref(storage: &Path, revision: &str) -> Result<String> {
    let ref_path = storage.join(CacheConfig::REFS_DIR).join(revision);
    let contents = fs::read_to_string(&ref_path).map_err(|_| HubError::OfflineNotCached {
        message: format!("revision {} not found in cache", revision),
    })?;
    Ok(contents.trim().to_string())
}

/// Persist a revision -> commit-hash alias. Written to a temp file and
/// renamed so concurrent readers never observe a torn ref.
pub fn write_ref(storage: &Path, revision: &str, commit_hash: &str) -> Result<()> {
    let refs_dir = storage.join(CacheConfig::REFS_DIR);
    fs::create_dir_all(&refs_dir).map_err(|e| HubError::io_with_path(e, &refs_dir))?;

    let ref_path = refs_dir.join(revision);
    let tmp_path = refs_dir.join(format!("{}.{}.tmp", revision, std::process::id()));

    fs::write(&tmp_path, commit_hash).map_err(|e| HubError::io_with_path(e, &tmp_path))?;
    fs::rename(&tmp_path, &ref_path).map_err(|e| HubError::io_with_path(e, &ref_path))?;

    debug!("cached revision {} -> {}", revision, commit_hash);
    Ok(())
}

/// Guard holding an advisory lock on a blob. The lock is released when
/// the guard drops.
#[derive(Debug)]
pub struct BlobLock {
    file: File,
}

impl Drop for BlobLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Try to acquire the advisory lock for a blob without blocking.
///
/// Contention surfaces as [`HubError::LockBusy`]; callers may retry and
/// will usually find the completed blob on the next attempt.
pub fn acquire_blob_lock(lock_path: &Path, etag: &str) -> Result<BlobLock> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent).map_err(|e| HubError::io_with_path(e, parent))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(lock_path)
        .map_err(|e| HubError::io_with_path(e, lock_path))?;

    match file.try_lock_exclusive() {
        Ok(()) => Ok(BlobLock { file }),
        Err(err) if err.kind() == ErrorKind::WouldBlock => Err(HubError::LockBusy {
            etag: etag.to_string(),
        }),
        Err(err) => Err(HubError::io_with_path(err, lock_path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_relative_path_sibling_dirs() {
        let rel = relative_path(
            Path::new("/cache/models--o--n/snapshots/C1/a"),
            Path::new("/cache/models--o--n/blobs/E1"),
        );
        assert_eq!(rel, PathBuf::from("../../../blobs/E1"));
    }

    #[test]
    fn test_create_symlink_materializes_pointer() {
        let temp = TempDir::new().unwrap();
        let blob = temp.path().join("blobs").join("E1");
        fs::create_dir_all(blob.parent().unwrap()).unwrap();
        fs::write(&blob, b"hello world!").unwrap();

        let pointer = temp.path().join("snapshots").join("C1").join("a").join("b.json");
        create_symlink(&blob, &pointer).unwrap();

        assert_eq!(fs::read(&pointer).unwrap(), b"hello world!");
        #[cfg(unix)]
        {
            let target = fs::read_link(&pointer).unwrap();
            assert!(target.is_relative());
        }
    }

    #[test]
    fn test_create_symlink_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let blob = temp.path().join("blobs").join("E1");
        fs::create_dir_all(blob.parent().unwrap()).unwrap();
        fs::write(&blob, b"data").unwrap();

        let pointer = temp.path().join("snapshots").join("C1").join("f.bin");
        create_symlink(&blob, &pointer).unwrap();
        create_symlink(&blob, &pointer).unwrap();
        assert_eq!(fs::read(&pointer).unwrap(), b"data");
    }

    #[test]
    fn test_write_then_read_ref() {
        let temp = TempDir::new().unwrap();
        let storage = temp.path().join("models--o--n");
        write_ref(&storage, "main", "0123456789abcdef0123456789abcdef01234567").unwrap();
        assert_eq!(
            read_ref(&storage, "main").unwrap(),
            "0123456789abcdef0123456789abcdef01234567"
        );

        // Rewriting the same ref replaces the content.
        write_ref(&storage, "main", "fedcba9876543210fedcba9876543210fedcba98").unwrap();
        assert_eq!(
            read_ref(&storage, "main").unwrap(),
            "fedcba9876543210fedcba9876543210fedcba98"
        );
    }

    #[test]
    fn test_find_in_cache_through_ref() {
        let temp = TempDir::new().unwrap();
        let storage = temp.path().join("models--owner--name");
        let sha = "0123456789abcdef0123456789abcdef01234567";
        let file = storage.join("snapshots").join(sha).join("config.json");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"{}").unwrap();
        write_ref(&storage, "main", sha).unwrap();

        let found =
            find_in_cache(temp.path(), "owner/name", "model", "config.json", "main").unwrap();
        assert_eq!(found, file);
    }

    #[test]
    fn test_find_in_cache_by_commit_hash() {
        let temp = TempDir::new().unwrap();
        let sha = "0123456789abcdef0123456789abcdef01234567";
        let file = temp
            .path()
            .join("models--owner--name")
            .join("snapshots")
            .join(sha)
            .join("a")
            .join("b.json");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"{}").unwrap();

        let found = find_in_cache(temp.path(), "owner/name", "model", "a/b.json", sha).unwrap();
        assert_eq!(found, file);
    }

    #[test]
    fn test_find_in_cache_missing_revision() {
        let temp = TempDir::new().unwrap();
        let err =
            find_in_cache(temp.path(), "owner/name", "model", "config.json", "main").unwrap_err();
        assert!(matches!(err, HubError::OfflineNotCached { .. }));
    }

    #[test]
    fn test_find_cached_snapshot_pruned_tree_reports_not_cached() {
        let temp = TempDir::new().unwrap();
        let storage = temp.path().join("models--owner--name");
        // Ref exists but the snapshot tree was pruned externally.
        write_ref(&storage, "main", "0123456789abcdef0123456789abcdef01234567").unwrap();

        let err = find_cached_snapshot(temp.path(), "owner/name", "model", "main").unwrap_err();
        assert!(matches!(err, HubError::OfflineNotCached { .. }));
    }

    #[test]
    fn test_lock_exclusivity() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join(".locks").join("models--o--n").join("E1.lock");

        let held = acquire_blob_lock(&lock_path, "E1").unwrap();
        let err = acquire_blob_lock(&lock_path, "E1").unwrap_err();
        assert!(matches!(err, HubError::LockBusy { .. }));

        drop(held);
        acquire_blob_lock(&lock_path, "E1").unwrap();
    }
}
