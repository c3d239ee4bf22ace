//! Filesystem helpers for run artifacts.
//!
//! Intermediate and final files may live on different filesystems, so moves
//! fall back to copy-and-delete on EXDEV.

use std::path::Path;

use tokio::fs;
use tracing::{debug, error, warn};

use crate::error::{MediaError, MediaResult};

/// Move `src` to `dst`, replacing any existing `dst`.
///
/// Renames when both paths share a filesystem. On EXDEV the bytes are
/// copied to `<dst>.tmp`, that file is renamed over `dst`, and `src` is
/// deleted.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());

    match dst.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir).await?,
        _ => {}
    }

    let Err(err) = fs::rename(src, dst).await else {
        return Ok(());
    };
    if !crosses_devices(&err) {
        return Err(err.into());
    }
    debug!(from = %src.display(), to = %dst.display(), "rename crossed filesystems, copying");
    copy_across(src, dst).await
}

/// EXDEV: rename(2) across mount points.
fn crosses_devices(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(18)
}

async fn copy_across(src: &Path, dst: &Path) -> MediaResult<()> {
    let staged = dst.with_extension("tmp");

    if let Err(e) = fs::copy(src, &staged).await {
        error!(from = %src.display(), to = %staged.display(), error = %e, "copy failed");
        remove_if_exists(&staged).await;
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&staged, dst).await {
        error!(from = %staged.display(), to = %dst.display(), error = %e, "rename of staged copy failed");
        remove_if_exists(&staged).await;
        return Err(e.into());
    }
    if let Err(e) = fs::remove_file(src).await {
        warn!(path = %src.display(), error = %e, "moved file left its source behind");
    }
    Ok(())
}

/// Size of a file in bytes, 0 when it does not exist.
pub async fn file_size(path: impl AsRef<Path>) -> u64 {
    fs::metadata(path.as_ref()).await.map(|m| m.len()).unwrap_or(0)
}

/// Require `path` to exist and be strictly larger than `min_size` bytes.
///
/// Returns the file size.
pub async fn ensure_min_size(path: impl AsRef<Path>, min_size: u64) -> MediaResult<u64> {
    let path = path.as_ref();
    let size = file_size(path).await;
    if size <= min_size {
        return Err(MediaError::OutputTooSmall {
            path: path.to_path_buf(),
            size,
            min_size,
        });
    }
    Ok(size)
}

/// Remove a file, ignoring "not found". Other failures are logged.
pub async fn remove_if_exists(path: impl AsRef<Path>) {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_move_file_same_filesystem() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("temp_out.mp4");
        let dst = dir.path().join("out.mp4");

        fs::write(&src, b"frames").await.unwrap();
        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"frames");
    }

    #[tokio::test]
    async fn test_move_file_to_subdirectory() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("temp_a.mp4");
        let dst = dir.path().join("results").join("job-1").join("a.mp4");

        fs::write(&src, b"frames").await.unwrap();
        move_file(&src, &dst).await.unwrap();

        assert!(dst.exists() && !src.exists());
    }

    #[tokio::test]
    async fn test_move_file_overwrites_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("temp_b.mp4");
        let dst = dir.path().join("b.mp4");

        fs::write(&src, b"fresh").await.unwrap();
        fs::write(&dst, b"stale partial output").await.unwrap();
        move_file(&src, &dst).await.unwrap();

        assert_eq!(fs::read(&dst).await.unwrap(), b"fresh");
    }

    #[test]
    fn test_exdev_detection() {
        assert!(crosses_devices(&std::io::Error::from_raw_os_error(18)));
        assert!(!crosses_devices(&std::io::Error::from_raw_os_error(2)));
    }

    #[tokio::test]
    async fn test_ensure_min_size_rejects_tiny_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tiny.mp4");
        fs::write(&path, [0u8; 10]).await.unwrap();

        let err = ensure_min_size(&path, 1000).await.unwrap_err();
        assert!(matches!(err, MediaError::OutputTooSmall { size: 10, min_size: 1000, .. }));
        assert!(ensure_min_size(&path, 5).await.is_ok());
    }

    #[tokio::test]
    async fn test_ensure_min_size_missing_file() {
        let err = ensure_min_size("/nonexistent/out.mp4", 100).await.unwrap_err();
        assert!(matches!(err, MediaError::OutputTooSmall { size: 0, .. }));
    }

    #[tokio::test]
    async fn test_remove_if_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x");
        remove_if_exists(&path).await;
        fs::write(&path, b"1").await.unwrap();
        remove_if_exists(&path).await;
        assert!(!path.exists());
    }
}
