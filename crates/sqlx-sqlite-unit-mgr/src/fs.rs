//! File-system access used to probe and remove database artifacts

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Size and modification time of an existing file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
   pub size: u64,
   pub modified: Option<SystemTime>,
}

/// Raw file operations the manager relies on.
///
/// Every call may block on I/O and is treated as a suspension point.
/// Implementations must report "not found" as `Ok(false)` / `Ok(None)` /
/// `Ok(())` rather than as an error so that callers can tell a missing file
/// apart from a failed probe.
pub trait FileSystem: Send + Sync + 'static {
   /// Whether a file exists at `path`
   fn exists(&self, path: &Path) -> impl Future<Output = io::Result<bool>> + Send;

   /// Size and mtime of the file at `path`, `None` if it doesn't exist
   fn stat(&self, path: &Path) -> impl Future<Output = io::Result<Option<FileStat>>> + Send;

   /// Remove the file at `path`. Removing a missing file succeeds.
   fn remove(&self, path: &Path) -> impl Future<Output = io::Result<()>> + Send;

   /// Write `bytes` to `path`, replacing any existing content
   fn write(&self, path: &Path, bytes: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

   /// Create `path` and all missing parents
   fn create_dir_all(&self, path: &Path) -> impl Future<Output = io::Result<()>> + Send;

   /// Absolute form of `path` with every symlink and `..` resolved. Fails
   /// with `NotFound` if `path` doesn't exist.
   fn canonicalize(&self, path: &Path) -> impl Future<Output = io::Result<PathBuf>> + Send;
}

/// [`FileSystem`] backed by `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

impl FileSystem for TokioFileSystem {
   async fn exists(&self, path: &Path) -> io::Result<bool> {
      tokio::fs::try_exists(path).await
   }

   async fn stat(&self, path: &Path) -> io::Result<Option<FileStat>> {
      match tokio::fs::metadata(path).await {
         Ok(meta) => Ok(Some(FileStat {
            size: meta.len(),
            modified: meta.modified().ok(),
         })),
         Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
         Err(e) => Err(e),
      }
   }

   async fn remove(&self, path: &Path) -> io::Result<()> {
      match tokio::fs::remove_file(path).await {
         Ok(()) => Ok(()),
         Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
         Err(e) => Err(e),
      }
   }

   async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
      tokio::fs::write(path, bytes).await
   }

   async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
      tokio::fs::create_dir_all(path).await
   }

   async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
      tokio::fs::canonicalize(path).await
   }
}
