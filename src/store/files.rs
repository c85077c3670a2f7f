use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

/// File-system capability used by the durable store.
#[async_trait]
pub trait FileAccess: Send + Sync {
    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;
    async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
    /// Create `path` and any missing parents. Succeeds if it already exists.
    async fn create_folder(&self, path: &Path) -> io::Result<()>;
}

/// Real disk access through `tokio::fs`. Writes go to a sibling temp file
/// that is renamed over the target so readers never see a partial document.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileAccess;

#[async_trait]
impl FileAccess for TokioFileAccess {
    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, contents).await?;
        tokio::fs::rename(&tmp_path, path).await
    }

    async fn create_folder(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }
}

/// In-memory file map. Used where no disk is wanted and by tests, which
/// can also make writes fail on demand.
#[derive(Debug, Default)]
pub struct MemoryFileAccess {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    folders: Mutex<Vec<PathBuf>>,
    fail_writes: AtomicBool,
}

impl MemoryFileAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.insert(path.into(), contents.into());
    }

    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.get(path).cloned()
    }

    pub fn has_folder(&self, path: &Path) -> bool {
        let folders = self.folders.lock().unwrap_or_else(|e| e.into_inner());
        folders.iter().any(|folder| folder == path)
    }
}

#[async_trait]
impl FileAccess for MemoryFileAccess {
    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.contents(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
        })
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("write to {} rejected", path.display()),
            ));
        }
        self.insert(path, contents.to_vec());
        Ok(())
    }

    async fn create_folder(&self, path: &Path) -> io::Result<()> {
        let mut folders = self.folders.lock().unwrap_or_else(|e| e.into_inner());
        if !folders.iter().any(|folder| folder == path) {
            folders.push(path.to_path_buf());
        }
        Ok(())
    }
}
