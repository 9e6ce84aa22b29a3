//! Local filesystem storage for uploaded documents.
//!
//! Documents are stored under the configured upload directory, keyed by the filename the client
//! sent. There is no collision handling: storing a name that already exists replaces it.
//!
//! Writes go through a [`PendingDocument`]. In atomic mode the bytes land in a hidden staging
//! file next to the target (`.<name>.<uuid>.part`) which is renamed over the target on
//! [`PendingDocument::commit`], so concurrent uploads of one name each replace the file whole and
//! the last rename wins. In direct mode the target itself is truncated and written, and
//! concurrent writers can interleave.

use crate::config::{FilenamePolicy, StorageConfig};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    fn io<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(std::io::Error) -> Self + 'a {
        move |source| StorageError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Returns true if `name` can be joined to a directory without escaping it.
pub fn is_plain_filename(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0']) && !Path::new(name).is_absolute()
}

/// Local filesystem storage backend - one file per upload in a single directory
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    atomic_writes: bool,
    policy: FilenamePolicy,
}

impl LocalStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.upload_dir.clone(),
            atomic_writes: config.atomic_writes,
            policy: config.filename_policy,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the upload directory if it does not exist yet
    pub async fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await.map_err(StorageError::io("create", &self.root))
    }

    /// Map a client-supplied filename to its storage path.
    ///
    /// Returns `None` when the filename policy refuses the name.
    pub fn resolve(&self, filename: &str) -> Option<PathBuf> {
        match self.policy {
            FilenamePolicy::Strict if !is_plain_filename(filename) => None,
            _ => Some(self.root.join(filename)),
        }
    }

    /// Open a write for `target`, truncating it (direct mode) or staging beside it (atomic mode).
    pub async fn create(&self, target: PathBuf) -> Result<PendingDocument> {
        let staging = self.atomic_writes.then(|| staging_path(&target));
        let write_path = staging.as_deref().unwrap_or(&target);

        let file = fs::File::create(write_path).await.map_err(StorageError::io("create", write_path))?;

        Ok(PendingDocument {
            target,
            staging,
            file,
            bytes_written: 0,
        })
    }
}

fn staging_path(target: &Path) -> PathBuf {
    let name = target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    target.with_file_name(format!(".{}.{}.part", name, uuid::Uuid::new_v4()))
}

/// An in-progress document write. Finish with [`commit`](Self::commit) or [`discard`](Self::discard).
#[derive(Debug)]
pub struct PendingDocument {
    target: PathBuf,
    staging: Option<PathBuf>,
    file: fs::File,
    bytes_written: u64,
}

impl PendingDocument {
    fn write_path(&self) -> &Path {
        self.staging.as_deref().unwrap_or(&self.target)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let path = self.staging.as_deref().unwrap_or(&self.target);
        self.file.write_all(chunk).await.map_err(StorageError::io("write", path))?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    /// Flush the written bytes, move them into place and return the stored file's size.
    ///
    /// The size is read back from the filesystem rather than taken from the byte count. A
    /// successful commit means the data reached the OS, not that it was fsynced.
    pub async fn commit(mut self) -> Result<u64> {
        let write_path = self.write_path().to_path_buf();
        if let Err(source) = self.file.flush().await {
            self.discard().await;
            return Err(StorageError::Io {
                action: "flush",
                path: write_path,
                source,
            });
        }

        let Self { target, staging, file, .. } = self;
        drop(file);

        if let Some(staging) = staging
            && let Err(source) = fs::rename(&staging, &target).await
        {
            let _ = fs::remove_file(&staging).await;
            return Err(StorageError::Io {
                action: "rename",
                path: target,
                source,
            });
        }

        let metadata = fs::metadata(&target).await.map_err(StorageError::io("stat", &target))?;
        Ok(metadata.len())
    }

    /// Abandon the write and remove whatever was written, best-effort.
    pub async fn discard(self) {
        let path = self.write_path().to_path_buf();
        drop(self.file);
        if let Err(e) = fs::remove_file(&path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial upload");
        }
    }
}
