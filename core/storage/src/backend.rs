//! Backend capability contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};

use storagekit_common::{Error, Result};

use crate::transfer;
use crate::uri;

/// Metadata for a stored object or directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Full backend path of the entry.
    pub name: String,
    /// Size in bytes (None for directories).
    pub size: Option<u64>,
    /// Whether this is a directory (or an object-store prefix).
    pub is_directory: bool,
    /// Last modification time, when the backend knows it.
    pub modified: Option<DateTime<Utc>>,
    /// ETag or revision ID.
    pub etag: Option<String>,
}

impl Metadata {
    /// Metadata for a regular file.
    pub fn file(name: impl Into<String>, size: u64, modified: Option<DateTime<Utc>>) -> Self {
        Self {
            name: name.into(),
            size: Some(size),
            is_directory: false,
            modified,
            etag: None,
        }
    }

    /// Metadata for a directory.
    pub fn directory(name: impl Into<String>, modified: Option<DateTime<Utc>>) -> Self {
        Self {
            name: name.into(),
            size: None,
            is_directory: true,
            modified,
            etag: None,
        }
    }

    /// Attach an etag.
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    /// Last component of the entry's path.
    pub fn base_name(&self) -> &str {
        uri::base_name(&self.name)
    }
}

/// Which family of storage a backend belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Local filesystem.
    LocalDisk,
    /// Object store (S3, GCS, Azure, HTTP).
    ObjectStore,
    /// Remote protocol (SFTP, FTP, SMB, ...).
    RemoteProtocol,
    /// Process-local memory.
    InMemory,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::LocalDisk => "local-disk",
            BackendKind::ObjectStore => "object-store",
            BackendKind::RemoteProtocol => "remote-protocol",
            BackendKind::InMemory => "in-memory",
        };
        f.write_str(name)
    }
}

/// Readable byte stream returned by [`Backend::open_read`].
pub type BoxReader = Pin<Box<dyn AsyncRead + Send>>;

/// Writable byte stream returned by [`Backend::open_write`].
///
/// Data is only guaranteed to be visible once the writer has been shut down.
pub type BoxWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// A storage backend handle.
///
/// One handle is built per (protocol, options) pair and shared by every
/// caller that resolves to it, so implementations must be safe to use
/// concurrently. Paths are backend-native strings produced by
/// [`Backend::path_from_uri`].
///
/// Optional capabilities are exposed through `as_native_*` queries rather
/// than probing at runtime.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Protocol this handle was built for (e.g., "memory", "file", "s3").
    fn protocol(&self) -> &str;

    /// Backend family.
    fn kind(&self) -> BackendKind;

    /// Derive the backend path for a physical location.
    ///
    /// The default drops the `scheme://` prefix.
    fn path_from_uri(&self, uri: &str) -> String {
        uri::strip_protocol(uri).to_string()
    }

    /// Open a file for streaming reads.
    ///
    /// # Errors
    /// - File not found
    /// - Path is a directory
    async fn open_read(&self, path: &str) -> Result<BoxReader>;

    /// Open a file for streaming writes, truncating any existing content.
    ///
    /// # Postconditions
    /// - After the writer is shut down the file holds exactly the bytes written
    async fn open_write(&self, path: &str) -> Result<BoxWriter>;

    /// Open a file for appending.
    async fn open_append(&self, path: &str) -> Result<BoxWriter> {
        Err(Error::Unsupported(format!(
            "{} backend cannot append to {}",
            self.protocol(),
            path
        )))
    }

    /// Check if a path exists.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// List direct children of a directory. A file lists as itself.
    ///
    /// # Errors
    /// - Path not found
    async fn list(&self, path: &str) -> Result<Vec<Metadata>>;

    /// Get metadata for a path.
    ///
    /// # Errors
    /// - Path not found
    async fn info(&self, path: &str) -> Result<Metadata>;

    /// Delete a file, or a directory.
    ///
    /// # Errors
    /// - Path not found
    /// - Directory not empty and `recursive` is false
    async fn remove(&self, path: &str, recursive: bool) -> Result<()>;

    /// Create a directory including parents.
    ///
    /// # Errors
    /// - Directory exists and `exist_ok` is false
    /// - A file occupies the path
    async fn makedirs(&self, path: &str, exist_ok: bool) -> Result<()>;

    /// Every file under `path`, recursively. A file finds itself.
    async fn find(&self, path: &str) -> Result<Vec<Metadata>> {
        transfer::walk(self, path).await
    }

    /// Copy a local file (or tree, with `recursive`) into the backend.
    async fn put(&self, local: &Path, remote: &str, recursive: bool) -> Result<()> {
        transfer::put(self, local, remote, recursive).await
    }

    /// Copy a backend file (or tree, with `recursive`) to the local filesystem.
    async fn get(&self, remote: &str, local: &Path, recursive: bool) -> Result<()> {
        transfer::get(self, remote, local, recursive).await
    }

    /// Native copy capability, if the backend can copy without streaming
    /// data through the caller.
    fn as_native_copy(&self) -> Option<&dyn NativeCopy> {
        None
    }

    /// Native glob capability.
    fn as_native_glob(&self) -> Option<&dyn NativeGlob> {
        None
    }
}

/// Copy within a single backend handle.
#[async_trait]
pub trait NativeCopy: Send + Sync {
    /// Copy `src` to `dst`. Directories require `recursive`.
    async fn copy(&self, src: &str, dst: &str, recursive: bool) -> Result<()>;
}

/// Pattern listing performed by the backend itself.
///
/// `*` and `?` do not match `/`; `**` matches across directories.
#[async_trait]
pub trait NativeGlob: Send + Sync {
    /// Entries whose path matches `pattern`.
    async fn glob(&self, pattern: &str) -> Result<Vec<Metadata>>;
}

impl fmt::Debug for dyn Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Backend(protocol={}, kind={})", self.protocol(), self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_serialization() {
        let metadata = Metadata::file("/bucket/test-file.txt", 1024, Some(Utc::now()))
            .with_etag("abc123");

        let json = serde_json::to_string(&metadata).unwrap();
        let deserialized: Metadata = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized, metadata);
        assert_eq!(deserialized.base_name(), "test-file.txt");
    }

    #[test]
    fn test_directory_metadata() {
        let metadata = Metadata::directory("bucket/prefix/", None);
        assert!(metadata.is_directory);
        assert!(metadata.size.is_none());
        assert_eq!(metadata.base_name(), "prefix");
    }

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::ObjectStore.to_string(), "object-store");
        assert_eq!(BackendKind::InMemory.to_string(), "in-memory");
    }
}
