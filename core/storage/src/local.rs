//! Local filesystem storage backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;

use storagekit_common::{Error, OptionMap, Result};

use crate::backend::{Backend, BackendKind, BoxReader, BoxWriter, Metadata, NativeCopy, NativeGlob};
use crate::pattern;
use crate::transfer;
use crate::uri;

/// Local filesystem storage backend.
///
/// Paths are absolute filesystem paths (`file:///srv/data/a.txt` is
/// `/srv/data/a.txt`).
///
/// Options:
/// - `auto_mkdir` (bool, default true): create parent directories when a
///   file is opened for writing.
pub struct LocalBackend {
    protocol: String,
    auto_mkdir: bool,
}

impl LocalBackend {
    /// Create a local backend with default options.
    pub fn new() -> Self {
        Self {
            protocol: "file".to_string(),
            auto_mkdir: true,
        }
    }

    /// Create a local backend from connection options.
    ///
    /// # Errors
    /// - `auto_mkdir` is present but not a boolean
    pub fn from_options(protocol: &str, options: &OptionMap) -> Result<Self> {
        let auto_mkdir = match options.get("auto_mkdir") {
            None => true,
            Some(value) => value.as_bool().ok_or_else(|| {
                Error::InvalidInput(format!("auto_mkdir must be a boolean, got {}", value))
            })?,
        };
        Ok(Self {
            protocol: protocol.to_string(),
            auto_mkdir,
        })
    }

    /// Create metadata from filesystem metadata.
    fn create_metadata(path: &Path, fs_meta: &std::fs::Metadata) -> Metadata {
        let modified: Option<DateTime<Utc>> = fs_meta.modified().ok().map(|t| t.into());
        let name = path.to_string_lossy().into_owned();

        if fs_meta.is_dir() {
            Metadata::directory(name, modified)
        } else {
            let etag = format!(
                "{}-{}",
                modified.map(|m| m.timestamp()).unwrap_or_default(),
                fs_meta.len()
            );
            Metadata::file(name, fs_meta.len(), modified).with_etag(etag)
        }
    }

    async fn stat(path: &str) -> Result<std::fs::Metadata> {
        fs::metadata(path).await.map_err(|e| Error::from_io(path, e))
    }

    async fn prepare_parent(&self, path: &str) -> Result<()> {
        if !self.auto_mkdir {
            return Ok(());
        }
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::from_io(&parent.display().to_string(), e))?;
            }
        }
        Ok(())
    }

    async fn copy_file(from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(from, to)
            .await
            .map_err(|e| Error::from_io(&from.display().to_string(), e))?;
        Ok(())
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn kind(&self) -> BackendKind {
        BackendKind::LocalDisk
    }

    async fn open_read(&self, path: &str) -> Result<BoxReader> {
        if Self::stat(path).await?.is_dir() {
            return Err(Error::InvalidInput(format!("Cannot read directory: {}", path)));
        }
        let file = fs::File::open(path)
            .await
            .map_err(|e| Error::from_io(path, e))?;
        Ok(Box::pin(file))
    }

    async fn open_write(&self, path: &str) -> Result<BoxWriter> {
        self.prepare_parent(path).await?;
        let file = fs::File::create(path)
            .await
            .map_err(|e| Error::from_io(path, e))?;
        Ok(Box::pin(file))
    }

    async fn open_append(&self, path: &str) -> Result<BoxWriter> {
        self.prepare_parent(path).await?;
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| Error::from_io(path, e))?;
        Ok(Box::pin(file))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        fs::try_exists(path)
            .await
            .map_err(|e| Error::from_io(path, e))
    }

    async fn list(&self, path: &str) -> Result<Vec<Metadata>> {
        let fs_meta = Self::stat(path).await?;
        if !fs_meta.is_dir() {
            return Ok(vec![Self::create_metadata(Path::new(path), &fs_meta)]);
        }

        let mut results = Vec::new();
        let mut entries = fs::read_dir(path)
            .await
            .map_err(|e| Error::from_io(path, e))?;

        while let Some(entry) = entries.next_entry().await? {
            let entry_path = entry.path();
            let fs_meta = entry.metadata().await?;
            results.push(Self::create_metadata(&entry_path, &fs_meta));
        }

        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    async fn info(&self, path: &str) -> Result<Metadata> {
        let fs_meta = Self::stat(path).await?;
        Ok(Self::create_metadata(Path::new(path), &fs_meta))
    }

    async fn remove(&self, path: &str, recursive: bool) -> Result<()> {
        let fs_meta = Self::stat(path).await?;

        if !fs_meta.is_dir() {
            return fs::remove_file(path)
                .await
                .map_err(|e| Error::from_io(path, e));
        }

        if recursive {
            return fs::remove_dir_all(path)
                .await
                .map_err(|e| Error::from_io(path, e));
        }

        let mut entries = fs::read_dir(path)
            .await
            .map_err(|e| Error::from_io(path, e))?;
        if entries.next_entry().await?.is_some() {
            return Err(Error::NotEmpty(path.to_string()));
        }

        fs::remove_dir(path)
            .await
            .map_err(|e| Error::from_io(path, e))
    }

    async fn makedirs(&self, path: &str, exist_ok: bool) -> Result<()> {
        match fs::metadata(path).await {
            Ok(meta) if meta.is_dir() && exist_ok => Ok(()),
            Ok(_) => Err(Error::AlreadyExists(path.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => fs::create_dir_all(path)
                .await
                .map_err(|e| Error::from_io(path, e)),
            Err(e) => Err(Error::from_io(path, e)),
        }
    }

    fn as_native_copy(&self) -> Option<&dyn NativeCopy> {
        Some(self)
    }

    fn as_native_glob(&self) -> Option<&dyn NativeGlob> {
        Some(self)
    }
}

#[async_trait]
impl NativeCopy for LocalBackend {
    async fn copy(&self, src: &str, dst: &str, recursive: bool) -> Result<()> {
        let src_meta = Self::stat(src).await?;
        let from = Path::new(src);
        let to = Path::new(dst);

        if !src_meta.is_dir() {
            return Self::copy_file(from, to).await;
        }

        if !recursive {
            return Err(Error::InvalidInput(format!(
                "{} is a directory; copy it with recursive",
                src
            )));
        }
        if to.starts_with(from) {
            return Err(Error::InvalidInput(format!(
                "Cannot copy {} into itself ({})",
                src, dst
            )));
        }

        let (dirs, files) = transfer::local_tree(from).await?;
        fs::create_dir_all(to).await?;
        for dir in dirs {
            fs::create_dir_all(to.join(transfer::local_relative(from, &dir))).await?;
        }
        for file in files {
            Self::copy_file(&file, &to.join(transfer::local_relative(from, &file))).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl NativeGlob for LocalBackend {
    async fn glob(&self, expr: &str) -> Result<Vec<Metadata>> {
        let expr = expr.to_string();
        let options = pattern::match_options();

        let paths: Vec<PathBuf> = tokio::task::spawn_blocking(move || {
            let matches = glob::glob_with(&expr, options).map_err(|e| {
                Error::InvalidInput(format!("Invalid glob pattern {}: {}", expr, e))
            })?;
            // Entries that vanish or cannot be read mid-walk are skipped
            Ok::<_, Error>(matches.filter_map(|entry| entry.ok()).collect())
        })
        .await
        .map_err(|e| Error::Storage(format!("glob task failed: {}", e)))??;

        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            if let Ok(fs_meta) = fs::metadata(&path).await {
                results.push(Self::create_metadata(&path, &fs_meta));
            }
        }
        Ok(results)
    }
}

/// Convert a location into a local path, accepting `file://` URIs.
pub fn local_path_from_uri(location: &str) -> PathBuf {
    PathBuf::from(uri::strip_protocol(location))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn path_in(temp: &TempDir, rel: &str) -> String {
        temp.path().join(rel).to_string_lossy().into_owned()
    }

    async fn write(backend: &LocalBackend, path: &str, data: &[u8]) {
        let mut writer = backend.open_write(path).await.unwrap();
        writer.write_all(data).await.unwrap();
        writer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_local_write_read() {
        let temp = TempDir::new().unwrap();
        let backend = LocalBackend::new();
        let path = path_in(&temp, "nested/test.txt");

        write(&backend, &path, b"Hello, Local!").await;

        let mut reader = backend.open_read(&path).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"Hello, Local!");
    }

    #[tokio::test]
    async fn test_local_auto_mkdir_disabled() {
        let temp = TempDir::new().unwrap();
        let mut options = OptionMap::new();
        options.insert("auto_mkdir".to_string(), false.into());
        let backend = LocalBackend::from_options("file", &options).unwrap();

        let result = backend.open_write(&path_in(&temp, "missing/x.txt")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_local_list_and_info() {
        let temp = TempDir::new().unwrap();
        let backend = LocalBackend::new();
        let dir = path_in(&temp, "dir");

        backend.makedirs(&dir, false).await.unwrap();
        write(&backend, &path_in(&temp, "dir/file1.txt"), &[1]).await;
        write(&backend, &path_in(&temp, "dir/file2.txt"), &[2, 2]).await;

        let contents = backend.list(&dir).await.unwrap();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[1].base_name(), "file2.txt");
        assert_eq!(contents[1].size, Some(2));

        assert!(backend.info(&dir).await.unwrap().is_directory);
        assert!(matches!(
            backend.info(&path_in(&temp, "absent")).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_local_remove_and_makedirs() {
        let temp = TempDir::new().unwrap();
        let backend = LocalBackend::new();
        let dir = path_in(&temp, "a/b");

        backend.makedirs(&dir, true).await.unwrap();
        assert!(matches!(
            backend.makedirs(&dir, false).await,
            Err(Error::AlreadyExists(_))
        ));

        write(&backend, &path_in(&temp, "a/b/c.txt"), b"c").await;
        assert!(matches!(
            backend.remove(&dir, false).await,
            Err(Error::NotEmpty(_))
        ));
        backend.remove(&dir, true).await.unwrap();
        assert!(!backend.exists(&dir).await.unwrap());
    }

    #[tokio::test]
    async fn test_local_native_copy_tree_and_glob() {
        let temp = TempDir::new().unwrap();
        let backend = LocalBackend::new();
        write(&backend, &path_in(&temp, "src/a.csv"), b"a").await;
        write(&backend, &path_in(&temp, "src/deep/b.csv"), b"b").await;

        backend
            .copy(&path_in(&temp, "src"), &path_in(&temp, "dst"), true)
            .await
            .unwrap();
        assert!(backend.exists(&path_in(&temp, "dst/deep/b.csv")).await.unwrap());

        let matches = backend.glob(&path_in(&temp, "dst/*.csv")).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].base_name(), "a.csv");
    }

    #[test]
    fn test_local_path_from_uri() {
        assert_eq!(local_path_from_uri("file:///tmp/x"), PathBuf::from("/tmp/x"));
        assert_eq!(local_path_from_uri("/tmp/y"), PathBuf::from("/tmp/y"));
    }
}
