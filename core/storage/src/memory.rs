//! In-memory storage backend.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;
use uuid::Uuid;

use storagekit_common::{Error, Result};

use crate::backend::{Backend, BackendKind, BoxReader, BoxWriter, Metadata, NativeCopy, NativeGlob};
use crate::pattern;
use crate::uri;

/// In-memory storage entry.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, metadata: Metadata },
    Directory { metadata: Metadata },
}

impl Entry {
    fn metadata(&self) -> &Metadata {
        match self {
            Entry::File { metadata, .. } => metadata,
            Entry::Directory { metadata } => metadata,
        }
    }
}

type Tree = BTreeMap<String, Entry>;

/// In-memory storage backend.
///
/// Paths are `/`-rooted (`memory://bucket/a.txt` is `/bucket/a.txt`).
/// Writing a file creates its parent directories. Each handle owns its own
/// tree; all data is lost when the handle is dropped.
pub struct MemoryBackend {
    tree: Arc<RwLock<Tree>>,
}

impl MemoryBackend {
    /// Create a new empty memory backend.
    pub fn new() -> Self {
        let mut tree = Tree::new();
        tree.insert("/".to_string(), Entry::Directory { metadata: dir_metadata("/") });
        Self {
            tree: Arc::new(RwLock::new(tree)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Tree> {
        self.tree.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tree> {
        self.tree.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize to a `/`-rooted key without a trailing slash.
fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn child_prefix(key: &str) -> String {
    if key == "/" {
        "/".to_string()
    } else {
        format!("{}/", key)
    }
}

fn dir_metadata(key: &str) -> Metadata {
    Metadata::directory(key, Some(Utc::now())).with_etag(Uuid::new_v4().to_string())
}

fn file_metadata(key: &str, size: usize) -> Metadata {
    Metadata::file(key, size as u64, Some(Utc::now())).with_etag(Uuid::new_v4().to_string())
}

/// Create any missing ancestors of `key`.
fn ensure_parents(tree: &mut Tree, key: &str) -> Result<()> {
    let mut ancestors = Vec::new();
    let mut current = uri::parent_path(key);
    while let Some(parent) = current {
        ancestors.push(parent.to_string());
        current = uri::parent_path(parent);
    }

    for ancestor in ancestors.into_iter().rev() {
        match tree.get(&ancestor) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => {
                return Err(Error::InvalidInput(format!("Parent is a file: {}", ancestor)));
            }
            None => {
                let metadata = dir_metadata(&ancestor);
                tree.insert(ancestor, Entry::Directory { metadata });
            }
        }
    }
    Ok(())
}

fn store_file(tree: &mut Tree, key: &str, data: Vec<u8>) -> Result<()> {
    if let Some(Entry::Directory { .. }) = tree.get(key) {
        return Err(Error::InvalidInput(format!("Is a directory: {}", key)));
    }
    ensure_parents(tree, key)?;
    let metadata = file_metadata(key, data.len());
    tree.insert(key.to_string(), Entry::File { data, metadata });
    Ok(())
}

/// Keys strictly below `key`.
fn descendants(tree: &Tree, key: &str) -> Vec<String> {
    let prefix = child_prefix(key);
    tree.range(prefix.clone()..)
        .take_while(|(k, _)| k.starts_with(&prefix))
        .filter(|(k, _)| k.as_str() != key)
        .map(|(k, _)| k.clone())
        .collect()
}

/// Buffers writes and commits them to the tree on shutdown.
struct MemoryWriter {
    tree: Arc<RwLock<Tree>>,
    key: String,
    buf: Vec<u8>,
    committed: bool,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        if this.committed {
            return Poll::Ready(Err(std::io::Error::other("writer already closed")));
        }
        this.buf.extend_from_slice(data);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if this.committed {
            return Poll::Ready(Ok(()));
        }

        let data = std::mem::take(&mut this.buf);
        let mut tree = this.tree.write().unwrap_or_else(PoisonError::into_inner);
        let result = store_file(&mut tree, &this.key, data).map_err(std::io::Error::other);
        this.committed = true;
        Poll::Ready(result)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn protocol(&self) -> &str {
        "memory"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::InMemory
    }

    fn path_from_uri(&self, uri: &str) -> String {
        normalize(uri::strip_protocol(uri))
    }

    async fn open_read(&self, path: &str) -> Result<BoxReader> {
        let key = normalize(path);
        match self.read().get(&key) {
            Some(Entry::File { data, .. }) => Ok(Box::pin(Cursor::new(data.clone()))),
            Some(Entry::Directory { .. }) => {
                Err(Error::InvalidInput(format!("Cannot read directory: {}", key)))
            }
            None => Err(Error::NotFound(key)),
        }
    }

    async fn open_write(&self, path: &str) -> Result<BoxWriter> {
        let key = normalize(path);
        if let Some(Entry::Directory { .. }) = self.read().get(&key) {
            return Err(Error::InvalidInput(format!("Is a directory: {}", key)));
        }
        Ok(Box::pin(MemoryWriter {
            tree: Arc::clone(&self.tree),
            key,
            buf: Vec::new(),
            committed: false,
        }))
    }

    async fn open_append(&self, path: &str) -> Result<BoxWriter> {
        let key = normalize(path);
        let buf = match self.read().get(&key) {
            Some(Entry::File { data, .. }) => data.clone(),
            Some(Entry::Directory { .. }) => {
                return Err(Error::InvalidInput(format!("Is a directory: {}", key)));
            }
            None => Vec::new(),
        };
        Ok(Box::pin(MemoryWriter {
            tree: Arc::clone(&self.tree),
            key,
            buf,
            committed: false,
        }))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.read().contains_key(&normalize(path)))
    }

    async fn list(&self, path: &str) -> Result<Vec<Metadata>> {
        let key = normalize(path);
        let tree = self.read();

        match tree.get(&key) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { metadata, .. }) => return Ok(vec![metadata.clone()]),
            None => return Err(Error::NotFound(key)),
        }

        let prefix = child_prefix(&key);
        let results = descendants(&tree, &key)
            .into_iter()
            .filter(|k| !k[prefix.len()..].contains('/'))
            .filter_map(|k| tree.get(&k).map(|e| e.metadata().clone()))
            .collect();

        Ok(results)
    }

    async fn info(&self, path: &str) -> Result<Metadata> {
        let key = normalize(path);
        self.read()
            .get(&key)
            .map(|e| e.metadata().clone())
            .ok_or(Error::NotFound(key))
    }

    async fn remove(&self, path: &str, recursive: bool) -> Result<()> {
        let key = normalize(path);
        let mut tree = self.write();

        match tree.get(&key) {
            Some(Entry::File { .. }) => {
                tree.remove(&key);
                Ok(())
            }
            Some(Entry::Directory { .. }) => {
                let children = descendants(&tree, &key);
                if !children.is_empty() && !recursive {
                    return Err(Error::NotEmpty(key));
                }
                for child in children {
                    tree.remove(&child);
                }
                // The root always exists
                if key != "/" {
                    tree.remove(&key);
                }
                Ok(())
            }
            None => Err(Error::NotFound(key)),
        }
    }

    async fn makedirs(&self, path: &str, exist_ok: bool) -> Result<()> {
        let key = normalize(path);
        let mut tree = self.write();

        match tree.get(&key) {
            Some(Entry::Directory { .. }) if exist_ok => Ok(()),
            Some(_) => Err(Error::AlreadyExists(key)),
            None => {
                ensure_parents(&mut tree, &key)?;
                let metadata = dir_metadata(&key);
                tree.insert(key, Entry::Directory { metadata });
                Ok(())
            }
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
impl NativeCopy for MemoryBackend {
    async fn copy(&self, src: &str, dst: &str, recursive: bool) -> Result<()> {
        let src_key = normalize(src);
        let dst_key = normalize(dst);
        let mut tree = self.write();

        match tree.get(&src_key).cloned() {
            Some(Entry::File { data, .. }) => store_file(&mut tree, &dst_key, data),
            Some(Entry::Directory { .. }) => {
                if !recursive {
                    return Err(Error::InvalidInput(format!(
                        "{} is a directory; copy it with recursive",
                        src_key
                    )));
                }
                if dst_key.starts_with(&child_prefix(&src_key)) {
                    return Err(Error::InvalidInput(format!(
                        "Cannot copy {} into itself ({})",
                        src_key, dst_key
                    )));
                }

                ensure_parents(&mut tree, &dst_key)?;
                if !tree.contains_key(&dst_key) {
                    let metadata = dir_metadata(&dst_key);
                    tree.insert(dst_key.clone(), Entry::Directory { metadata });
                }

                for child in descendants(&tree, &src_key) {
                    let target = uri::join_path(&dst_key, uri::relative_path(&src_key, &child));
                    match tree.get(&child).cloned() {
                        Some(Entry::File { data, .. }) => store_file(&mut tree, &target, data)?,
                        Some(Entry::Directory { .. }) => {
                            ensure_parents(&mut tree, &target)?;
                            if !tree.contains_key(&target) {
                                let metadata = dir_metadata(&target);
                                tree.insert(target, Entry::Directory { metadata });
                            }
                        }
                        None => {}
                    }
                }
                Ok(())
            }
            None => Err(Error::NotFound(src_key)),
        }
    }
}

#[async_trait]
impl NativeGlob for MemoryBackend {
    async fn glob(&self, expr: &str) -> Result<Vec<Metadata>> {
        let key = normalize(expr);
        let compiled = pattern::compile(&key)?;
        let options = pattern::match_options();

        Ok(self
            .read()
            .iter()
            .filter(|(k, _)| k.as_str() != "/" && compiled.matches_with(k, options))
            .map(|(_, e)| e.metadata().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn write(backend: &MemoryBackend, path: &str, data: &[u8]) {
        let mut writer = backend.open_write(path).await.unwrap();
        writer.write_all(data).await.unwrap();
        writer.shutdown().await.unwrap();
    }

    async fn read(backend: &MemoryBackend, path: &str) -> Vec<u8> {
        let mut reader = backend.open_read(path).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_write_read() {
        let backend = MemoryBackend::new();
        write(&backend, "/bucket/test.txt", b"Hello, World!").await;

        assert_eq!(read(&backend, "/bucket/test.txt").await, b"Hello, World!");
        assert!(backend.info("/bucket").await.unwrap().is_directory);
    }

    #[tokio::test]
    async fn test_writer_dropped_without_shutdown_commits_nothing() {
        let backend = MemoryBackend::new();
        let mut writer = backend.open_write("/partial.bin").await.unwrap();
        writer.write_all(b"half").await.unwrap();
        drop(writer);

        assert!(!backend.exists("/partial.bin").await.unwrap());
    }

    #[tokio::test]
    async fn test_append() {
        let backend = MemoryBackend::new();
        write(&backend, "/log.txt", b"one,").await;

        let mut writer = backend.open_append("/log.txt").await.unwrap();
        writer.write_all(b"two").await.unwrap();
        writer.shutdown().await.unwrap();

        assert_eq!(read(&backend, "/log.txt").await, b"one,two");
    }

    #[tokio::test]
    async fn test_path_from_uri() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.path_from_uri("memory://bucket/a.txt"), "/bucket/a.txt");
        assert_eq!(backend.path_from_uri("memory://"), "/");
    }

    #[tokio::test]
    async fn test_list_direct_children() {
        let backend = MemoryBackend::new();
        write(&backend, "/dir/file1.txt", &[1]).await;
        write(&backend, "/dir/file2.txt", &[2]).await;
        write(&backend, "/dir/sub/deep.txt", &[3]).await;

        let names: Vec<String> = backend
            .list("/dir")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["/dir/file1.txt", "/dir/file2.txt", "/dir/sub"]);

        assert!(matches!(backend.list("/absent").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_non_empty_requires_recursive() {
        let backend = MemoryBackend::new();
        write(&backend, "/dir/a.txt", b"a").await;

        assert!(matches!(backend.remove("/dir", false).await, Err(Error::NotEmpty(_))));
        backend.remove("/dir", true).await.unwrap();
        assert!(!backend.exists("/dir").await.unwrap());
        assert!(!backend.exists("/dir/a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_makedirs_exist_ok() {
        let backend = MemoryBackend::new();
        backend.makedirs("/a/b/c", false).await.unwrap();
        assert!(backend.info("/a/b").await.unwrap().is_directory);

        backend.makedirs("/a/b/c", true).await.unwrap();
        assert!(matches!(
            backend.makedirs("/a/b/c", false).await,
            Err(Error::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_native_copy_tree() {
        let backend = MemoryBackend::new();
        write(&backend, "/src/a.txt", b"a").await;
        write(&backend, "/src/nested/b.txt", b"b").await;

        assert!(backend.copy("/src", "/dst", false).await.is_err());
        backend.copy("/src", "/dst", true).await.unwrap();

        assert_eq!(read(&backend, "/dst/a.txt").await, b"a");
        assert_eq!(read(&backend, "/dst/nested/b.txt").await, b"b");
        assert_eq!(read(&backend, "/src/a.txt").await, b"a");
    }

    #[tokio::test]
    async fn test_native_glob() {
        let backend = MemoryBackend::new();
        write(&backend, "/data/a.csv", b"1").await;
        write(&backend, "/data/b.json", b"2").await;
        write(&backend, "/data/deep/c.csv", b"3").await;

        let names: Vec<String> = backend
            .glob("/data/*.csv")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["/data/a.csv"]);

        let nested = backend.glob("/data/*/*.csv").await.unwrap();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].name, "/data/deep/c.csv");
    }
}
