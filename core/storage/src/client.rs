//! Storage client: alias resolution and operation dispatch.
//!
//! Every operation takes an `alias://relative/path` location, maps the alias
//! to its configured base location, and runs against the backend handle
//! that location resolves to.

use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use storagekit_common::{Error, OptionMap, Result};
use storagekit_config::{load_from_env, StorageConfig, ALIAS_SEPARATOR, DEFAULT_CONFIG_ENV};

use crate::backend::{Backend, Metadata};
use crate::file::{OpenMode, StorageFile};
use crate::pattern;
use crate::registry::{create_default_registry, BackendRegistry};
use crate::resolver::BackendResolver;
use crate::transfer;
use crate::uri;

/// Physical location and options an alias URI resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub physical_uri: String,
    pub options: OptionMap,
}

/// Result of `list` and `glob`: bare names, or full metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum Listing {
    Names(Vec<String>),
    Detailed(Vec<Metadata>),
}

impl Listing {
    fn from_entries(entries: Vec<Metadata>, detail: bool) -> Self {
        if detail {
            Listing::Detailed(entries)
        } else {
            Listing::Names(entries.into_iter().map(|m| m.name).collect())
        }
    }

    /// Entry names, whatever the detail level.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Listing::Names(names) => names.iter().map(String::as_str).collect(),
            Listing::Detailed(entries) => entries.iter().map(|m| m.name.as_str()).collect(),
        }
    }

    pub fn into_names(self) -> Vec<String> {
        match self {
            Listing::Names(names) => names,
            Listing::Detailed(entries) => entries.into_iter().map(|m| m.name).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Listing::Names(names) => names.len(),
            Listing::Detailed(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Facade over every configured provider.
///
/// Owns the backend handle cache; handles live as long as the client.
/// Share it across tasks with `Arc`.
pub struct StorageClient {
    config: Arc<StorageConfig>,
    resolver: BackendResolver,
}

impl StorageClient {
    /// Create a client over the built-in backends.
    pub fn new(config: StorageConfig) -> Self {
        Self::with_registry(config, create_default_registry())
    }

    /// Create a client whose backends come from `registry`.
    pub fn with_registry(config: StorageConfig, registry: BackendRegistry) -> Self {
        Self {
            config: Arc::new(config),
            resolver: BackendResolver::new(registry),
        }
    }

    /// Load configuration from the file named by `STORAGEKIT_CONFIG`.
    pub fn from_env() -> Result<Self> {
        Self::from_env_var(DEFAULT_CONFIG_ENV)
    }

    /// Load configuration from the file named by `env_var`.
    pub fn from_env_var(env_var: &str) -> Result<Self> {
        Ok(Self::new(load_from_env(env_var)?))
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Number of backend handles built so far.
    pub fn handle_count(&self) -> usize {
        self.resolver.handle_count()
    }

    /// Translate an alias URI into its physical location.
    ///
    /// # Errors
    /// - `InvalidUri` when `uri` has no `alias://` prefix
    /// - `UnknownProvider` when the alias is not configured
    pub fn resolve(&self, uri: &str) -> Result<ResolvedLocation> {
        let (alias, rel) = uri.split_once(ALIAS_SEPARATOR).ok_or_else(|| {
            Error::InvalidUri(format!(
                "URI must start with a provider alias, like alias://path: {}",
                uri
            ))
        })?;

        let provider = self
            .config
            .provider(alias)
            .ok_or_else(|| Error::UnknownProvider {
                alias: alias.to_string(),
                known: self.config.aliases(),
            })?;

        let physical_uri = uri::join(provider.base_uri(), rel);
        debug!("Resolved {} -> {}", uri, physical_uri);

        Ok(ResolvedLocation {
            physical_uri,
            options: provider.options().clone(),
        })
    }

    /// Backend handle and backend path for an alias URI.
    pub fn backend_for(&self, uri: &str) -> Result<(Arc<dyn Backend>, String)> {
        let location = self.resolve(uri)?;
        self.resolver.resolve(&location.physical_uri, &location.options)
    }

    fn backend_with_options(
        &self,
        uri: &str,
        extra: &OptionMap,
    ) -> Result<(Arc<dyn Backend>, String)> {
        let mut location = self.resolve(uri)?;
        location
            .options
            .extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.resolver.resolve(&location.physical_uri, &location.options)
    }

    /// Open a file as a byte stream.
    pub async fn open(&self, uri: &str, mode: OpenMode) -> Result<StorageFile> {
        self.open_with_options(uri, mode, &OptionMap::new()).await
    }

    /// Open a file, overriding provider options for this call.
    ///
    /// Differing options select (or build) a different backend handle.
    pub async fn open_with_options(
        &self,
        uri: &str,
        mode: OpenMode,
        extra: &OptionMap,
    ) -> Result<StorageFile> {
        let (backend, path) = self.backend_with_options(uri, extra)?;
        let file = match mode {
            OpenMode::Read => StorageFile::reader(uri.to_string(), backend.open_read(&path).await?),
            OpenMode::Write => {
                StorageFile::writer(uri.to_string(), mode, backend.open_write(&path).await?)
            }
            OpenMode::Append => {
                StorageFile::writer(uri.to_string(), mode, backend.open_append(&path).await?)
            }
        };
        Ok(file)
    }

    /// Read a whole object.
    pub async fn read(&self, uri: &str) -> Result<Vec<u8>> {
        let mut file = self.open(uri, OpenMode::Read).await?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).await?;
        Ok(data)
    }

    /// Replace an object's content.
    pub async fn write(&self, uri: &str, data: &[u8]) -> Result<()> {
        let mut file = self.open(uri, OpenMode::Write).await?;
        file.write_all(data).await?;
        file.shutdown().await?;
        Ok(())
    }

    /// Copy a local file, or a tree with `recursive`, to `dest_uri`.
    pub async fn upload(&self, local: &Path, dest_uri: &str, recursive: bool) -> Result<()> {
        let (backend, path) = self.backend_for(dest_uri)?;
        backend.put(local, &path, recursive).await?;
        info!("Uploaded {} -> {}", local.display(), dest_uri);
        Ok(())
    }

    /// Copy `src_uri`, or a tree with `recursive`, to a local path.
    pub async fn download(&self, src_uri: &str, local: &Path, recursive: bool) -> Result<()> {
        let (backend, path) = self.backend_for(src_uri)?;
        backend.get(&path, local, recursive).await?;
        info!("Downloaded {} -> {}", src_uri, local.display());
        Ok(())
    }

    /// Copy between any two locations.
    ///
    /// Locations on the same handle use the backend's native copy when it
    /// has one. Everything else is streamed in
    /// [`COPY_CHUNK_SIZE`](crate::transfer::COPY_CHUNK_SIZE) chunks.
    pub async fn copy(&self, src_uri: &str, dst_uri: &str, recursive: bool) -> Result<()> {
        let (src_backend, src_path) = self.backend_for(src_uri)?;
        let (dst_backend, dst_path) = self.backend_for(dst_uri)?;

        if Arc::ptr_eq(&src_backend, &dst_backend) {
            if let Some(native) = src_backend.as_native_copy() {
                debug!("Native {} copy {} -> {}", src_backend.protocol(), src_path, dst_path);
                native.copy(&src_path, &dst_path, recursive).await?;
                info!("Copied {} -> {}", src_uri, dst_uri);
                return Ok(());
            }
        }

        let source = src_backend.info(&src_path).await?;
        if !source.is_directory {
            let bytes =
                stream_file(src_backend.as_ref(), &src_path, dst_backend.as_ref(), &dst_path)
                    .await?;
            info!("Copied {} -> {} ({} bytes)", src_uri, dst_uri, bytes);
            return Ok(());
        }

        if !recursive {
            return Err(Error::InvalidInput(format!(
                "{} is a directory; copy it with recursive",
                src_uri
            )));
        }

        let mut total = 0u64;
        let files = src_backend.find(&src_path).await?;
        for entry in &files {
            let target = uri::join_path(&dst_path, uri::relative_path(&src_path, &entry.name));
            total +=
                stream_file(src_backend.as_ref(), &entry.name, dst_backend.as_ref(), &target)
                    .await?;
        }
        info!(
            "Copied {} -> {} ({} files, {} bytes)",
            src_uri,
            dst_uri,
            files.len(),
            total
        );
        Ok(())
    }

    pub async fn exists(&self, uri: &str) -> Result<bool> {
        let (backend, path) = self.backend_for(uri)?;
        backend.exists(&path).await
    }

    /// Direct children of a directory; a file lists as itself.
    pub async fn list(&self, uri: &str, detail: bool) -> Result<Listing> {
        let (backend, path) = self.backend_for(uri)?;
        let entries = backend.list(&path).await?;
        Ok(Listing::from_entries(entries, detail))
    }

    /// Entries matching a wildcard location such as `data://logs/*.csv`.
    pub async fn glob(&self, pattern_uri: &str, detail: bool) -> Result<Listing> {
        let (backend, path) = self.backend_for(pattern_uri)?;
        let entries = match backend.as_native_glob() {
            Some(native) => native.glob(&path).await?,
            None => {
                debug!("{} has no native glob, walking {}", backend.protocol(), path);
                pattern::glob_by_walking(backend.as_ref(), &path).await?
            }
        };
        Ok(Listing::from_entries(entries, detail))
    }

    pub async fn info(&self, uri: &str) -> Result<Metadata> {
        let (backend, path) = self.backend_for(uri)?;
        backend.info(&path).await
    }

    /// Delete a file, or a directory tree with `recursive`.
    pub async fn remove(&self, uri: &str, recursive: bool) -> Result<()> {
        let (backend, path) = self.backend_for(uri)?;
        backend.remove(&path, recursive).await?;
        debug!("Removed {}", uri);
        Ok(())
    }

    pub async fn makedirs(&self, uri: &str, exist_ok: bool) -> Result<()> {
        let (backend, path) = self.backend_for(uri)?;
        backend.makedirs(&path, exist_ok).await
    }
}

/// Stream one file between backends.
///
/// A failed transfer removes whatever reached the destination.
async fn stream_file(
    src: &dyn Backend,
    src_path: &str,
    dst: &dyn Backend,
    dst_path: &str,
) -> Result<u64> {
    let mut reader = src.open_read(src_path).await?;
    let mut writer = dst.open_write(dst_path).await?;

    match transfer::stream_copy(&mut reader, &mut writer).await {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            drop(writer);
            discard_partial(dst, dst_path).await;
            Err(e)
        }
    }
}

async fn discard_partial(backend: &dyn Backend, path: &str) {
    match backend.remove(path, false).await {
        Ok(()) => debug!("Removed partial copy at {}", path),
        Err(e) if e.is_not_found() => {}
        Err(e) => warn!("Failed to remove partial copy at {}: {}", path, e),
    }
}
