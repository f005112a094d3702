//! Object store backend (S3, GCS, Azure Blob, HTTP).
//!
//! Backend paths have the form `bucket/key`. The first segment picks the
//! bucket (container, or host for HTTP) and each bucket gets its own
//! `object_store` client, built lazily from the handle's options.
//! Directories do not exist as objects: a path is a directory when at least
//! one object lives under its prefix.

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::buffered::{BufReader, BufWriter};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;
use url::Url;

use storagekit_common::{Error, OptionMap, Result};

use crate::backend::{Backend, BackendKind, BoxReader, BoxWriter, Metadata, NativeCopy};
use crate::transfer;
use crate::uri;

/// Protocols served by [`ObjectStoreBackend`].
pub const OBJECT_PROTOCOLS: &[&str] = &[
    "s3", "s3a", "gs", "gcs", "az", "abfs", "abfss", "azure", "adl", "http", "https",
];

pub struct ObjectStoreBackend {
    protocol: String,
    options: Vec<(String, String)>,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl ObjectStoreBackend {
    /// Create a backend for `protocol`.
    ///
    /// Options are passed through to the `object_store` builders as strings
    /// (`aws_access_key_id`, `region`, `endpoint`, `google_service_account`,
    /// ...). Keys the builders do not recognize are ignored.
    ///
    /// # Errors
    /// - Unknown protocol
    /// - An option value is a sequence or mapping
    pub fn new(protocol: &str, options: &OptionMap) -> Result<Self> {
        if !OBJECT_PROTOCOLS.contains(&protocol) {
            return Err(Error::Unsupported(format!(
                "'{}' is not an object store protocol",
                protocol
            )));
        }

        let mut pairs = Vec::with_capacity(options.len());
        for (key, value) in options {
            if !value.is_scalar() {
                return Err(Error::InvalidInput(format!(
                    "Object store option '{}' must be a scalar, got {}",
                    key, value
                )));
            }
            pairs.push((key.clone(), value.to_plain_string()));
        }

        Ok(Self {
            protocol: protocol.to_string(),
            options: pairs,
            stores: Mutex::new(HashMap::new()),
        })
    }

    /// Create a backend whose `bucket` is served by an existing store.
    pub fn with_store(protocol: &str, bucket: &str, store: Arc<dyn ObjectStore>) -> Self {
        let mut stores = HashMap::new();
        stores.insert(bucket.to_string(), store);
        Self {
            protocol: protocol.to_string(),
            options: Vec::new(),
            stores: Mutex::new(stores),
        }
    }

    fn url_scheme(&self) -> &str {
        match self.protocol.as_str() {
            "gcs" => "gs",
            other => other,
        }
    }

    fn store_for(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = stores.get(bucket) {
            return Ok(Arc::clone(store));
        }

        let location = format!("{}{}{}", self.url_scheme(), uri::SCHEME_SEPARATOR, bucket);
        let url = Url::parse(&location)
            .map_err(|e| Error::InvalidUri(format!("{}: {}", location, e)))?;
        let (store, _) = object_store::parse_url_opts(&url, self.options.iter().cloned())
            .map_err(|e| Error::BackendUnavailable {
                protocol: self.protocol.clone(),
                reason: e.to_string(),
            })?;

        debug!("Created object store client for {}", location);
        let store: Arc<dyn ObjectStore> = Arc::from(store);
        stores.insert(bucket.to_string(), Arc::clone(&store));
        Ok(store)
    }

    /// Resolve a backend path into its store and object key.
    fn locate(&self, path: &str) -> Result<(String, Arc<dyn ObjectStore>, ObjectPath)> {
        let trimmed = path.trim_matches('/');
        let (bucket, key) = match trimmed.split_once('/') {
            Some((bucket, key)) => (bucket, key),
            None => (trimmed, ""),
        };
        if bucket.is_empty() {
            return Err(Error::InvalidInput(format!(
                "Object store path '{}' has no bucket",
                path
            )));
        }
        let store = self.store_for(bucket)?;
        Ok((bucket.to_string(), store, ObjectPath::from(key)))
    }

    fn object_metadata(bucket: &str, meta: &ObjectMeta) -> Metadata {
        let name = uri::join_path(bucket, meta.location.as_ref());
        let metadata = Metadata::file(name, meta.size, Some(meta.last_modified));
        match &meta.e_tag {
            Some(etag) => metadata.with_etag(etag.clone()),
            None => metadata,
        }
    }

    fn prefix_metadata(bucket: &str, prefix: &ObjectPath) -> Metadata {
        Metadata::directory(uri::join_path(bucket, prefix.as_ref()), None)
    }

    /// Head an object, returning None when no object has this exact key.
    async fn head(store: &Arc<dyn ObjectStore>, key: &ObjectPath) -> Result<Option<ObjectMeta>> {
        if key.as_ref().is_empty() {
            return Ok(None);
        }
        match store.head(key).await {
            Ok(meta) => Ok(Some(meta)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(map_store_error(key.as_ref(), e)),
        }
    }

    /// Every object under a prefix.
    async fn objects_under(
        store: &Arc<dyn ObjectStore>,
        prefix: &ObjectPath,
    ) -> Result<Vec<ObjectMeta>> {
        let prefix = (!prefix.as_ref().is_empty()).then_some(prefix);
        store
            .list(prefix)
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| map_store_error(prefix.map(|p| p.as_ref()).unwrap_or(""), e))
    }

    async fn copy_object(
        &self,
        src: (&str, &Arc<dyn ObjectStore>, &ObjectPath),
        dst: (&str, &Arc<dyn ObjectStore>, &ObjectPath),
    ) -> Result<()> {
        let (src_bucket, src_store, from) = src;
        let (dst_bucket, dst_store, to) = dst;

        if src_bucket == dst_bucket {
            return src_store
                .copy(from, to)
                .await
                .map_err(|e| map_store_error(from.as_ref(), e));
        }

        let meta = Self::head(src_store, from)
            .await?
            .ok_or_else(|| Error::NotFound(uri::join_path(src_bucket, from.as_ref())))?;
        let mut reader = BufReader::new(Arc::clone(src_store), &meta);
        let mut writer = BufWriter::new(Arc::clone(dst_store), to.clone());
        if let Err(e) = transfer::stream_copy(&mut reader, &mut writer).await {
            if let Err(abort) = writer.abort().await {
                debug!("Failed to abort upload of {}: {}", to, abort);
            }
            return Err(e);
        }
        debug!(
            "Streamed {} bytes from {} to {}",
            meta.size, src_bucket, dst_bucket
        );
        Ok(())
    }
}

/// Map an `object_store` error onto the crate error kinds.
fn map_store_error(path: &str, err: object_store::Error) -> Error {
    match err {
        object_store::Error::NotFound { .. } => Error::NotFound(path.to_string()),
        object_store::Error::AlreadyExists { .. } => Error::AlreadyExists(path.to_string()),
        object_store::Error::NotSupported { source } => Error::Unsupported(source.to_string()),
        other => Error::Storage(format!("{}: {}", path, other)),
    }
}

#[async_trait]
impl Backend for ObjectStoreBackend {
    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn kind(&self) -> BackendKind {
        BackendKind::ObjectStore
    }

    async fn open_read(&self, path: &str) -> Result<BoxReader> {
        let (_, store, key) = self.locate(path)?;
        let meta = Self::head(&store, &key)
            .await?
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        Ok(Box::pin(BufReader::new(store, &meta)))
    }

    async fn open_write(&self, path: &str) -> Result<BoxWriter> {
        let (_, store, key) = self.locate(path)?;
        if key.as_ref().is_empty() {
            return Err(Error::InvalidInput(format!(
                "Cannot write to bucket root: {}",
                path
            )));
        }
        Ok(Box::pin(BufWriter::new(store, key)))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        match self.info(path).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, path: &str) -> Result<Vec<Metadata>> {
        let (bucket, store, key) = self.locate(path)?;
        if let Some(meta) = Self::head(&store, &key).await? {
            return Ok(vec![Self::object_metadata(&bucket, &meta)]);
        }

        let prefix = (!key.as_ref().is_empty()).then_some(&key);
        let listing = store
            .list_with_delimiter(prefix)
            .await
            .map_err(|e| map_store_error(path, e))?;

        if listing.objects.is_empty() && listing.common_prefixes.is_empty() && prefix.is_some() {
            return Err(Error::NotFound(path.to_string()));
        }

        let mut results: Vec<Metadata> = listing
            .common_prefixes
            .iter()
            .map(|p| Self::prefix_metadata(&bucket, p))
            .chain(listing.objects.iter().map(|m| Self::object_metadata(&bucket, m)))
            .collect();
        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    async fn info(&self, path: &str) -> Result<Metadata> {
        let (bucket, store, key) = self.locate(path)?;
        if key.as_ref().is_empty() {
            return Ok(Metadata::directory(bucket, None));
        }
        if let Some(meta) = Self::head(&store, &key).await? {
            return Ok(Self::object_metadata(&bucket, &meta));
        }

        let listing = store
            .list_with_delimiter(Some(&key))
            .await
            .map_err(|e| map_store_error(path, e))?;
        if listing.objects.is_empty() && listing.common_prefixes.is_empty() {
            return Err(Error::NotFound(path.to_string()));
        }
        Ok(Self::prefix_metadata(&bucket, &key))
    }

    async fn find(&self, path: &str) -> Result<Vec<Metadata>> {
        let (bucket, store, key) = self.locate(path)?;
        if let Some(meta) = Self::head(&store, &key).await? {
            return Ok(vec![Self::object_metadata(&bucket, &meta)]);
        }

        let mut results: Vec<Metadata> = Self::objects_under(&store, &key)
            .await?
            .iter()
            .map(|m| Self::object_metadata(&bucket, m))
            .collect();
        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    async fn remove(&self, path: &str, recursive: bool) -> Result<()> {
        let (_, store, key) = self.locate(path)?;
        if Self::head(&store, &key).await?.is_some() {
            return store
                .delete(&key)
                .await
                .map_err(|e| map_store_error(path, e));
        }

        let objects = Self::objects_under(&store, &key).await?;
        if objects.is_empty() {
            return Err(Error::NotFound(path.to_string()));
        }
        if !recursive {
            return Err(Error::NotEmpty(path.to_string()));
        }

        for meta in objects {
            store
                .delete(&meta.location)
                .await
                .map_err(|e| map_store_error(meta.location.as_ref(), e))?;
        }
        debug!("Removed prefix {}", path);
        Ok(())
    }

    async fn makedirs(&self, path: &str, exist_ok: bool) -> Result<()> {
        // Prefixes come into being with their first object
        match self.info(path).await {
            Ok(meta) if meta.is_directory && exist_ok => Ok(()),
            Ok(_) => Err(Error::AlreadyExists(path.to_string())),
            Err(Error::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn as_native_copy(&self) -> Option<&dyn NativeCopy> {
        Some(self)
    }
}

#[async_trait]
impl NativeCopy for ObjectStoreBackend {
    async fn copy(&self, src: &str, dst: &str, recursive: bool) -> Result<()> {
        let (src_bucket, src_store, from) = self.locate(src)?;
        let (dst_bucket, dst_store, to) = self.locate(dst)?;

        if Self::head(&src_store, &from).await?.is_some() {
            return self
                .copy_object(
                    (&src_bucket, &src_store, &from),
                    (&dst_bucket, &dst_store, &to),
                )
                .await;
        }

        let objects = Self::objects_under(&src_store, &from).await?;
        if objects.is_empty() {
            return Err(Error::NotFound(src.to_string()));
        }
        if !recursive {
            return Err(Error::InvalidInput(format!(
                "{} is a directory; copy it with recursive",
                src
            )));
        }

        for meta in objects {
            let rel = uri::relative_path(from.as_ref(), meta.location.as_ref());
            let target = ObjectPath::from(uri::join_path(to.as_ref(), rel).as_str());
            self.copy_object(
                (&src_bucket, &src_store, &meta.location),
                (&dst_bucket, &dst_store, &target),
            )
            .await?;
        }
        Ok(())
    }
}
