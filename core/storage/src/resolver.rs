//! Backend handle resolution and caching.
//!
//! A handle is created once per (protocol, options) pair and reused for
//! every later location resolving to the same pair.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use storagekit_common::{OptionMap, Result};

use crate::backend::Backend;
use crate::registry::BackendRegistry;
use crate::uri;

/// Cache identity of a backend handle.
///
/// Options are kept as (key, canonical value) pairs in key order, so two
/// maps with equal contents always produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    protocol: String,
    options: Vec<(String, String)>,
}

impl CacheKey {
    pub fn new(protocol: &str, options: &OptionMap) -> Self {
        Self {
            protocol: protocol.to_string(),
            options: options
                .iter()
                .map(|(key, value)| (key.clone(), value.canonical()))
                .collect(),
        }
    }
}

/// Maps physical locations to shared backend handles.
pub struct BackendResolver {
    registry: BackendRegistry,
    cache: Mutex<HashMap<CacheKey, Arc<dyn Backend>>>,
}

impl BackendResolver {
    pub fn new(registry: BackendRegistry) -> Self {
        Self {
            registry,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a physical location to a handle and a backend path.
    ///
    /// The cache lock is held while a missing handle is built, so
    /// concurrent callers with the same key observe a single construction.
    ///
    /// # Errors
    /// - `BackendUnavailable` when no factory serves the protocol or the
    ///   factory fails
    pub fn resolve(
        &self,
        physical_uri: &str,
        options: &OptionMap,
    ) -> Result<(Arc<dyn Backend>, String)> {
        let protocol = uri::protocol_of(physical_uri);
        let key = CacheKey::new(protocol, options);

        let backend = {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            match cache.get(&key) {
                Some(backend) => {
                    debug!("Reusing {} handle for {}", protocol, physical_uri);
                    Arc::clone(backend)
                }
                None => {
                    let backend = self.registry.create(protocol, options).map_err(|e| {
                        warn!("Failed to create {} backend: {}", protocol, e);
                        e
                    })?;
                    info!(
                        "Created {} backend handle ({} options)",
                        protocol,
                        options.len()
                    );
                    cache.insert(key, Arc::clone(&backend));
                    backend
                }
            }
        };

        let path = backend.path_from_uri(physical_uri);
        Ok((backend, path))
    }

    /// Number of cached handles.
    pub fn handle_count(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::registry::{create_default_registry, BackendFactory};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;
    use storagekit_common::{Error, OptionValue};

    fn counting_registry(counter: Arc<AtomicUsize>) -> BackendRegistry {
        let factory: BackendFactory = Box::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            // Widen the race window between concurrent resolvers
            thread::sleep(Duration::from_millis(20));
            Ok(Arc::new(MemoryBackend::new()))
        });
        let mut registry = BackendRegistry::new();
        registry.register("memory", factory).unwrap();
        registry
    }

    fn options(pairs: &[(&str, OptionValue)]) -> OptionMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_same_protocol_and_options_share_handle() {
        let resolver = BackendResolver::new(create_default_registry());
        let opts = options(&[("region", "eu".into()), ("retries", 3i64.into())]);

        let (a, path_a) = resolver.resolve("memory://bucket/a.txt", &opts).unwrap();
        let (b, path_b) = resolver.resolve("memory://bucket/b.txt", &opts.clone()).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(path_a, "/bucket/a.txt");
        assert_eq!(path_b, "/bucket/b.txt");
        assert_eq!(resolver.handle_count(), 1);
    }

    #[test]
    fn test_different_options_get_different_handles() {
        let resolver = BackendResolver::new(create_default_registry());
        let (a, _) = resolver
            .resolve("memory://x", &options(&[("user", "a".into())]))
            .unwrap();
        let (b, _) = resolver
            .resolve("memory://x", &options(&[("user", "b".into())]))
            .unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(resolver.handle_count(), 2);
    }

    #[test]
    fn test_value_types_are_distinguished() {
        let resolver = BackendResolver::new(create_default_registry());
        let (a, _) = resolver
            .resolve("memory://x", &options(&[("port", 22i64.into())]))
            .unwrap();
        let (b, _) = resolver
            .resolve("memory://x", &options(&[("port", "22".into())]))
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_plain_path_uses_file_protocol() {
        let resolver = BackendResolver::new(create_default_registry());
        let (backend, path) = resolver.resolve("/tmp/data.bin", &OptionMap::new()).unwrap();
        assert_eq!(backend.protocol(), "file");
        assert_eq!(path, "/tmp/data.bin");
    }

    #[test]
    fn test_unknown_protocol_fails_and_caches_nothing() {
        let resolver = BackendResolver::new(create_default_registry());
        let result = resolver.resolve("sftp://host/in", &OptionMap::new());
        assert!(matches!(result, Err(Error::BackendUnavailable { .. })));
        assert_eq!(resolver.handle_count(), 0);
    }

    #[test]
    fn test_concurrent_resolution_builds_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let resolver = Arc::new(BackendResolver::new(counting_registry(Arc::clone(&counter))));
        let barrier = Arc::new(Barrier::new(8));
        let opts = options(&[("shared", true.into())]);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let resolver = Arc::clone(&resolver);
                let barrier = Arc::clone(&barrier);
                let opts = opts.clone();
                thread::spawn(move || {
                    barrier.wait();
                    resolver
                        .resolve(&format!("memory://bucket/{}", i), &opts)
                        .unwrap()
                        .0
                })
            })
            .collect();

        let backends: Vec<Arc<dyn Backend>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(backends.iter().all(|b| Arc::ptr_eq(b, &backends[0])));
    }

    #[test]
    fn test_cache_key_ignores_insertion_order() {
        let mut first = OptionMap::new();
        first.insert("b".to_string(), 2i64.into());
        first.insert("a".to_string(), 1i64.into());
        let mut second = OptionMap::new();
        second.insert("a".to_string(), 1i64.into());
        second.insert("b".to_string(), 2i64.into());

        assert_eq!(CacheKey::new("s3", &first), CacheKey::new("s3", &second));
        assert_ne!(CacheKey::new("s3", &first), CacheKey::new("gs", &second));
    }
}
