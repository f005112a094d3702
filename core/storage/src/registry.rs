//! Backend registry for protocol-based backend construction.

use std::collections::HashMap;
use std::sync::Arc;

use storagekit_common::{Error, OptionMap, Result};

use crate::backend::Backend;
use crate::local::LocalBackend;
use crate::memory::MemoryBackend;
use crate::object::{ObjectStoreBackend, OBJECT_PROTOCOLS};

/// Factory function type for creating backend handles.
///
/// Receives the protocol it was invoked for and the connection options.
pub type BackendFactory =
    Box<dyn Fn(&str, &OptionMap) -> Result<Arc<dyn Backend>> + Send + Sync>;

/// Registry of backend factories keyed by protocol.
///
/// Populated once at startup, then only read.
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory.
    ///
    /// # Preconditions
    /// - `protocol` must be unique within the registry
    ///
    /// # Errors
    /// - Returns error if the protocol is already registered
    pub fn register(&mut self, protocol: impl Into<String>, factory: BackendFactory) -> Result<()> {
        let protocol = protocol.into();
        if self.factories.contains_key(&protocol) {
            return Err(Error::AlreadyExists(format!(
                "Backend for protocol '{}' is already registered",
                protocol
            )));
        }
        self.factories.insert(protocol, factory);
        Ok(())
    }

    fn insert(&mut self, protocol: &str, factory: BackendFactory) {
        self.factories.insert(protocol.to_string(), factory);
    }

    /// Build a new handle for `protocol` with `options`.
    ///
    /// # Errors
    /// - `BackendUnavailable` when no factory serves the protocol, or the
    ///   factory rejects the options
    pub fn create(&self, protocol: &str, options: &OptionMap) -> Result<Arc<dyn Backend>> {
        let factory = self.factories.get(protocol).ok_or_else(|| Error::BackendUnavailable {
            protocol: protocol.to_string(),
            reason: format!("no backend registered (available: {})", self.protocols().join(", ")),
        })?;

        factory(protocol, options).map_err(|e| match e {
            Error::BackendUnavailable { .. } => e,
            other => Error::BackendUnavailable {
                protocol: protocol.to_string(),
                reason: other.to_string(),
            },
        })
    }

    /// Registered protocols, sorted.
    pub fn protocols(&self) -> Vec<String> {
        let mut protocols: Vec<String> = self.factories.keys().cloned().collect();
        protocols.sort();
        protocols
    }

    /// Check if a protocol is registered.
    pub fn has_protocol(&self, protocol: &str) -> bool {
        self.factories.contains_key(protocol)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with the built-in backends.
///
/// - `memory`: process-local tree
/// - `file`, `local`: local filesystem
/// - `s3`, `gs`, `az`, `http`, ... : object stores
pub fn create_default_registry() -> BackendRegistry {
    let mut registry = BackendRegistry::new();

    registry.insert("memory", Box::new(|_, _| Ok(Arc::new(MemoryBackend::new()))));

    for protocol in ["file", "local"] {
        registry.insert(
            protocol,
            Box::new(|protocol, options| {
                Ok(Arc::new(LocalBackend::from_options(protocol, options)?))
            }),
        );
    }

    for protocol in OBJECT_PROTOCOLS {
        registry.insert(
            protocol,
            Box::new(|protocol, options| {
                Ok(Arc::new(ObjectStoreBackend::new(protocol, options)?))
            }),
        );
    }

    registry
}
