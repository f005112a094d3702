//! Provider and storage configuration.

use std::collections::BTreeMap;
use std::path::Path;

use storagekit_common::{Error, OptionMap, Result};

/// Separator between a provider alias and the relative path.
pub const ALIAS_SEPARATOR: &str = "://";

/// Connection details for one provider alias.
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    base_uri: String,
    options: OptionMap,
}

impl ProviderConfig {
    /// Create a provider configuration.
    ///
    /// # Preconditions
    /// - `base_uri` is non-empty
    /// - `base_uri` is either `scheme://...` or an absolute local path
    ///
    /// # Errors
    /// - Returns `Error::Config` if the base location is invalid
    pub fn new(base_uri: impl Into<String>, options: OptionMap) -> Result<Self> {
        let base_uri = base_uri.into();
        if base_uri.trim().is_empty() {
            return Err(Error::Config("base_uri cannot be empty".to_string()));
        }
        if !base_uri.contains(ALIAS_SEPARATOR) && !Path::new(&base_uri).is_absolute() {
            return Err(Error::Config(format!(
                "base_uri must be 'scheme://...' or an absolute path: {}",
                base_uri
            )));
        }
        Ok(Self { base_uri, options })
    }

    /// Base location every relative path is joined onto.
    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Backend connection options.
    pub fn options(&self) -> &OptionMap {
        &self.options
    }
}

/// The full set of configured provider aliases.
///
/// Constructed once at startup and read-only afterwards, so it can be shared
/// between threads without locking.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    providers: BTreeMap<String, ProviderConfig>,
    env_substitution: bool,
}

impl StorageConfig {
    /// Create a storage configuration with environment substitution enabled.
    ///
    /// # Errors
    /// - No providers
    /// - An alias is empty or contains `://`
    pub fn new(providers: BTreeMap<String, ProviderConfig>) -> Result<Self> {
        Self::with_env_substitution(providers, true)
    }

    /// Create a storage configuration recording whether substitution was applied.
    pub fn with_env_substitution(
        providers: BTreeMap<String, ProviderConfig>,
        env_substitution: bool,
    ) -> Result<Self> {
        if providers.is_empty() {
            return Err(Error::Config(
                "Config must define storage.providers with at least one provider".to_string(),
            ));
        }
        for alias in providers.keys() {
            if alias.is_empty() {
                return Err(Error::Config("Provider alias cannot be empty".to_string()));
            }
            if alias.contains(ALIAS_SEPARATOR) {
                return Err(Error::Config(format!(
                    "Provider alias '{}' must not contain '{}'",
                    alias, ALIAS_SEPARATOR
                )));
            }
        }
        Ok(Self {
            providers,
            env_substitution,
        })
    }

    /// Look up a provider by alias.
    pub fn provider(&self, alias: &str) -> Option<&ProviderConfig> {
        self.providers.get(alias)
    }

    /// All providers, in alias order.
    pub fn providers(&self) -> &BTreeMap<String, ProviderConfig> {
        &self.providers
    }

    /// Configured aliases, sorted.
    pub fn aliases(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Whether `${VAR}` placeholders were substituted at load time.
    pub fn env_substitution(&self) -> bool {
        self.env_substitution
    }
}
