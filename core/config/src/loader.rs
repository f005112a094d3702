//! Config loading from YAML documents.
//!
//! Document shape:
//!
//! ```yaml
//! storage:
//!   env_substitution: true
//!   providers:
//!     primary:
//!       base_uri: "s3://bucket/prefix"
//!       options:
//!         region: "${AWS_REGION}"
//! ```

use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use storagekit_common::{Error, OptionMap, Result};

use crate::env::{substitute_value, EnvSource, ProcessEnv};
use crate::model::{ProviderConfig, StorageConfig};

/// Environment variable naming the config file.
pub const DEFAULT_CONFIG_ENV: &str = "STORAGEKIT_CONFIG";

#[derive(Debug, Default, Deserialize)]
struct RawDocument {
    #[serde(default)]
    storage: Option<RawStorage>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStorage {
    #[serde(default)]
    providers: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawProvider {
    #[serde(default)]
    base_uri: Option<Value>,
    #[serde(default)]
    options: Option<OptionMap>,
}

/// Loads `StorageConfig` from YAML, substituting `${VAR}` placeholders.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader<E = ProcessEnv> {
    env: E,
}

impl ConfigLoader<ProcessEnv> {
    /// Loader reading the process environment.
    pub fn new() -> Self {
        Self { env: ProcessEnv }
    }
}

impl<E: EnvSource> ConfigLoader<E> {
    /// Loader reading variables from `env`.
    pub fn with_env(env: E) -> Self {
        Self { env }
    }

    /// Load the file named by the environment variable `env_var`.
    ///
    /// # Errors
    /// - Variable unset or empty
    /// - Any error from [`ConfigLoader::load_path`]
    pub fn load_from_env_var(&self, env_var: &str) -> Result<StorageConfig> {
        match self.env.var(env_var) {
            Some(path) if !path.is_empty() => self.load_path(path),
            _ => Err(Error::Config(format!(
                "Environment variable '{}' not set",
                env_var
            ))),
        }
    }

    /// Load a YAML config file.
    ///
    /// # Errors
    /// - File not found or unreadable
    /// - Any error from [`ConfigLoader::load_str`]
    pub fn load_path(&self, path: impl AsRef<Path>) -> Result<StorageConfig> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        debug!("Loading storage config from {}", path.display());
        self.load_str(&text)
    }

    /// Parse a YAML config document.
    ///
    /// `storage.env_substitution` is read before substitution runs; when it
    /// is true every string in the document is substituted.
    ///
    /// # Errors
    /// - Malformed YAML
    /// - Undefined variable in a placeholder
    /// - `storage.providers` absent, not a mapping, or empty
    /// - Provider without `base_uri`, or with an invalid one
    pub fn load_str(&self, text: &str) -> Result<StorageConfig> {
        let mut doc: Value = serde_yaml::from_str(text)
            .map_err(|e| Error::Config(format!("Invalid config document: {}", e)))?;
        if doc.is_null() {
            doc = Value::Mapping(serde_yaml::Mapping::new());
        }

        let env_substitution = match &doc["storage"]["env_substitution"] {
            Value::Null => true,
            Value::Bool(b) => *b,
            other => {
                return Err(Error::Config(format!(
                    "storage.env_substitution must be a boolean, got {:?}",
                    other
                )))
            }
        };

        if env_substitution {
            doc = substitute_value(doc, &self.env)?;
        }

        let raw: RawDocument = serde_yaml::from_value(doc)
            .map_err(|e| Error::Config(format!("Invalid config document: {}", e)))?;

        let providers = match raw.storage.unwrap_or_default().providers {
            Some(Value::Mapping(map)) if !map.is_empty() => map,
            _ => {
                return Err(Error::Config(
                    "Config must define storage.providers with at least one provider".to_string(),
                ))
            }
        };

        let mut parsed = BTreeMap::new();
        for (name, entry) in providers {
            let alias = scalar_to_string(&name)
                .ok_or_else(|| Error::Config(format!("Invalid provider alias: {:?}", name)))?;

            let entry = if entry.is_null() {
                Value::Mapping(serde_yaml::Mapping::new())
            } else {
                entry
            };
            let raw: RawProvider = serde_yaml::from_value(entry).map_err(|e| {
                Error::Config(format!("Invalid provider '{}': {}", alias, e))
            })?;

            let base_uri = raw
                .base_uri
                .as_ref()
                .and_then(scalar_to_string)
                .ok_or_else(|| Error::Config(format!("Provider '{}' missing base_uri", alias)))?;

            let provider = ProviderConfig::new(base_uri, raw.options.unwrap_or_default())
                .map_err(|e| match e {
                    Error::Config(msg) => Error::Config(format!("Provider '{}': {}", alias, msg)),
                    other => other,
                })?;
            parsed.insert(alias, provider);
        }

        debug!("Loaded {} storage provider(s)", parsed.len());
        StorageConfig::with_env_substitution(parsed, env_substitution)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Load a YAML config file using the process environment.
pub fn load_from_yaml_path(path: impl AsRef<Path>) -> Result<StorageConfig> {
    ConfigLoader::new().load_path(path)
}

/// Load the config file named by `env_var` (usually [`DEFAULT_CONFIG_ENV`]).
pub fn load_from_env(env_var: &str) -> Result<StorageConfig> {
    ConfigLoader::new().load_from_env_var(env_var)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use storagekit_common::OptionValue;
    use tempfile::TempDir;

    fn loader(pairs: &[(&str, &str)]) -> ConfigLoader<HashMap<String, String>> {
        ConfigLoader::with_env(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_env_substitution_success() {
        let text = r#"
storage:
  env_substitution: true
  providers:
    sftpdrop:
      base_uri: "sftp://user@host:22/incoming"
      options:
        key_filename: "${SFTP_KEYFILE}"
"#;
        let config = loader(&[("SFTP_KEYFILE", "/home/app/.ssh/id_ed25519")])
            .load_str(text)
            .unwrap();

        let provider = config.provider("sftpdrop").unwrap();
        assert_eq!(provider.base_uri(), "sftp://user@host:22/incoming");
        assert_eq!(
            provider.options()["key_filename"].as_str(),
            Some("/home/app/.ssh/id_ed25519")
        );
    }

    #[test]
    fn test_env_substitution_missing_var_fails() {
        let text = r#"
storage:
  env_substitution: true
  providers:
    sftpdrop:
      base_uri: "sftp://user@host:22/incoming"
      options:
        key_filename: "${SFTP_KEYFILE}"
"#;
        let err = loader(&[]).load_str(text).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("SFTP_KEYFILE")));
    }

    #[test]
    fn test_env_substitution_can_be_disabled() {
        let text = r#"
storage:
  env_substitution: false
  providers:
    x:
      base_uri: "file:///tmp"
      options:
        password: "${LITERAL}"
"#;
        let config = loader(&[]).load_str(text).unwrap();
        assert!(!config.env_substitution());
        assert_eq!(
            config.provider("x").unwrap().options()["password"].as_str(),
            Some("${LITERAL}")
        );
    }

    #[test]
    fn test_substitution_defaults_to_enabled() {
        let text = r#"
storage:
  providers:
    data:
      base_uri: "${DATA_ROOT}"
"#;
        let config = loader(&[("DATA_ROOT", "/srv/data")]).load_str(text).unwrap();
        assert_eq!(config.provider("data").unwrap().base_uri(), "/srv/data");
    }

    #[test]
    fn test_missing_providers_fails() {
        for text in ["", "storage: {}\n", "storage:\n  providers: {}\n", "other: 1\n"] {
            let err = loader(&[]).load_str(text).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "accepted: {:?}", text);
        }
    }

    #[test]
    fn test_missing_base_uri_names_provider() {
        let text = "storage:\n  providers:\n    broken:\n      options: {}\n";
        let err = loader(&[]).load_str(text).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("broken")));
    }

    #[test]
    fn test_options_keep_value_types() {
        let text = r#"
storage:
  providers:
    lake:
      base_uri: "s3://lake/raw"
      options:
        anon: false
        max_connections: 16
        endpoints: ["a", "b"]
"#;
        let config = loader(&[]).load_str(text).unwrap();
        let options = config.provider("lake").unwrap().options();
        assert_eq!(options["anon"], OptionValue::Bool(false));
        assert_eq!(options["max_connections"], OptionValue::Integer(16));
        assert!(matches!(options["endpoints"], OptionValue::Sequence(_)));
    }

    #[test]
    fn test_load_path_and_env_var() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("storage.yaml");
        std::fs::write(
            &path,
            "storage:\n  providers:\n    mem:\n      base_uri: \"memory://bucket\"\n",
        )
        .unwrap();

        let env = loader(&[("MY_STORAGE_CONFIG", path.to_str().unwrap())]);
        let config = env.load_from_env_var("MY_STORAGE_CONFIG").unwrap();
        assert_eq!(config.aliases(), vec!["mem"]);

        let err = env.load_from_env_var(DEFAULT_CONFIG_ENV).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains(DEFAULT_CONFIG_ENV)));
    }

    #[test]
    fn test_load_path_not_found() {
        let temp = TempDir::new().unwrap();
        let err = loader(&[])
            .load_path(temp.path().join("absent.yaml"))
            .unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("absent.yaml")));
    }
}
