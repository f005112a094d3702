//! Storage configuration for StorageKit.
//!
//! Provides the immutable provider model (`StorageConfig`, `ProviderConfig`)
//! and the YAML loader that materializes it, including `${VAR}`
//! environment substitution.

pub mod env;
pub mod loader;
pub mod model;

pub use env::{EnvSource, ProcessEnv};
pub use loader::{load_from_env, load_from_yaml_path, ConfigLoader, DEFAULT_CONFIG_ENV};
pub use model::{ProviderConfig, StorageConfig, ALIAS_SEPARATOR};
