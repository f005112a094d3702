//! Common error types for StorageKit.

use thiserror::Error;

/// Top-level error type for StorageKit operations.
///
/// Validation failures (`InvalidUri`, `UnknownProvider`, `Config`,
/// `BackendUnavailable`) are raised before any backend I/O happens. The
/// remaining variants are backend conditions that are propagated unchanged.
#[derive(Debug, Error)]
pub enum Error {
    /// URI does not carry a provider alias (`alias://...`).
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Alias is not configured.
    #[error("Unknown provider alias '{alias}'. Known: [{}]", .known.join(", "))]
    UnknownProvider { alias: String, known: Vec<String> },

    /// Configuration missing or invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// A backend handle could not be constructed.
    #[error("Backend unavailable for protocol '{protocol}': {reason}")]
    BackendUnavailable { protocol: String, reason: String },

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not supported by the backend or handle.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Directory is not empty.
    #[error("Directory not empty: {0}")]
    NotEmpty(String),
}

impl Error {
    /// Whether this error reports a missing path.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Translate an I/O error on `path` into the matching storage condition.
    pub fn from_io(path: &str, err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::NotFound => Error::NotFound(path.to_string()),
            ErrorKind::AlreadyExists => Error::AlreadyExists(path.to_string()),
            ErrorKind::DirectoryNotEmpty => Error::NotEmpty(path.to_string()),
            _ => Error::Storage(format!("{}: {}", path, err)),
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_lists_aliases() {
        let err = Error::UnknownProvider {
            alias: "nope".to_string(),
            known: vec!["local".to_string(), "mem".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'nope'"));
        assert!(msg.contains("local, mem"));
    }

    #[test]
    fn test_from_io_maps_kinds() {
        let err = Error::from_io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, Error::NotFound(ref p) if p == "/tmp/x"));
        assert!(err.is_not_found());

        let err = Error::from_io(
            "/tmp/y",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, Error::Storage(ref m) if m.contains("/tmp/y")));
        assert!(!err.is_not_found());
    }
}
