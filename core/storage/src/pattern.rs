//! Glob matching for backends without a native glob.

use glob::{MatchOptions, Pattern};

use storagekit_common::{Error, Result};

use crate::backend::{Backend, Metadata};

const WILDCARDS: &[char] = &['*', '?', '['];

/// Whether `path` contains glob metacharacters.
pub fn has_wildcard(path: &str) -> bool {
    path.contains(WILDCARDS)
}

/// The `/`-separated segments of `pattern` before the first wildcard.
///
/// `"bucket/logs/2024-*/x.csv"` has the static prefix `"bucket/logs"`.
pub fn static_prefix(pattern: &str) -> &str {
    let Some(first) = pattern.find(WILDCARDS) else {
        return pattern;
    };
    match pattern[..first].rfind('/') {
        Some(0) => "/",
        Some(idx) => &pattern[..idx],
        None => "",
    }
}

/// Compile a glob pattern in which `*` and `?` stop at `/`.
pub fn compile(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern)
        .map_err(|e| Error::InvalidInput(format!("Invalid glob pattern {}: {}", pattern, e)))
}

/// Options matching [`compile`]'s separator handling.
pub fn match_options() -> MatchOptions {
    MatchOptions {
        require_literal_separator: true,
        ..MatchOptions::new()
    }
}

/// Expand `pattern` by walking everything under its static prefix.
///
/// Directories are matched as well as files, so `"bucket/*"` returns both.
pub async fn glob_by_walking(backend: &dyn Backend, pattern: &str) -> Result<Vec<Metadata>> {
    if !has_wildcard(pattern) {
        return match backend.info(pattern).await {
            Ok(meta) => Ok(vec![meta]),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        };
    }

    let compiled = compile(pattern)?;
    let options = match_options();
    let root = static_prefix(pattern);

    let mut matches = Vec::new();
    let mut pending = vec![root.to_string()];
    while let Some(dir) = pending.pop() {
        let entries = match backend.list(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        };
        for entry in entries {
            if entry.name.trim_end_matches('/') == dir.trim_end_matches('/') {
                continue;
            }
            if entry.is_directory {
                pending.push(entry.name.clone());
            }
            if compiled.matches_with(entry.name.trim_end_matches('/'), options) {
                matches.push(entry);
            }
        }
    }

    matches.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_static_prefix() {
        assert_eq!(static_prefix("bucket/logs/2024-*/x.csv"), "bucket/logs");
        assert_eq!(static_prefix("/data/*.csv"), "/data");
        assert_eq!(static_prefix("/*.csv"), "/");
        assert_eq!(static_prefix("*.csv"), "");
        assert_eq!(static_prefix("/plain/path"), "/plain/path");
    }

    #[test]
    fn test_has_wildcard() {
        assert!(has_wildcard("a/*.txt"));
        assert!(has_wildcard("a/file?.txt"));
        assert!(has_wildcard("a/[ab].txt"));
        assert!(!has_wildcard("a/b.txt"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(compile("a/[b"), Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_glob_by_walking() {
        let backend = MemoryBackend::new();
        for path in ["/data/a.csv", "/data/b.txt", "/data/deep/c.csv"] {
            let mut writer = backend.open_write(path).await.unwrap();
            writer.write_all(b"x").await.unwrap();
            writer.shutdown().await.unwrap();
        }

        let top = glob_by_walking(&backend, "/data/*.csv").await.unwrap();
        let names: Vec<_> = top.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["/data/a.csv"]);

        let nested = glob_by_walking(&backend, "/data/*/*.csv").await.unwrap();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].name, "/data/deep/c.csv");

        let literal = glob_by_walking(&backend, "/data/b.txt").await.unwrap();
        assert_eq!(literal.len(), 1);
        assert!(glob_by_walking(&backend, "/missing/*").await.unwrap().is_empty());
    }
}
