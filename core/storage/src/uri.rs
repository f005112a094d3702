//! Physical location strings: joining, protocol extraction and path helpers.
//!
//! Everything here is a pure string transformation. No filesystem or network
//! access happens and nothing can fail.

/// Separator between a scheme (or alias) and the rest of a location.
pub const SCHEME_SEPARATOR: &str = "://";

/// Protocol assumed for locations without a scheme.
pub const DEFAULT_PROTOCOL: &str = "file";

/// Combine a base location with a relative path.
///
/// - `join("scheme://host/a", "b")` is `"scheme://host/a/b"`
/// - `join("scheme://host", "b")` is `"scheme://host/b"`
/// - `join("/local/a", "b")` is `"/local/a/b"`
/// - `join(base, "")` is `base` without trailing slashes
///
/// For scheme locations the path part is joined with POSIX semantics and
/// runs of `/` are collapsed; `.` and `..` are passed through.
pub fn join(base: &str, relative: &str) -> String {
    let base = base.trim_end_matches('/');
    let rel = relative.trim_start_matches('/');
    if rel.is_empty() {
        return base.to_string();
    }

    if let Some((scheme, rest)) = base.split_once(SCHEME_SEPARATOR) {
        return match rest.split_once('/') {
            Some((authority, prefix)) => {
                let joined = posix_join(&format!("/{}", prefix), rel);
                let joined = collapse_slashes(&joined);
                format!(
                    "{}{}{}/{}",
                    scheme,
                    SCHEME_SEPARATOR,
                    authority,
                    joined.trim_start_matches('/')
                )
            }
            None => format!("{}{}{}/{}", scheme, SCHEME_SEPARATOR, rest, rel),
        };
    }

    posix_join(base, rel)
}

/// POSIX `join` of two segments: an absolute `b` replaces `a`, otherwise a
/// single `/` is inserted when `a` does not already end with one.
fn posix_join(a: &str, b: &str) -> String {
    if b.starts_with('/') || a.is_empty() {
        return b.to_string();
    }
    if a.ends_with('/') {
        format!("{}{}", a, b)
    } else {
        format!("{}/{}", a, b)
    }
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !prev_slash {
                out.push(c);
            }
            prev_slash = true;
        } else {
            out.push(c);
            prev_slash = false;
        }
    }
    out
}

/// Split `scheme:` or `scheme://` off a location.
///
/// A scheme is at least two characters of `[a-z][a-z0-9+.-]*`, so
/// `/tmp/a:b` and drive letters such as `C:` are plain paths. A base like
/// `memory://` joins to `memory:/a.txt`, which still splits as `memory`.
fn split_scheme(uri: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = uri.split_once(':')?;
    let mut chars = scheme.chars();
    let valid = scheme.len() > 1
        && chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '.' | '-')
        });
    if !valid {
        return None;
    }
    Some((scheme, rest.strip_prefix("//").unwrap_or(rest)))
}

/// Protocol of a physical location: its scheme, or [`DEFAULT_PROTOCOL`]
/// for plain paths.
pub fn protocol_of(uri: &str) -> &str {
    split_scheme(uri).map_or(DEFAULT_PROTOCOL, |(scheme, _)| scheme)
}

/// Everything after `scheme:` or `scheme://`, or the input itself for
/// plain paths.
pub fn strip_protocol(uri: &str) -> &str {
    split_scheme(uri).map_or(uri, |(_, rest)| rest)
}

/// Append a child to a backend path using `/`.
pub fn join_path(parent: &str, child: &str) -> String {
    let child = child.trim_start_matches('/');
    if child.is_empty() {
        return parent.to_string();
    }
    let parent = parent.trim_end_matches('/');
    if parent.is_empty() {
        return child.to_string();
    }
    format!("{}/{}", parent, child)
}

/// Parent of a `/`-separated path (`"/"` for top-level absolute paths).
pub fn parent_path(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) if trimmed.len() > 1 => Some("/"),
        Some(0) => None,
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

/// Last component of a `/`-separated path.
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Path of `full` relative to `root`, without a leading `/`.
///
/// Returns an empty string when `full` is `root` itself.
pub fn relative_path<'a>(root: &str, full: &'a str) -> &'a str {
    let root = root.trim_end_matches('/');
    full.strip_prefix(root)
        .unwrap_or(full)
        .trim_start_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_join_scheme_with_path() {
        assert_eq!(join("scheme://host/a", "b"), "scheme://host/a/b");
        assert_eq!(join("s3://bucket/prefix/", "/dir/file.csv"), "s3://bucket/prefix/dir/file.csv");
    }

    #[test]
    fn test_join_scheme_authority_only() {
        assert_eq!(join("scheme://host", "b"), "scheme://host/b");
        assert_eq!(join("memory://bucket/", "a.txt"), "memory://bucket/a.txt");
    }

    #[test]
    fn test_join_file_uri_with_empty_authority() {
        assert_eq!(join("file:///tmp/data", "x/y.bin"), "file:///tmp/data/x/y.bin");
    }

    #[test]
    fn test_join_plain_path() {
        assert_eq!(join("/local/a", "b"), "/local/a/b");
        assert_eq!(join("/local/a///", "//b/c"), "/local/a/b/c");
    }

    #[test]
    fn test_join_collapses_and_passes_dots() {
        assert_eq!(join("s3://bucket/a", "b//c"), "s3://bucket/a/b/c");
        assert_eq!(join("s3://bucket/a", "../b"), "s3://bucket/a/../b");
    }

    #[test]
    fn test_join_empty_relative() {
        assert_eq!(join("s3://bucket/a/", ""), "s3://bucket/a");
        assert_eq!(join("/srv/data", "///"), "/srv/data");
    }

    #[test]
    fn test_protocol_of() {
        assert_eq!(protocol_of("s3://bucket/key"), "s3");
        assert_eq!(protocol_of("sftp://user@host:22/in"), "sftp");
        assert_eq!(protocol_of("/tmp/a:b"), "file");
        assert_eq!(protocol_of("C:/data"), "file");
        assert_eq!(protocol_of("Memory://x"), "file");
        assert_eq!(protocol_of("git+ssh://host/repo"), "git+ssh");
    }

    #[test]
    fn test_root_bases_keep_their_scheme() {
        let memory = join("memory://", "a.txt");
        assert_eq!(memory, "memory:/a.txt");
        assert_eq!(protocol_of(&memory), "memory");
        assert_eq!(strip_protocol(&memory), "/a.txt");

        let file = join("file:///", "tmp/x.bin");
        assert_eq!(protocol_of(&file), "file");
        assert_eq!(strip_protocol(&file), "/tmp/x.bin");
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(strip_protocol("file:///tmp/x"), "/tmp/x");
        assert_eq!(strip_protocol("/tmp/x"), "/tmp/x");
        assert_eq!(join_path("/a/", "b"), "/a/b");
        assert_eq!(join_path("", "b"), "b");
        assert_eq!(parent_path("/a/b"), Some("/a"));
        assert_eq!(parent_path("/a"), Some("/"));
        assert_eq!(parent_path("/"), None);
        assert_eq!(parent_path("bucket/key"), Some("bucket"));
        assert_eq!(base_name("/a/b.txt"), "b.txt");
        assert_eq!(relative_path("/a", "/a/b/c"), "b/c");
        assert_eq!(relative_path("/a/", "/a"), "");
    }

    proptest! {
        #[test]
        fn prop_join_empty_is_trimmed_base(base in "[a-z]{1,5}(://)?[a-z/]{0,12}") {
            prop_assert_eq!(join(&base, ""), base.trim_end_matches('/'));
        }

        #[test]
        fn prop_join_is_deterministic(
            base in "(s3://|memory://|/)[a-z]{1,6}(/[a-z]{1,6}){0,3}",
            rel in "[a-z./]{0,16}",
        ) {
            prop_assert_eq!(join(&base, &rel), join(&base, &rel));
        }

        #[test]
        fn prop_join_keeps_base_prefix(
            base in "(s3://|/)[a-z]{1,6}(/[a-z]{1,6}){0,3}",
            rel in "[a-z]{1,6}(/[a-z]{1,6}){0,2}",
        ) {
            let joined = join(&base, &rel);
            prop_assert!(joined.starts_with(base.as_str()));
            prop_assert!(joined.ends_with(rel.as_str()));
        }
    }
}
