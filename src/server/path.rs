//! URL to filesystem path resolution across several mapped roots.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use serde::Serialize;

/// Serve files under `fs_root` at URLs beginning with `url_prefix`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DevServerMapping {
    /// Always starts with `/`; never ends with `/` unless it is `/` itself.
    pub url_prefix: String,
    pub fs_root: PathBuf,
}

impl DevServerMapping {
    pub fn new(url_prefix: &str, fs_root: impl Into<PathBuf>) -> Self {
        Self {
            url_prefix: normalize_prefix(url_prefix),
            fs_root: fs_root.into(),
        }
    }

    /// The part of `path` below this mapping's prefix, if it matches on a
    /// segment boundary (`/assets` matches `/assets/x` but not `/assetsx`).
    fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.url_prefix == "/" {
            return Some(path);
        }
        let rest = path.strip_prefix(self.url_prefix.as_str())?;
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Resolve a request URL to a file.
///
/// Mappings are tried longest prefix first, declaration order among equal
/// lengths; the first that yields an existing file wins.
pub fn resolve_request(url: &str, mappings: &[DevServerMapping]) -> Option<PathBuf> {
    let path = decode_url(url)?;
    if path.split('/').any(|segment| segment == "..") || path.contains('\\') {
        return None;
    }

    let mut candidates: Vec<(&DevServerMapping, &str)> = mappings
        .iter()
        .filter_map(|m| m.strip(&path).map(|rest| (m, rest)))
        .collect();
    candidates.sort_by_key(|(m, _)| std::cmp::Reverse(m.url_prefix.len()));

    candidates
        .into_iter()
        .find_map(|(mapping, rest)| resolve_under(rest, &mapping.fs_root))
}

/// Decode percent escapes and drop the query string and fragment.
fn decode_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let decoded = percent_decode_str(path).decode_utf8().ok()?;
    let decoded = match decoded {
        Cow::Borrowed(s) => s.to_string(),
        Cow::Owned(s) => s,
    };
    decoded.starts_with('/').then_some(decoded)
}

/// File for `relative` under `root`, with `index.html` for directories.
fn resolve_under(relative: &str, root: &Path) -> Option<PathBuf> {
    let relative = relative.trim_matches('/');
    let root = root.canonicalize().ok()?;
    let local = if relative.is_empty() {
        root.clone()
    } else {
        root.join(relative)
    };

    // Symlinks may point anywhere; only serve what lands under the root.
    let canonical = local.canonicalize().ok()?;
    if !canonical.starts_with(&root) {
        return None;
    }

    if canonical.is_file() {
        return Some(canonical);
    }
    if canonical.is_dir() {
        let index = canonical.join("index.html");
        if index.is_file() {
            return Some(index);
        }
    }
    None
}
