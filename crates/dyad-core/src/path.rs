//! Managed-path resolution and directory creation.
//!
//! A file participates in coordination only when its absolute path sits
//! under the managed prefix for its side. The remainder after the prefix is
//! the user path: the identifier every rank derives the topic key from, so
//! normalization here must not depend on what exists on the local disk — a
//! consumer resolves paths for files that have not been fetched yet.

use std::path::{Component, Path, PathBuf};

/// Lexically normalize `path`: make it absolute against the current working
/// directory and fold `.`, `..` and duplicate separators without touching
/// the filesystem.
pub fn normalize_lexical(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path)
    };
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::RootDir => out.push(Component::RootDir),
            Component::CurDir => {}
            Component::ParentDir => {
                if out.parent().is_some() {
                    out.pop();
                }
            }
            Component::Normal(c) => out.push(c),
            Component::Prefix(_) => {}
        }
    }
    if out.as_os_str().is_empty() {
        out.push(Component::RootDir);
    }
    out
}

/// Canonicalize a managed prefix. Symlinks are resolved when the prefix
/// exists; otherwise the lexical form is used so a not-yet-created managed
/// directory still matches.
fn canonical_prefix(prefix: &Path) -> PathBuf {
    prefix
        .canonicalize()
        .unwrap_or_else(|_| normalize_lexical(prefix))
}

/// Return the user path of `path` relative to the managed `prefix`, or
/// `None` when `path` is outside the prefix (or is the prefix itself).
/// Matching is on whole components: `/m/datafile` is not under `/m/data`.
pub fn resolve_managed(prefix: &Path, path: &str) -> Option<String> {
    let abs = normalize_lexical(Path::new(path));
    let prefix = canonical_prefix(prefix);
    let rest = abs.strip_prefix(&prefix).ok()?;
    if rest.as_os_str().is_empty() {
        return None;
    }
    rest.to_str().map(str::to_string)
}

/// Create `dir` and any missing parents with mode `rwxrwxr-x` plus setgid,
/// the mode shared output trees are expected to carry.
pub fn mkdir_as_needed(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o2775)
        .create(dir)
}
