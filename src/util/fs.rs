use std::path::{Path, PathBuf};

/// Ignore errors about nonexisting files.
pub fn exist_then<T: Default>(r: std::io::Result<T>) -> std::io::Result<T> {
    match r {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        Err(_) => Ok(T::default()),
        Ok(x) => Ok(x),
    }
}

/// List the entries of `dir` sorted by name.
///
/// Unlike a bare [`std::fs::read_dir`], a failure on any single entry is
/// returned instead of skipped: callers only tolerate `NotFound`.
pub fn sorted_dir_entries<A: AsRef<Path>>(dir: A) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

/// Whether the last component of `path` starts with a dot.
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.as_encoded_bytes().starts_with(b"."))
}

/// Best-effort identity of a path: the canonical path when it resolves,
/// else the path with only its parent resolved (dangling links), else the
/// literal path.
pub fn identity(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| resolve_parent(path))
}

/// Resolve everything but the last component of `path`.
///
/// Targets recorded as `<moddir>/../../../usr/src/linux` must be pinned
/// down before `<moddir>` itself is removed, while a symlink in the final
/// component must stay a symlink so that only the link gets unlinked.
pub fn resolve_parent(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            std::fs::canonicalize(parent).map_or_else(|_| path.to_path_buf(), |p| p.join(name))
        }
        _ => path.to_path_buf(),
    }
}
