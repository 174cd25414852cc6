//! Deleting the files of removed kernels.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use itertools::Itertools;
use serde::Serialize;

use crate::file::{ClassifiedFile, FileKind};
use crate::util::fs::resolve_parent;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    /// Removed paths; in pretend mode, the paths that would be removed.
    pub removed: Vec<PathBuf>,
    /// Directories left alone because something else still lives in them.
    pub kept_nonempty: Vec<PathBuf>,
    /// Paths that were gone already.
    pub missing: Vec<PathBuf>,
    pub pretend: bool,
}

enum Outcome {
    Removed,
    NotEmpty,
    Missing,
}

fn remove_path(path: &Path) -> std::io::Result<Outcome> {
    let meta = match fs::symlink_metadata(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Outcome::Missing),
        r => r?,
    };
    let r = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match r {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Outcome::Missing),
        r => r.map(|()| Outcome::Removed),
    }
}

fn remove_if_empty(path: &Path) -> std::io::Result<Outcome> {
    match fs::remove_dir(path) {
        Ok(()) => Ok(Outcome::Removed),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Outcome::Missing),
        // POSIX allows EEXIST in place of ENOTEMPTY
        Err(e) if matches!(e.kind(), ErrorKind::DirectoryNotEmpty | ErrorKind::AlreadyExists) => {
            Ok(Outcome::NotEmpty)
        }
        Err(e) => Err(e),
    }
}

impl RemovalReport {
    fn record(&mut self, path: PathBuf, outcome: Outcome) {
        match outcome {
            Outcome::Removed if self.pretend => {
                tracing::debug!(?path, "Would remove");
                self.removed.push(path);
            }
            Outcome::Removed => {
                tracing::info!(?path, "Removed");
                self.removed.push(path);
            }
            Outcome::NotEmpty => {
                tracing::info!(?path, "Keeping non-empty directory");
                self.kept_nonempty.push(path);
            }
            Outcome::Missing => {
                tracing::debug!(?path, "Already gone");
                self.missing.push(path);
            }
        }
    }
}

/// Remove `files` from disk.
///
/// Everything but [`FileKind::EmptyDirectory`] markers goes first, in order;
/// directories are removed with their contents. Markers follow, deepest
/// first, and only remove directories that ended up empty.
///
/// All paths are pinned down before anything is removed, since recorded
/// paths may lead through directories removed on the way.
///
/// # Errors
/// Any I/O error but `NotFound` aborts the removal.
#[tracing::instrument(skip(files), fields(files = files.len()))]
pub fn remove_files(files: &[ClassifiedFile], pretend: bool) -> Result<RemovalReport> {
    let (markers, others): (Vec<_>, Vec<_>) = (files.iter())
        .map(|f| (resolve_parent(&f.path), f.kind))
        .unique_by(|(path, _)| path.clone())
        .partition(|(_, kind)| *kind == FileKind::EmptyDirectory);

    let mut report = RemovalReport {
        pretend,
        ..RemovalReport::default()
    };

    for (path, kind) in others {
        if pretend {
            report.record(path, Outcome::Removed);
            continue;
        }
        tracing::trace!(?path, %kind, "Removing");
        let outcome =
            remove_path(&path).wrap_err_with(|| format!("Cannot remove {}", path.display()))?;
        report.record(path, outcome);
    }

    let markers = (markers.into_iter())
        .map(|(path, _)| path)
        .sorted_by_key(|path| std::cmp::Reverse(path.components().count()));
    for path in markers {
        if pretend {
            report.record(path, Outcome::Removed);
            continue;
        }
        let outcome = remove_if_empty(&path)
            .wrap_err_with(|| format!("Cannot remove directory {}", path.display()))?;
        report.record(path, outcome);
    }

    Ok(report)
}
