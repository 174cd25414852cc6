//! The boot loader specification layout.
//!
//! Kernels are installed as `<boot>/<id>/<version>/{linux,initrd,...}`,
//! where `<id>` is the entry token or the machine id and `<boot>` is either
//! the root's `boot/` (optionally with an `EFI/` prefix) or a mounted ESP.
//! Module trees live in `lib/modules/<version>` as usual.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::WrapErr;
use color_eyre::Result;

use super::{KernelLayout, LayoutNotFound, LayoutOptions, LayoutError};
use crate::consts::{BOOT_DIR, ENTRY_TOKEN_PATH, MACHINE_ID_PATH, MODULES_DIR, USR_MODULES_DIR};
use crate::file::{classify, classify_build, ClassifiedFile, FileKind};
use crate::kernel::Kernel;
use crate::util::fs::{exist_then, is_hidden, sorted_dir_entries};
use crate::version::{same_kernel, token_from_path};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlSpecLayout {
    root: PathBuf,
    /// `<id>`, the name of the boot entry directory.
    entry_id: String,
    /// The resolved `<boot>/<id>` directory.
    entry_dir: PathBuf,
}

/// First line of a small identifier file, trimmed. Missing and empty files
/// count as absent.
fn read_identifier(path: &Path) -> Result<Option<String>, LayoutError> {
    let content = exist_then(fs::read_to_string(path)).map_err(|source| LayoutError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(content
        .lines()
        .next()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ToOwned::to_owned))
}

impl BlSpecLayout {
    pub const NAME: &'static str = "blspec";

    /// Locate the boot entry directory of the system at `root`.
    ///
    /// ESPs from `options` are probed before the root's own `boot/`; within
    /// each of them `EFI/<id>` is preferred over `<id>`.
    ///
    /// # Errors
    /// - [`LayoutError::NotFound`]: neither an entry token nor a machine id is
    ///   set, or no boot entry directory exists for it
    /// - [`LayoutError::Io`]: an identifier file exists but cannot be read
    #[tracing::instrument(skip(options))]
    pub fn new(root: &Path, options: &LayoutOptions) -> Result<Self, LayoutError> {
        let entry_token = read_identifier(&root.join(ENTRY_TOKEN_PATH))?;
        let entry_id = match entry_token {
            Some(token) => Some(token),
            None => read_identifier(&root.join(MACHINE_ID_PATH))?,
        };
        let entry_id = entry_id.ok_or_else(|| {
            LayoutNotFound::new(format!(
                "neither {ENTRY_TOKEN_PATH} nor {MACHINE_ID_PATH} is set in {}",
                root.display()
            ))
        })?;

        let bases = (options.esp_paths.iter().cloned()).chain(std::iter::once(root.join(BOOT_DIR)));
        let entry_dir = bases
            .flat_map(|base| [base.join("EFI").join(&entry_id), base.join(&entry_id)])
            .find(|candidate| candidate.is_dir())
            .ok_or_else(|| {
                LayoutNotFound::new(format!(
                    "no boot entry directory for `{entry_id}` in {}",
                    root.display()
                ))
            })?;
        tracing::debug!(?entry_dir, "Found boot entry directory");

        Ok(Self {
            root: root.to_path_buf(),
            entry_id,
            entry_dir,
        })
    }

    #[must_use]
    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    #[must_use]
    pub fn entry_dir(&self) -> &Path {
        &self.entry_dir
    }

    fn modules_dir(&self) -> PathBuf {
        let lib = self.root.join(MODULES_DIR);
        let usr = self.root.join(USR_MODULES_DIR);
        if !lib.exists() && usr.is_dir() {
            return usr;
        }
        lib
    }

    /// Listing of `dir` without hidden entries. A missing `dir` lists as empty.
    fn list(dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = exist_then(sorted_dir_entries(dir))
            .wrap_err_with(|| format!("Cannot list {}", dir.display()))?;
        Ok(entries
            .into_iter()
            .filter(|entry| {
                let hidden = is_hidden(entry);
                if hidden {
                    tracing::debug!(?entry, "Skipping hidden file");
                }
                !hidden
            })
            .collect())
    }

    /// Classify `path`, or [`None`] if it vanished in the meantime.
    fn classify(path: &Path) -> Result<Option<ClassifiedFile>> {
        exist_then(classify(path).map(Some))
            .wrap_err_with(|| format!("Cannot inspect {}", path.display()))
    }

    /// Whether `path` is a directory, without following symlinks.
    fn is_dir(path: &Path) -> Result<bool> {
        let meta = exist_then(fs::symlink_metadata(path).map(Some))
            .wrap_err_with(|| format!("Cannot inspect {}", path.display()))?;
        Ok(meta.is_some_and(|m| m.is_dir()))
    }

    /// Files of one `<boot>/<id>/<version>` directory, marker first.
    fn scan_version_dir(dir: &Path, kernel: &mut Kernel) -> Result<()> {
        kernel.push(ClassifiedFile::new(dir, FileKind::EmptyDirectory));
        for entry in Self::list(dir)? {
            if let Some(file) = Self::classify(&entry)? {
                kernel.push(file);
            }
        }
        Ok(())
    }

    /// The module directory itself and its `build` entry, if any.
    ///
    /// Both are tagged by position, so an empty module directory or an empty
    /// build tree is still `Modules` or `Build`.
    fn scan_module_dir(dir: &Path, kernel: &mut Kernel) -> Result<()> {
        kernel.push(ClassifiedFile::new(dir, FileKind::Modules));
        let build = dir.join("build");
        let build = exist_then(classify_build(&build).map(Some))
            .wrap_err_with(|| format!("Cannot inspect {}", build.display()))?;
        if let Some(build) = build {
            kernel.push(build);
        }
        Ok(())
    }
}

/// The kernel record for `version`, created at the end if none matches.
fn kernel_for<'a>(kernels: &'a mut Vec<Kernel>, version: &str) -> &'a mut Kernel {
    let pos = (kernels.iter())
        .position(|k| same_kernel(&k.version, version))
        .unwrap_or_else(|| {
            kernels.push(Kernel::new(version));
            kernels.len() - 1
        });
    &mut kernels[pos]
}

impl KernelLayout for BlSpecLayout {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn root(&self) -> &Path {
        &self.root
    }

    #[tracing::instrument(skip(self), fields(entry_dir = ?self.entry_dir))]
    fn find_kernels(&self, exclusions: &HashSet<FileKind>) -> Result<Vec<Kernel>> {
        let mut kernels = vec![];

        for dir in Self::list(&self.entry_dir)? {
            if !Self::is_dir(&dir)? {
                tracing::trace!(?dir, "Ignoring non-directory in boot entry directory");
                continue;
            }
            let Some(version) = token_from_path(&dir) else {
                tracing::warn!(?dir, "Ignoring boot directory with a non-UTF-8 name");
                continue;
            };
            Self::scan_version_dir(&dir, kernel_for(&mut kernels, &version))?;
        }

        for dir in Self::list(&self.modules_dir())? {
            if !Self::is_dir(&dir)? {
                continue;
            }
            let Some(version) = token_from_path(&dir) else {
                tracing::warn!(?dir, "Ignoring module directory with a non-UTF-8 name");
                continue;
            };
            Self::scan_module_dir(&dir, kernel_for(&mut kernels, &version))?;
        }

        for kernel in &mut kernels {
            kernel.resolve_display_name();
            kernel.files.retain(|f| !exclusions.contains(&f.kind));
            tracing::debug!(%kernel, files = kernel.files.len(), "Found kernel");
        }
        Ok(kernels)
    }
}
