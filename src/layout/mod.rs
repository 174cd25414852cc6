//! On-disk layouts kernels can be installed in.
//!
//! Every layout is a variant of [`Layout`] implementing [`KernelLayout`].
//! A layout is picked by trial construction: constructors fail with
//! [`LayoutNotFound`] when the root does not follow their convention, and
//! [`detect`] moves on to the next one. Any other [`LayoutError`] ends the
//! detection.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use color_eyre::Result;
use enum_dispatch::enum_dispatch;

use crate::file::FileKind;
use crate::kernel::Kernel;

pub mod blspec;

pub use blspec::BlSpecLayout;

/// The root does not follow a layout's convention.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct LayoutNotFound {
    pub reason: String,
}

impl LayoutNotFound {
    pub fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Why a layout could not be constructed.
#[derive(thiserror::Error, Debug)]
pub enum LayoutError {
    #[error(transparent)]
    NotFound(#[from] LayoutNotFound),
    #[error("Cannot read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum SystemError {
    #[error("The requested layout `{name}` does not apply to {}", root.display())]
    LayoutNotApplicable {
        name: &'static str,
        root: PathBuf,
        #[source]
        source: LayoutNotFound,
    },
    #[error("Unknown layout `{name}`, known layouts: {known}")]
    UnknownLayout { name: String, known: String },
    #[error("No known layout matches {}", root.display())]
    NoLayoutFound { root: PathBuf },
    #[error("Cannot read {} while detecting the layout", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Inputs a layout may need besides the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutOptions {
    /// Mounted EFI System Partitions, probed before the root's own `boot/`.
    pub esp_paths: Vec<PathBuf>,
}

#[enum_dispatch(Layout)]
pub trait KernelLayout {
    fn name(&self) -> &'static str;

    fn root(&self) -> &Path;

    /// Scan the root and group everything found by kernel version.
    ///
    /// Files whose kind is in `exclusions` are left out of the result.
    fn find_kernels(&self, exclusions: &HashSet<FileKind>) -> Result<Vec<Kernel>>;
}

#[enum_dispatch]
#[derive(Debug)]
pub enum Layout {
    BlSpecLayout,
}

type Constructor = fn(&Path, &LayoutOptions) -> std::result::Result<Layout, LayoutError>;

fn construct_blspec(root: &Path, options: &LayoutOptions) -> std::result::Result<Layout, LayoutError> {
    BlSpecLayout::new(root, options).map(Layout::from)
}

/// Known layouts, most specific convention first.
const LAYOUTS: [(&str, Constructor); 1] = [(BlSpecLayout::NAME, construct_blspec)];

#[must_use]
pub fn known_layouts() -> Vec<&'static str> {
    LAYOUTS.iter().map(|(name, _)| *name).collect()
}

/// Pick the layout for `root`.
///
/// When `requested` names a layout, only that one is tried and its failure
/// is fatal. Otherwise every known layout is tried in priority order.
///
/// # Errors
/// - `requested` is not a known layout
/// - the requested layout does not apply to `root`
/// - no layout applies to `root`
/// - a file a layout looks at exists but cannot be read
#[tracing::instrument(skip(options))]
pub fn detect(
    root: &Path,
    requested: Option<&str>,
    options: &LayoutOptions,
) -> std::result::Result<Layout, SystemError> {
    if let Some(requested) = requested {
        let Some(&(name, construct)) = LAYOUTS.iter().find(|(name, _)| *name == requested) else {
            return Err(SystemError::UnknownLayout {
                name: requested.to_owned(),
                known: known_layouts().join(", "),
            });
        };
        return construct(root, options).map_err(|e| match e {
            LayoutError::NotFound(source) => SystemError::LayoutNotApplicable {
                name,
                root: root.to_path_buf(),
                source,
            },
            LayoutError::Io { path, source } => SystemError::Unreadable { path, source },
        });
    }

    for (name, construct) in LAYOUTS {
        match construct(root, options) {
            Ok(layout) => {
                tracing::info!(layout = name, "Detected layout");
                return Ok(layout);
            }
            Err(LayoutError::NotFound(reason)) => {
                tracing::debug!(layout = name, %reason, "Layout does not apply");
            }
            Err(LayoutError::Io { path, source }) => {
                return Err(SystemError::Unreadable { path, source });
            }
        }
    }
    Err(SystemError::NoLayoutFound {
        root: root.to_path_buf(),
    })
}
