//! Find and remove obsolete kernel builds.
//!
//! A run detects the [`layout::Layout`] of a system root, groups the files
//! found there into [`kernel::Kernel`]s, decides which of them go with
//! [`prune::plan`] and deletes their files with [`remove::remove_files`].

pub mod cfg;
pub mod cli;
pub mod consts;
pub mod file;
pub mod kernel;
pub mod layout;
pub mod mount;
pub mod prelude;
pub mod prune;
pub mod remove;
pub mod util;
pub mod version;

#[cfg(test)]
mod testutil;

use crate::file::FileKind;
use crate::kernel::Kernel;
use crate::layout::{KernelLayout, LayoutOptions};
use crate::mount::BootMounts;
use crate::prelude::*;
use crate::prune::{RemovalPlan, Retention, SortOrder};
use crate::remove::RemovalReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Prune,
    List { json: bool },
}

/// Everything a run needs to know, after merging flags and config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub root: PathBuf,
    pub layout: Option<String>,
    pub retention: Retention,
    pub sort: SortOrder,
    pub exclusions: HashSet<FileKind>,
    pub pretend: bool,
    pub mount: bool,
    pub action: Action,
}

impl Settings {
    /// Defaults for `root`, as if no flags were given.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            layout: None,
            retention: Retention::default(),
            sort: SortOrder::default(),
            exclusions: HashSet::from([FileKind::Build]),
            pretend: false,
            mount: true,
            action: Action::Prune,
        }
    }
}

#[derive(Debug)]
pub enum Summary {
    Listed { kernels: Vec<Kernel>, json: bool },
    Pruned { plan: RemovalPlan, report: RemovalReport },
}

/// Run the action described by `settings`.
///
/// `/boot` and the ESP stay mounted for the whole run when they had to be
/// mounted.
///
/// # Errors
/// - no layout applies to the root (a [`layout::SystemError`])
/// - scanning or removing files fails
#[tracing::instrument]
pub fn run(settings: &Settings) -> Result<Summary> {
    let system_root = util::sys::is_system_root(&settings.root);
    let mounts = if settings.mount && system_root {
        BootMounts::mount_boot(&settings.root)
    } else {
        BootMounts::none()
    };
    let options = LayoutOptions {
        esp_paths: mounts.esp_paths().to_vec(),
    };

    let layout = layout::detect(&settings.root, settings.layout.as_deref(), &options)?;
    let kernels = (layout.find_kernels(&settings.exclusions))
        .wrap_err_with(|| format!("Cannot scan {} for kernels", settings.root.display()))?;

    if let Action::List { json } = settings.action {
        return Ok(Summary::Listed { kernels, json });
    }

    let running = system_root.then(util::sys::running_kernel).flatten();
    let plan = prune::plan(kernels, settings.retention, settings.sort, running.as_deref());
    if plan.is_empty() {
        tracing::info!("Nothing to remove");
    }
    let report = remove::remove_files(&plan.files(), settings.pretend)?;
    Ok(Summary::Pruned { plan, report })
}
