//! Deciding which kernels go.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::file::ClassifiedFile;
use crate::kernel::Kernel;
use crate::util::fs::identity;
use crate::version::{self, same_kernel};

/// Which kernels a run removes.
///
/// Kernels without an image are removed in every mode, and the running
/// kernel is never removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Retention {
    /// Only remove kernels without an image.
    #[default]
    Orphans,
    /// Remove every kernel.
    All,
    /// Keep this many of the newest kernels.
    Newest(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// By version token, see [`version::compare`].
    #[default]
    Version,
    /// By modification time of the kernel image.
    Mtime,
}

impl SortOrder {
    /// Order `a` and `b` newest first. Ties are broken by version.
    fn newest_first(self, a: &Kernel, b: &Kernel) -> Ordering {
        let by_version = || version::compare(&b.version, &a.version);
        match self {
            Self::Version => by_version(),
            Self::Mtime => b.mtime().cmp(&a.mtime()).then_with(by_version),
        }
    }
}

/// Outcome of [`plan`]: every kernel ends up in exactly one of the lists,
/// in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalPlan {
    pub remove: Vec<Kernel>,
    pub keep: Vec<Kernel>,
}

impl RemovalPlan {
    /// Files of the kernels to remove, without duplicates and without
    /// anything a kept kernel refers to as well (e.g. a shared build tree).
    #[must_use]
    pub fn files(&self) -> Vec<ClassifiedFile> {
        let kept: HashSet<PathBuf> = (self.keep.iter())
            .flat_map(|k| &k.files)
            .map(|f| identity(&f.path))
            .collect();
        let mut seen = HashSet::new();
        (self.remove.iter())
            .flat_map(|k| &k.files)
            .filter(|f| {
                let id = identity(&f.path);
                if kept.contains(&id) {
                    tracing::debug!(path = ?f.path, "Still used by a kept kernel");
                    return false;
                }
                seen.insert(id)
            })
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty()
    }
}

fn is_running(kernel: &Kernel, running: Option<&str>) -> bool {
    running.is_some_and(|running| {
        same_kernel(&kernel.version, running)
            || (kernel.display_name.as_deref()).is_some_and(|name| same_kernel(name, running))
    })
}

/// Split `kernels` into the ones to remove and the ones to keep.
#[tracing::instrument(skip(kernels), fields(kernels = kernels.len()))]
pub fn plan(
    kernels: Vec<Kernel>,
    retention: Retention,
    sort: SortOrder,
    running: Option<&str>,
) -> RemovalPlan {
    let mut keep_idx = HashSet::new();
    match retention {
        Retention::All => {}
        Retention::Orphans => {
            let imaged = kernels.iter().enumerate().filter(|(_, k)| !k.is_orphan());
            keep_idx.extend(imaged.map(|(i, _)| i));
        }
        Retention::Newest(n) => {
            let mut imaged = (kernels.iter().enumerate())
                .filter(|(_, k)| !k.is_orphan() && !is_running(k, running))
                .collect::<Vec<_>>();
            imaged.sort_by(|(_, a), (_, b)| sort.newest_first(a, b));
            keep_idx.extend(imaged.into_iter().take(n).map(|(i, _)| i));
        }
    }

    let mut plan = RemovalPlan::default();
    for (i, kernel) in kernels.into_iter().enumerate() {
        if is_running(&kernel, running) {
            tracing::info!(%kernel, "Keeping the running kernel");
            plan.keep.push(kernel);
        } else if keep_idx.contains(&i) {
            plan.keep.push(kernel);
        } else {
            tracing::debug!(%kernel, "Selected for removal");
            plan.remove.push(kernel);
        }
    }
    plan
}
