//! Command line arguments and how they combine with the config file.

use std::collections::HashSet;
use std::path::PathBuf;

use clap::Parser;

use crate::cfg::KernpruneConfig;
use crate::file::FileKind;
use crate::prune::{Retention, SortOrder};
use crate::{Action, Settings};

/// Remove obsolete kernel builds from boot loader spec systems.
///
/// By default only kernels whose image is gone are removed. The running
/// kernel is always kept.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "kernprune", version, about, long_about = None)]
pub struct Cli {
    /// Root of the system to clean up
    #[arg(long, default_value = "/")]
    pub root: PathBuf,

    /// Use this layout instead of detecting one
    #[arg(long, value_name = "NAME")]
    pub layout: Option<String>,

    /// Remove all kernels but the running one
    #[arg(short, long, conflicts_with = "num")]
    pub all: bool,

    /// Keep this many of the newest kernels
    #[arg(short, long, value_name = "N", value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    pub num: Option<usize>,

    /// How to tell which kernels are the newest
    #[arg(short, long, value_enum)]
    pub sort_order: Option<SortOrder>,

    /// File kinds to never remove
    #[arg(short = 'x', long, value_delimiter = ',', value_name = "KIND")]
    pub exclude: Vec<FileKind>,

    /// Also remove the build trees kernels were compiled in
    #[arg(short, long)]
    pub destructive: bool,

    /// Only print what would be removed
    #[arg(short, long)]
    pub pretend: bool,

    /// List kernels instead of removing any
    #[arg(short, long)]
    pub list_kernels: bool,

    /// Print the kernel list as JSON
    #[arg(long, requires = "list_kernels")]
    pub json: bool,

    /// Do not mount /boot or the ESP
    #[arg(long)]
    pub no_mount: bool,

    /// Log debug messages
    #[arg(short = 'D', long)]
    pub debug: bool,
}

impl Cli {
    /// Merge with `cfg`. Flags given on the command line win.
    #[must_use]
    pub fn into_settings(self, cfg: KernpruneConfig) -> Settings {
        let prune = cfg.prune;
        let retention = if self.all {
            Retention::All
        } else if let Some(n) = self.num {
            Retention::Newest(n)
        } else if prune.all {
            Retention::All
        } else {
            prune.num.map_or(Retention::Orphans, Retention::Newest)
        };

        let mut exclusions: HashSet<FileKind> = (prune.exclude.into_iter())
            .chain(self.exclude)
            .collect();
        if !(self.destructive || prune.destructive) {
            exclusions.insert(FileKind::Build);
        }

        Settings {
            root: self.root,
            layout: self.layout.or(prune.layout),
            retention,
            sort: self.sort_order.unwrap_or(prune.sort),
            exclusions,
            pretend: self.pretend,
            mount: cfg.mount.enabled && !self.no_mount,
            action: if self.list_kernels {
                Action::List { json: self.json }
            } else {
                Action::Prune
            },
        }
    }
}
