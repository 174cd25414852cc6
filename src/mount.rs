//! Mounting `/boot` and the ESP for the duration of a run.
//!
//! Boot partitions are often `noauto` or automounted, so the boot entry
//! directory may not be visible when we start. Everything listed for
//! [`BOOT_MOUNTPOINTS`] in the fstab that is not mounted yet gets mounted
//! here, and unmounted again when the [`BootMounts`] guard is dropped.

use std::path::{Path, PathBuf};

use filesystem_table::{FsEntry, FsTable};
use sys_mount::MountFlags;

use crate::consts::{BOOT_MOUNTPOINTS, ESP_MOUNTPOINTS};

/// Mounts made by this process, unmounted in reverse order on drop.
#[derive(Debug, Default)]
pub struct BootMounts {
    mounted: Vec<PathBuf>,
    esp_paths: Vec<PathBuf>,
}

/// Resolve an fstab device spec to a device node.
fn resolve_device(spec: &str) -> PathBuf {
    let by = |dir: &str, value: &str| {
        Path::new("/dev/disk")
            .join(dir)
            .join(value.trim_matches('"'))
    };
    match spec.split_once('=') {
        Some(("UUID", v)) => by("by-uuid", v),
        Some(("PARTUUID", v)) => by("by-partuuid", v),
        Some(("LABEL", v)) => by("by-label", v),
        Some(("PARTLABEL", v)) => by("by-partlabel", v),
        _ => PathBuf::from(spec),
    }
}

/// Split fstab options into mount flags and filesystem specific data.
///
/// Options only meaningful to `mount(8)` itself are dropped.
fn split_options(entry: &FsEntry) -> (MountFlags, String) {
    let mut flags = MountFlags::empty();
    let mut data = vec![];
    for opt in &entry.options {
        match opt.as_str() {
            "ro" => flags |= MountFlags::RDONLY,
            "nosuid" => flags |= MountFlags::NOSUID,
            "nodev" => flags |= MountFlags::NODEV,
            "noexec" => flags |= MountFlags::NOEXEC,
            "noatime" => flags |= MountFlags::NOATIME,
            "nodiratime" => flags |= MountFlags::NODIRATIME,
            "relatime" => flags |= MountFlags::RELATIME,
            "sync" => flags |= MountFlags::SYNCHRONOUS,
            "defaults" | "rw" | "auto" | "noauto" | "user" | "nouser" | "users" | "nofail"
            | "_netdev" => {}
            o if o.starts_with("x-") || o.starts_with("comment=") => {}
            o => data.push(o),
        }
    }
    (flags, data.join(","))
}

/// Entries of `fstab` for the boot mountpoints that still need mounting.
fn pending<'a>(fstab: &'a FsTable, mounts: &FsTable) -> Vec<&'a FsEntry> {
    BOOT_MOUNTPOINTS
        .iter()
        .filter_map(|mp| fstab.find_mountpoint(mp))
        .filter(|entry| {
            let mp = entry.mountpoint.as_deref().unwrap_or_default();
            if entry.has_option("noauto") {
                tracing::debug!(mp, "Skipping noauto entry");
                return false;
            }
            if mounts.find_mountpoint(mp).is_some() {
                tracing::debug!(mp, "Already mounted");
                return false;
            }
            true
        })
        .collect()
}

/// ESP mountpoints from `fstab` that are mounted according to `mounts`.
fn esp_candidates(fstab: &FsTable, mounts: &FsTable) -> Vec<PathBuf> {
    ESP_MOUNTPOINTS
        .iter()
        .filter(|mp| fstab.find_mountpoint(mp).is_some())
        .filter(|mp| mounts.find_mountpoint(mp).is_some())
        .map(PathBuf::from)
        .collect()
}

fn mount_entry(entry: &FsEntry) -> std::io::Result<PathBuf> {
    let target = PathBuf::from(entry.mountpoint.as_deref().unwrap_or_default());
    let source = resolve_device(&entry.device_spec);
    let (flags, data) = split_options(entry);

    tracing::info!(?source, ?target, fs_type = %entry.fs_type, "Mounting");
    std::fs::create_dir_all(&target)?;

    let builder = sys_mount::Mount::builder().flags(flags).data(&data);
    let builder = match entry.fs_type.as_str() {
        "auto" | "" => builder,
        fs_type => builder.fstype(fs_type),
    };
    builder.mount(&source, &target)?;
    Ok(target)
}

impl BootMounts {
    /// A guard that mounted nothing and offers no ESP candidates.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Mount the boot partitions listed in `root`'s fstab.
    ///
    /// A missing or unreadable fstab and failed mounts are logged and
    /// otherwise ignored; the scan just sees whatever is mounted.
    #[tracing::instrument]
    pub fn mount_boot(root: &Path) -> Self {
        let fstab = match filesystem_table::read_fstab(root) {
            Ok(fstab) => fstab,
            Err(e) => {
                tracing::warn!(?e, "Cannot read fstab, not mounting anything");
                return Self::none();
            }
        };
        let mounts = match filesystem_table::read_mounts() {
            Ok(mounts) => mounts,
            Err(e) => {
                tracing::warn!(?e, "Cannot read the mount table, not mounting anything");
                return Self::none();
            }
        };

        let mut this = Self::none();
        for entry in pending(&fstab, &mounts) {
            match mount_entry(entry) {
                Ok(target) => this.mounted.push(target),
                Err(e) => tracing::warn!(?e, ?entry, "Cannot mount boot partition"),
            }
        }

        let mounts = filesystem_table::read_mounts().unwrap_or(mounts);
        this.esp_paths = esp_candidates(&fstab, &mounts);
        tracing::debug!(esp = ?this.esp_paths, mounted = ?this.mounted, "Boot mounts ready");
        this
    }

    /// Mounted ESPs, to be probed for boot entries.
    #[must_use]
    pub fn esp_paths(&self) -> &[PathBuf] {
        &self.esp_paths
    }

    #[must_use]
    pub fn mounted(&self) -> &[PathBuf] {
        &self.mounted
    }
}

impl Drop for BootMounts {
    fn drop(&mut self) {
        for target in self.mounted.drain(..).rev() {
            tracing::info!(?target, "Unmounting");
            if let Err(e) = nix::mount::umount(&target) {
                tracing::warn!(?e, ?target, "Cannot unmount");
            }
        }
    }
}
