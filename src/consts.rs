pub const DEFAULT_CFG_PATH: &str = "/etc/kernprune.toml";
pub const CFG_ENV: &str = "KERNPRUNE_CONFIG";
pub const LOG_ENV: &str = "KERNPRUNE_LOG";

pub const MACHINE_ID_PATH: &str = "etc/machine-id";
pub const ENTRY_TOKEN_PATH: &str = "etc/kernel/entry-token";
pub const MODULES_DIR: &str = "lib/modules";
pub const USR_MODULES_DIR: &str = "usr/lib/modules";
pub const BOOT_DIR: &str = "boot";

/// Mountpoints the mount helper looks up in the target's fstab.
pub const BOOT_MOUNTPOINTS: [&str; 3] = ["/boot", "/efi", "/boot/efi"];
/// The subset of [`BOOT_MOUNTPOINTS`] that hold an EFI System Partition.
pub const ESP_MOUNTPOINTS: [&str; 2] = ["/efi", "/boot/efi"];
