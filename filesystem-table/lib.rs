use std::{path::Path, str::FromStr};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsTableError {
    #[error("Invalid table entry: {0}")]
    InvalidEntry(String),

    #[error("Invalid number conversion: {0}")]
    InvalidNumberConversion(String),

    #[error("Invalid fsck order: {0}")]
    InvalidFsckOrder(u8),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

type Result<T> = std::result::Result<T, FsTableError>;

/// The order in which the filesystems should be checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum FsckOrder {
    /// Never check the filesystem automatically.
    #[default]
    NoCheck = 0,
    /// Check the filesystem while booting.
    Boot = 1,
    /// Check the filesystem after the boot process has finished.
    PostBoot = 2,
}

impl TryFrom<u8> for FsckOrder {
    type Error = FsTableError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::NoCheck),
            1 => Ok(Self::Boot),
            2 => Ok(Self::PostBoot),
            _ => Err(FsTableError::InvalidFsckOrder(value)),
        }
    }
}

impl TryFrom<&str> for FsckOrder {
    type Error = FsTableError;

    fn try_from(value: &str) -> Result<Self> {
        let n = value
            .parse::<u8>()
            .map_err(|e| FsTableError::InvalidNumberConversion(e.to_string()))?;
        Self::try_from(n)
    }
}

/// One line of an fstab-formatted table.
///
/// Both `/etc/fstab` and `/proc/self/mounts` share this format, the latter
/// always carrying all six fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsEntry {
    /// The device spec for mounting the filesystem.
    ///
    /// Can be a device path, or a tag resolved through `/dev/disk/by-*`,
    /// i.e `LABEL=ESP` or `UUID=1234-5678`
    pub device_spec: String,
    /// Where the filesystem is (or should be) mounted.
    ///
    /// A [`None`] value stands for `none`, used by swap and similar entries.
    pub mountpoint: Option<String>,
    /// The filesystem type, e.g. `vfat` or `ext4`.
    pub fs_type: String,
    /// Mount options, split on commas.
    pub options: Vec<String>,
    /// The dump frequency, `0` when the field is omitted.
    pub dump_freq: u8,
    /// Determines when the filesystem health should be checked using `fsck`.
    pub pass: FsckOrder,
}

/// Undo the octal escaping the kernel and `getmntent(3)` apply to
/// whitespace and backslashes (`\040`, `\011`, `\012`, `\134`).
fn unescape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut rest = field;
    while let Some(pos) = rest.find('\\') {
        out.push_str(rest.get(..pos).unwrap_or_default());
        let tail = rest.get(pos + 1..).unwrap_or_default();
        let code = tail
            .get(..3)
            .filter(|digits| digits.bytes().all(|b| (b'0'..=b'7').contains(&b)))
            .and_then(|digits| u8::from_str_radix(digits, 8).ok());
        if let Some(code) = code {
            out.push(char::from(code));
            rest = tail.get(3..).unwrap_or_default();
        } else {
            out.push('\\');
            rest = tail;
        }
    }
    out.push_str(rest);
    out
}

impl FsEntry {
    /// Parse an entry from a single non-comment line.
    pub fn from_line_str(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();

        let [device_spec, mountpoint, fs_type, options, rest @ ..] = parts.as_slice() else {
            return Err(FsTableError::InvalidEntry(line.to_owned()));
        };

        let mountpoint = match *mountpoint {
            "none" => None,
            mp => Some(unescape(mp)),
        };

        let dump_freq = rest
            .first()
            .map(|s| s.parse::<u8>())
            .transpose()
            .map_err(|_| FsTableError::InvalidEntry(line.to_owned()))?
            .unwrap_or_default();
        let pass = rest
            .get(1)
            .map(|s| FsckOrder::try_from(*s))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            device_spec: unescape(device_spec),
            mountpoint,
            fs_type: (*fs_type).to_owned(),
            options: options.split(',').map(ToOwned::to_owned).collect(),
            dump_freq,
            pass,
        })
    }

    /// Whether `opt` appears verbatim among the mount options.
    #[must_use]
    pub fn has_option(&self, opt: &str) -> bool {
        self.options.iter().any(|o| o == opt)
    }
}

#[derive(Debug, Default)]
pub struct FsTable {
    pub entries: Vec<FsEntry>,
}

impl FsTable {
    /// Find the entry mounted (or to be mounted) at `mountpoint`.
    ///
    /// Trailing slashes are ignored on both sides. When a table lists the
    /// same mountpoint twice the last entry wins, matching how stacked mounts
    /// appear in `/proc/self/mounts`.
    #[must_use]
    pub fn find_mountpoint(&self, mountpoint: &str) -> Option<&FsEntry> {
        let wanted = normalize_mountpoint(mountpoint);
        self.entries.iter().rev().find(|entry| {
            (entry.mountpoint.as_deref()).is_some_and(|mp| normalize_mountpoint(mp) == wanted)
        })
    }
}

fn normalize_mountpoint(mp: &str) -> &str {
    match mp.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

impl FromStr for FsTable {
    type Err = FsTableError;

    fn from_str(table: &str) -> Result<Self> {
        let entries = table
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(FsEntry::from_line_str)
            .collect::<Result<Vec<FsEntry>>>()?;

        Ok(Self { entries })
    }
}

/// Read `etc/fstab` relative to `root`.
pub fn read_fstab(root: &Path) -> Result<FsTable> {
    let fstab = std::fs::read_to_string(root.join("etc/fstab"))?;
    FsTable::from_str(&fstab)
}

/// Read the mount table of the calling process.
pub fn read_mounts() -> Result<FsTable> {
    let mounts = std::fs::read_to_string("/proc/self/mounts")?;
    FsTable::from_str(&mounts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fstab_parse() {
        let line = "UUID=ABCD-1234\t/efi\tvfat\tumask=0077,noauto\t0\t2";
        let entry = FsEntry::from_line_str(line).unwrap();

        assert_eq!(entry.device_spec, "UUID=ABCD-1234");
        assert_eq!(entry.mountpoint.as_deref(), Some("/efi"));
        assert_eq!(entry.fs_type, "vfat");
        assert_eq!(entry.options, vec!["umask=0077", "noauto"]);
        assert!(entry.has_option("noauto"));
        assert!(!entry.has_option("umask"));
        assert_eq!(entry.dump_freq, 0);
        assert_eq!(entry.pass, FsckOrder::PostBoot);
    }

    #[test]
    fn test_optional_trailing_fields() {
        let entry = FsEntry::from_line_str("/dev/sda1 /boot ext4 defaults").unwrap();
        assert_eq!(entry.dump_freq, 0);
        assert_eq!(entry.pass, FsckOrder::NoCheck);
    }

    #[test]
    fn test_swap_has_no_mountpoint() {
        let entry = FsEntry::from_line_str("/dev/sda2 none swap sw 0 0").unwrap();
        assert_eq!(entry.mountpoint, None);
    }

    #[test]
    fn test_invalid_entries() {
        assert!(matches!(
            FsEntry::from_line_str("/dev/sda1 /boot"),
            Err(FsTableError::InvalidEntry(_))
        ));
        assert!(matches!(
            FsEntry::from_line_str("/dev/sda1 /boot ext4 defaults 0 7"),
            Err(FsTableError::InvalidFsckOrder(7))
        ));
    }

    #[test]
    fn test_table_skips_comments() {
        let table = FsTable::from_str(
            "# /etc/fstab\n\
             \n\
             UUID=1111 /     btrfs subvol=root 0 0\n\
             UUID=2222 /boot ext4  defaults    1 2\n\
             # UUID=3333 /efi vfat defaults 0 2\n",
        )
        .unwrap();

        assert_eq!(table.entries.len(), 2);
        assert_eq!(
            table.find_mountpoint("/boot/").map(|e| e.device_spec.as_str()),
            Some("UUID=2222")
        );
        assert!(table.find_mountpoint("/efi").is_none());
        assert!(table.find_mountpoint("/").is_some());
    }

    #[test]
    fn test_mounts_unescape() {
        let table =
            FsTable::from_str("/dev/sdb1 /run/media/my\\040disk vfat rw,relatime 0 0\n").unwrap();
        assert!(table.find_mountpoint("/run/media/my disk").is_some());
        assert_eq!(unescape("a\\134b\\x"), "a\\b\\x");
    }

    #[test]
    fn test_last_mount_wins() {
        let table = FsTable::from_str(
            "/dev/sda1 /boot ext4 rw 0 0\n\
             systemd-1 /boot autofs rw 0 0\n",
        )
        .unwrap();
        assert_eq!(
            table.find_mountpoint("/boot").map(|e| e.fs_type.as_str()),
            Some("autofs")
        );
    }

    #[test]
    fn test_read_fstab_from_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_fstab(dir.path()),
            Err(FsTableError::IoError(_))
        ));

        std::fs::create_dir_all(dir.path().join("etc")).unwrap();
        std::fs::write(
            dir.path().join("etc/fstab"),
            "LABEL=ESP /efi vfat defaults 0 2\n",
        )
        .unwrap();

        let table = read_fstab(dir.path()).unwrap();
        assert_eq!(table.entries.len(), 1);
    }
}
