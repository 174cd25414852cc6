//! Classification of the files that make up an installed kernel.

use std::fmt;
use std::fs::{self, File};
use std::hash::{Hash, Hasher};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::consts::{MODULES_DIR, USR_MODULES_DIR};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    #[serde(rename = "kernel")]
    KernelImage,
    Initramfs,
    Modules,
    Build,
    Config,
    Misc,
    #[serde(rename = "emptydir")]
    EmptyDirectory,
}

impl FileKind {
    pub const ALL: [Self; 7] = [
        Self::KernelImage,
        Self::Initramfs,
        Self::Modules,
        Self::Build,
        Self::Config,
        Self::Misc,
        Self::EmptyDirectory,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::KernelImage => "kernel",
            Self::Initramfs => "initramfs",
            Self::Modules => "modules",
            Self::Build => "build",
            Self::Config => "config",
            Self::Misc => "misc",
            Self::EmptyDirectory => "emptydir",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown file kind `{0}`, expected one of: kernel, initramfs, modules, build, config, misc, emptydir")]
pub struct UnknownFileKind(pub String);

impl FromStr for FileKind {
    type Err = UnknownFileKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        (Self::ALL.into_iter())
            .find(|kind| kind.name() == s.trim())
            .ok_or_else(|| UnknownFileKind(s.to_owned()))
    }
}

/// A file (or directory) that belongs to some kernel.
///
/// Identity is the pair of `path` and `kind`; the internal version is
/// extra information read from the file and does not take part in equality.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedFile {
    pub path: PathBuf,
    pub kind: FileKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_version: Option<String>,
}

impl PartialEq for ClassifiedFile {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.kind == other.kind
    }
}

impl Eq for ClassifiedFile {}

impl Hash for ClassifiedFile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
        self.kind.hash(state);
    }
}

impl ClassifiedFile {
    pub fn new<P: Into<PathBuf>>(path: P, kind: FileKind) -> Self {
        Self {
            path: path.into(),
            kind,
            internal_version: None,
        }
    }

    /// A kernel image, with its internal version read from the image header.
    ///
    /// An unreadable or unrecognized header is not an error; the internal
    /// version just stays unset.
    pub fn kernel_image<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let internal_version = match read_internal_version(&path) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(?path, ?e, "Cannot read kernel image header");
                None
            }
        };
        Self {
            path,
            kind: FileKind::KernelImage,
            internal_version,
        }
    }
}

impl fmt::Display for ClassifiedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.path.display())
    }
}

// x86 boot protocol, see Documentation/arch/x86/boot.rst
const SETUP_HEADER_LEN: usize = 0x210;
const HEADER_MAGIC: &[u8] = b"HdrS";
const HEADER_MAGIC_AT: std::ops::Range<usize> = 0x202..0x206;
const KERNEL_VERSION_AT: std::ops::Range<usize> = 0x20E..0x210;
const KERNEL_VERSION_BASE: u64 = 0x200;
const BANNER_MAX_LEN: u64 = 0x100;

/// Read the setup header and return the `kernel_version` pointer.
///
/// `Ok(None)` means "not a bzImage"; `Ok(Some(0))` is a bzImage without a
/// version banner.
fn read_setup_header(file: &mut File) -> io::Result<Option<u16>> {
    let mut header = [0u8; SETUP_HEADER_LEN];
    match file.read_exact(&mut header) {
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        r => r?,
    }
    if header.get(HEADER_MAGIC_AT) != Some(HEADER_MAGIC) {
        return Ok(None);
    }
    Ok((header.get(KERNEL_VERSION_AT))
        .and_then(|b| <[u8; 2]>::try_from(b).ok())
        .map(u16::from_le_bytes))
}

/// Read the version banner embedded in a bzImage.
///
/// The banner looks like `6.9.7-gentoo (root@host) #1 SMP ...`; its first
/// word is the kernel release.
pub fn read_internal_version(path: &Path) -> io::Result<Option<String>> {
    let mut file = File::open(path)?;
    let offset = match read_setup_header(&mut file)? {
        None | Some(0) => return Ok(None),
        Some(ptr) => u64::from(ptr) + KERNEL_VERSION_BASE,
    };
    file.seek(SeekFrom::Start(offset))?;
    let mut banner = Vec::new();
    file.take(BANNER_MAX_LEN).read_to_end(&mut banner)?;

    let banner = banner.split(|&b| b == 0).next().unwrap_or_default();
    Ok(std::str::from_utf8(banner)
        .ok()
        .and_then(|s| s.split_whitespace().next())
        .map(ToOwned::to_owned))
}

fn has_image_magic(path: &Path) -> bool {
    File::open(path)
        .and_then(|mut f| read_setup_header(&mut f))
        .is_ok_and(|header| header.is_some())
}

fn matches_name(name: &str, stem: &str) -> bool {
    name.strip_prefix(stem)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(['-', '.']))
}

fn is_image_name(name: &str) -> bool {
    name == "linux"
        || ["vmlinuz", "vmlinux", "kernel", "bzImage"]
            .iter()
            .any(|stem| matches_name(name, stem))
}

fn is_initramfs_name(name: &str) -> bool {
    matches_name(name, "initrd") || matches_name(name, "initramfs")
}

fn is_config_name(name: &str) -> bool {
    name == "config" || name.starts_with("config-")
}

fn is_modules_root(dir: Option<&Path>) -> bool {
    dir.is_some_and(|d| d.ends_with(MODULES_DIR))
}

/// The root a modules tree at `modules_root` lives in.
fn modules_tree_root(modules_root: &Path) -> Option<&Path> {
    let depth = if modules_root.ends_with(USR_MODULES_DIR) { 3 } else { 2 };
    modules_root.ancestors().nth(depth)
}

/// Where a `build` entry in `<modules root>/<version>/` points.
///
/// The link target is joined onto the module directory without being
/// resolved, so a dangling link is recorded as-is. Absolute targets are
/// taken relative to the root the modules tree belongs to.
fn build_target(path: &Path, meta: &fs::Metadata) -> io::Result<PathBuf> {
    if !meta.file_type().is_symlink() {
        return Ok(path.to_path_buf());
    }
    let target = fs::read_link(path)?;
    let Some(moddir) = path.parent() else {
        return Ok(target);
    };
    if target.is_absolute() {
        let root = moddir.parent().and_then(modules_tree_root);
        if let Some(root) = root {
            return Ok(root.join(target.strip_prefix("/").unwrap_or(&target)));
        }
    }
    Ok(moddir.join(target))
}

/// A `build` entry of a module directory, whatever it is: a symlink, a real
/// directory (empty or not) or a file.
pub fn classify_build(path: &Path) -> io::Result<ClassifiedFile> {
    let meta = fs::symlink_metadata(path)?;
    Ok(ClassifiedFile::new(build_target(path, &meta)?, FileKind::Build))
}

/// Decide what `path` is.
///
/// Symlinks are never followed. `NotFound` is returned as-is so that callers
/// can skip entries that vanished mid-scan.
#[tracing::instrument(level = "trace")]
pub fn classify(path: &Path) -> io::Result<ClassifiedFile> {
    let meta = fs::symlink_metadata(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();

    if meta.is_dir() && fs::read_dir(path)?.next().is_none() {
        return Ok(ClassifiedFile::new(path, FileKind::EmptyDirectory));
    }
    if meta.is_dir() && is_modules_root(path.parent()) {
        return Ok(ClassifiedFile::new(path, FileKind::Modules));
    }
    if name == "build" && is_modules_root(path.parent().and_then(Path::parent)) {
        return classify_build(path);
    }
    if meta.is_dir() {
        return Ok(ClassifiedFile::new(path, FileKind::Misc));
    }
    if is_image_name(&name) || (meta.is_file() && has_image_magic(path)) {
        return Ok(ClassifiedFile::kernel_image(path));
    }
    if is_initramfs_name(&name) {
        return Ok(ClassifiedFile::new(path, FileKind::Initramfs));
    }
    if is_config_name(&name) {
        return Ok(ClassifiedFile::new(path, FileKind::Config));
    }
    Ok(ClassifiedFile::new(path, FileKind::Misc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{make_test_files, write_bz_image};

    #[test]
    fn test_file_kind_names() {
        for kind in FileKind::ALL {
            assert_eq!(kind.name().parse::<FileKind>().unwrap(), kind);
        }
        assert_eq!(" misc".parse::<FileKind>().unwrap(), FileKind::Misc);
        assert_eq!(
            "vmlinuz".parse::<FileKind>(),
            Err(UnknownFileKind("vmlinuz".to_owned()))
        );
    }

    #[test]
    fn test_equality_ignores_internal_version() {
        let mut a = ClassifiedFile::new("/boot/x/1.2.3/linux", FileKind::KernelImage);
        let b = a.clone();
        a.internal_version = Some("1.2.3".to_owned());
        assert_eq!(a, b);
        assert_ne!(a, ClassifiedFile::new("/boot/x/1.2.3/linux", FileKind::Misc));
    }

    #[test]
    fn test_read_internal_version() {
        let td = make_test_files(&["linux", "short", "zeros"]);
        let root = td.path();
        write_bz_image(&root.join("linux"), b"1.2.3 test");
        std::fs::write(root.join("short"), b"HdrS").unwrap();
        std::fs::write(root.join("zeros"), [0u8; 0x400]).unwrap();

        assert_eq!(
            read_internal_version(&root.join("linux")).unwrap().as_deref(),
            Some("1.2.3")
        );
        assert_eq!(read_internal_version(&root.join("short")).unwrap(), None);
        assert_eq!(read_internal_version(&root.join("zeros")).unwrap(), None);
        assert!(read_internal_version(&root.join("missing")).is_err());
    }

    #[test]
    fn test_classify_names() {
        let td = make_test_files(&[
            "boot/vmlinuz-1.2.3",
            "boot/vmlinuz-1.2.3.old",
            "boot/kernel8.img",
            "boot/initramfs-1.2.3.img",
            "boot/initrd",
            "boot/config-1.2.3",
            "boot/System.map-1.2.3",
            "boot/x/1.2.3/linux",
        ]);
        let boot = td.path().join("boot");
        let kind = |p: &str| classify(&boot.join(p)).unwrap().kind;

        assert_eq!(kind("vmlinuz-1.2.3"), FileKind::KernelImage);
        assert_eq!(kind("vmlinuz-1.2.3.old"), FileKind::KernelImage);
        assert_eq!(kind("kernel8.img"), FileKind::Misc);
        assert_eq!(kind("initramfs-1.2.3.img"), FileKind::Initramfs);
        assert_eq!(kind("initrd"), FileKind::Initramfs);
        assert_eq!(kind("config-1.2.3"), FileKind::Config);
        assert_eq!(kind("System.map-1.2.3"), FileKind::Misc);
        assert_eq!(kind("x/1.2.3/linux"), FileKind::KernelImage);
        assert_eq!(kind("x/1.2.3"), FileKind::Misc);
    }

    #[test]
    fn test_classify_image_by_magic() {
        let td = make_test_files(&["boot/x/1.2.3/custom-name"]);
        let path = td.path().join("boot/x/1.2.3/custom-name");
        write_bz_image(&path, b"1.2.3-custom #1 SMP");

        let file = classify(&path).unwrap();
        assert_eq!(file.kind, FileKind::KernelImage);
        assert_eq!(file.internal_version.as_deref(), Some("1.2.3-custom"));
    }

    #[test]
    fn test_classify_unrecognized_image_is_still_an_image() {
        let td = make_test_files(&["boot/x/1.2.3/linux"]);
        let file = classify(&td.path().join("boot/x/1.2.3/linux")).unwrap();
        assert_eq!(file.kind, FileKind::KernelImage);
        assert_eq!(file.internal_version, None);
    }

    #[test]
    fn test_classify_directories() {
        let td = make_test_files(&["lib/modules/1.2.3/test.ko", "usr/src/linux/Makefile"]);
        let root = td.path();
        std::fs::create_dir_all(root.join("lib/modules/1.2.4")).unwrap();

        assert_eq!(
            classify(&root.join("lib/modules/1.2.3")).unwrap(),
            ClassifiedFile::new(root.join("lib/modules/1.2.3"), FileKind::Modules)
        );
        assert_eq!(
            classify(&root.join("lib/modules/1.2.4")).unwrap().kind,
            FileKind::EmptyDirectory
        );
        assert_eq!(
            classify(&root.join("usr/src/linux")).unwrap().kind,
            FileKind::Misc
        );
    }

    #[test]
    fn test_classify_build_by_position() {
        let td = make_test_files(&["lib/modules/1.2.3/test.ko"]);
        let build = td.path().join("lib/modules/1.2.3/build");
        std::fs::create_dir(&build).unwrap();

        // the generic rules see an empty directory
        assert_eq!(classify(&build).unwrap().kind, FileKind::EmptyDirectory);
        assert_eq!(
            classify_build(&build).unwrap(),
            ClassifiedFile::new(&build, FileKind::Build)
        );
        assert_eq!(
            classify_build(&td.path().join("lib/modules/1.2.3/missing"))
                .unwrap_err()
                .kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_classify_build_links() {
        let td = make_test_files(&[
            "lib/modules/1.2.3/test.ko",
            "lib/modules/1.2.2/test.ko",
            "lib/modules/1.2.1/build/Makefile",
            "usr/lib/modules/1.2.0/test.ko",
        ]);
        let root = td.path();
        let modules = root.join("lib/modules");
        std::os::unix::fs::symlink("../../../usr/src/linux", modules.join("1.2.3/build")).unwrap();
        std::os::unix::fs::symlink("/usr/src/linux-1.2.2", modules.join("1.2.2/build")).unwrap();
        std::os::unix::fs::symlink(
            "/usr/src/linux-1.2.0",
            root.join("usr/lib/modules/1.2.0/build"),
        )
        .unwrap();

        // dangling, recorded without resolving
        assert_eq!(
            classify(&modules.join("1.2.3/build")).unwrap(),
            ClassifiedFile::new(modules.join("1.2.3/../../../usr/src/linux"), FileKind::Build)
        );
        // absolute targets stay inside the scanned root
        assert_eq!(
            classify(&modules.join("1.2.2/build")).unwrap().path,
            root.join("usr/src/linux-1.2.2")
        );
        assert_eq!(
            classify(&root.join("usr/lib/modules/1.2.0/build")).unwrap().path,
            root.join("usr/src/linux-1.2.0")
        );
        // a real directory named build is recorded at its own path
        assert_eq!(
            classify(&modules.join("1.2.1/build")).unwrap(),
            ClassifiedFile::new(modules.join("1.2.1/build"), FileKind::Build)
        );
    }

    #[test]
    fn test_classify_missing() {
        let td = make_test_files(&[]);
        let err = classify(&td.path().join("gone")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
