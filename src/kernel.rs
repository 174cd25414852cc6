use std::fmt;
use std::time::SystemTime;

use serde::Serialize;

use crate::file::{ClassifiedFile, FileKind};

/// All files found for one kernel version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Kernel {
    /// Version token, as found in directory names.
    pub version: String,
    /// Files in discovery order, without duplicates.
    pub files: Vec<ClassifiedFile>,
    /// Release read from the kernel image, or the version token when the
    /// image has no readable banner. [`None`] when no image was found.
    pub display_name: Option<String>,
}

impl Kernel {
    pub fn new<S: Into<String>>(version: S) -> Self {
        Self {
            version: version.into(),
            ..Self::default()
        }
    }

    /// Append `file` unless an equal file is already recorded.
    pub fn push(&mut self, file: ClassifiedFile) {
        if !self.files.contains(&file) {
            self.files.push(file);
        }
    }

    pub fn files_of(&self, kind: FileKind) -> impl Iterator<Item = &ClassifiedFile> {
        self.files.iter().filter(move |f| f.kind == kind)
    }

    #[must_use]
    pub fn image(&self) -> Option<&ClassifiedFile> {
        self.files_of(FileKind::KernelImage).next()
    }

    /// A kernel is an orphan when no image was found for it. Only modules,
    /// initramfs images or leftovers remain.
    ///
    /// This holds even after the image was dropped from [`Self::files`] by
    /// an exclusion, since the display name is resolved before that.
    #[must_use]
    pub const fn is_orphan(&self) -> bool {
        self.display_name.is_none()
    }

    /// Fill in [`Self::display_name`] from the kernel image, if any.
    pub fn resolve_display_name(&mut self) {
        self.display_name = self.image().map(|image| {
            (image.internal_version.clone()).unwrap_or_else(|| self.version.clone())
        });
    }

    /// Modification time used for "newest first" ordering: the image's,
    /// or the newest of all files when there is no image.
    #[must_use]
    pub fn mtime(&self) -> Option<SystemTime> {
        let mtime = |f: &ClassifiedFile| {
            std::fs::symlink_metadata(&f.path)
                .and_then(|m| m.modified())
                .ok()
        };
        match self.image() {
            Some(image) => mtime(image),
            None => self.files.iter().filter_map(mtime).max(),
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) if *name != self.version => write!(f, "{} [{name}]", self.version),
            Some(_) => f.write_str(&self.version),
            None => write!(f, "{} [no kernel image]", self.version),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{make_test_files, write_bz_image};

    #[test]
    fn test_push_dedups() {
        let mut k = Kernel::new("1.2.3");
        k.push(ClassifiedFile::new("/boot/x/1.2.3", FileKind::EmptyDirectory));
        k.push(ClassifiedFile::new("/boot/x/1.2.3/initrd", FileKind::Initramfs));
        k.push(ClassifiedFile::new("/boot/x/1.2.3", FileKind::EmptyDirectory));
        assert_eq!(k.files.len(), 2);
        assert_eq!(k.files[0].kind, FileKind::EmptyDirectory);
    }

    #[test]
    fn test_display_name() {
        let td = make_test_files(&["1.2.3/linux", "1.2.4/linux"]);
        write_bz_image(&td.path().join("1.2.3/linux"), b"1.2.3-internal test");

        let mut k = Kernel::new("1.2.3");
        k.push(ClassifiedFile::kernel_image(td.path().join("1.2.3/linux")));
        k.resolve_display_name();
        assert_eq!(k.display_name.as_deref(), Some("1.2.3-internal"));
        assert_eq!(k.to_string(), "1.2.3 [1.2.3-internal]");

        // unreadable header falls back to the token
        let mut k = Kernel::new("1.2.4");
        k.push(ClassifiedFile::kernel_image(td.path().join("1.2.4/linux")));
        k.resolve_display_name();
        assert_eq!(k.display_name.as_deref(), Some("1.2.4"));
        assert_eq!(k.to_string(), "1.2.4");

        let mut k = Kernel::new("1.2.5");
        k.push(ClassifiedFile::new("/lib/modules/1.2.5", FileKind::Modules));
        k.resolve_display_name();
        assert!(k.is_orphan());
        assert_eq!(k.to_string(), "1.2.5 [no kernel image]");
    }

    #[test]
    fn test_mtime() {
        let td = make_test_files(&["1.2.3/linux", "1.2.3/initrd"]);
        let mut k = Kernel::new("1.2.3");
        assert_eq!(k.mtime(), None);

        k.push(ClassifiedFile::new(td.path().join("1.2.3/initrd"), FileKind::Initramfs));
        assert!(k.mtime().is_some());

        k.push(ClassifiedFile::kernel_image(td.path().join("1.2.3/linux")));
        assert_eq!(
            k.mtime(),
            std::fs::metadata(td.path().join("1.2.3/linux"))
                .unwrap()
                .modified()
                .ok()
        );
    }
}
