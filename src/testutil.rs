//! Fixtures shared by the unit tests.

use std::path::Path;

use tempfile::TempDir;

/// Create a temporary root holding an empty file at each of `paths`.
pub fn make_test_files(paths: &[&str]) -> TempDir {
    let td = tempfile::Builder::new()
        .prefix("kernprune-test")
        .tempdir()
        .unwrap();
    for p in paths {
        let path = td.path().join(p);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"").unwrap();
    }
    td
}

/// Write a file that looks enough like a bzImage for the header reader.
pub fn write_bz_image(path: &Path, version_line: &[u8]) {
    const BANNER_AT: usize = 0x1000;
    let mut buf = vec![0u8; BANNER_AT + version_line.len() + 1];
    buf[0x202..0x206].copy_from_slice(b"HdrS");
    let ptr = u16::try_from(BANNER_AT - 0x200).unwrap();
    buf[0x20E..0x210].copy_from_slice(&ptr.to_le_bytes());
    buf[BANNER_AT..BANNER_AT + version_line.len()].copy_from_slice(version_line);
    std::fs::write(path, buf).unwrap();
}
