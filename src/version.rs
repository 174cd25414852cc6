//! Version tokens: normalization, matching and ordering.
//!
//! A version token is the opaque string naming one kernel build, e.g. the
//! `6.9.7-200.fc40.x86_64` in `/boot/<entry-id>/6.9.7-200.fc40.x86_64` or
//! `/lib/modules/6.9.7-200.fc40.x86_64`. Matching compares normalized tokens
//! for exact equality. [`compare`] gives an ordering for retention decisions
//! only and is never used to decide whether two files belong together.

use std::cmp::Ordering;
use std::path::Path;

use itertools::{EitherOrBoth, Itertools};

const PREFIXES: [&str; 8] = [
    "vmlinuz-",
    "vmlinux-",
    "kernel-",
    "bzImage-",
    "initramfs-",
    "initrd-",
    "System.map-",
    "config-",
];
const SUFFIXES: [&str; 3] = [".old", ".img", ".efi"];

/// Reduce a file name, directory name or path to its bare version token.
#[must_use]
pub fn normalize(token: &str) -> &str {
    let base = token.trim_end_matches('/');
    let base = base.rsplit('/').next().unwrap_or(base);
    let base = (PREFIXES.iter())
        .find_map(|prefix| base.strip_prefix(prefix))
        .unwrap_or(base);
    (SUFFIXES.iter())
        .find_map(|suffix| base.strip_suffix(suffix))
        .unwrap_or(base)
}

/// The version token carried by the last component of `path`.
///
/// Returns [`None`] for paths without a UTF-8 file name.
#[must_use]
pub fn token_from_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    Some(normalize(name).to_owned())
}

/// Whether two tokens denote the same kernel build.
#[must_use]
pub fn same_kernel(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Split a token into alternating runs of ASCII digits and everything else.
fn runs(token: &str) -> impl Iterator<Item = &str> {
    let mut rest = token;
    std::iter::from_fn(move || {
        let digit = rest.chars().next()?.is_ascii_digit();
        let end = rest
            .find(|c: char| c.is_ascii_digit() != digit)
            .unwrap_or(rest.len());
        let (run, tail) = rest.split_at(end);
        rest = tail;
        Some(run)
    })
}

fn compare_run(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        // "007" and "7" are the same number but not the same token
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.len().cmp(&b.len())),
        _ => a.cmp(b),
    }
}

/// Order two tokens, older first.
///
/// Digit runs compare numerically, other runs lexically, and a token that
/// extends another sorts after it (`6.1.1` > `6.1`).
#[must_use]
pub fn compare(a: &str, b: &str) -> Ordering {
    runs(normalize(a))
        .zip_longest(runs(normalize(b)))
        .map(|pair| match pair {
            EitherOrBoth::Both(x, y) => compare_run(x, y),
            EitherOrBoth::Left(_) => Ordering::Greater,
            EitherOrBoth::Right(_) => Ordering::Less,
        })
        .find(|ord| ord.is_ne())
        .unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("1.2.3"), "1.2.3");
        assert_eq!(normalize("vmlinuz-6.1.0-gentoo"), "6.1.0-gentoo");
        assert_eq!(normalize("vmlinuz-6.1.0-gentoo.old"), "6.1.0-gentoo");
        assert_eq!(normalize("initramfs-6.1.0.img"), "6.1.0");
        assert_eq!(normalize("System.map-6.1.0"), "6.1.0");
        assert_eq!(normalize("/lib/modules/6.1.0/"), "6.1.0");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_token_from_path() {
        assert_eq!(
            token_from_path(Path::new("/boot/abc/1.2.3")).as_deref(),
            Some("1.2.3")
        );
        assert_eq!(
            token_from_path(Path::new("/boot/config-1.2.3")).as_deref(),
            Some("1.2.3")
        );
        assert_eq!(token_from_path(Path::new("/")), None);
    }

    #[test]
    fn test_same_kernel() {
        assert!(same_kernel("1.2.3", "1.2.3"));
        assert!(same_kernel("vmlinuz-1.2.3", "1.2.3"));
        assert!(same_kernel("/lib/modules/1.2.3", "initrd-1.2.3"));
        // similar is not the same
        assert!(!same_kernel("1.2.3", "1.2.3-r1"));
        assert!(!same_kernel("1.2.3", "1.2.30"));
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare("1.2.3", "1.2.3"), Ordering::Equal);
        assert_eq!(compare("1.2.10", "1.2.9"), Ordering::Greater);
        assert_eq!(compare("6.1", "6.1.1"), Ordering::Less);
        assert_eq!(compare("6.1.0-gentoo", "6.1.0-dist"), Ordering::Greater);
        assert_eq!(compare("vmlinuz-5.15.0", "6.0.0"), Ordering::Less);

        let mut versions = vec!["1.2.10", "1.2.2", "1.10.0", "1.2.3"];
        versions.sort_by(|a, b| compare(a, b));
        assert_eq!(versions, vec!["1.2.2", "1.2.3", "1.2.10", "1.10.0"]);
    }
}
