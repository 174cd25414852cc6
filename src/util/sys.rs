//! QoL Utilities for querying the running system

/// Release string of the running kernel, as reported by `uname(2)`.
///
/// This is the same string `kernel-install` uses to name the per-version
/// boot entry directory, so it can be matched against version tokens.
#[tracing::instrument]
pub fn running_kernel() -> Option<String> {
    match nix::sys::utsname::uname() {
        Ok(uts) => {
            let release = uts.release().to_string_lossy().into_owned();
            tracing::debug!(?release, "Running kernel");
            Some(release)
        }
        Err(e) => {
            tracing::warn!(?e, "Cannot determine the running kernel");
            None
        }
    }
}

/// Whether `root` is the root of the running system.
pub fn is_system_root(root: &std::path::Path) -> bool {
    std::fs::canonicalize(root).is_ok_and(|p| p == std::path::Path::new("/"))
}

// Also, fail compilation on non-Linux platforms
#[cfg(not(target_os = "linux"))]
compile_error!("kernprune only supports Linux, these functions are Linux-specific.");
