//! File copying, permissions and the libsharpyuv alias.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Versioned file name webp installs for libsharpyuv.
pub const SHARPYUV_VERSIONED: &str = "libsharpyuv.0.1.2.dylib";

/// Name some consumers link against instead.
pub const SHARPYUV_ALIAS: &str = "libsharpyuv.0.dylib";

/// What [`copy_library_if_changed`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStatus {
    Copied,
    /// A file of the same size was already there.
    Unchanged,
}

/// Give a bundled binary mode 0755 so the loader accepts it.
pub fn make_executable(path: &Path) -> Result<()> {
    let mut perms = fs::metadata(path)
        .with_context(|| format!("Failed to read metadata: {}", path.display()))?
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)
        .with_context(|| format!("Failed to set permissions: {}", path.display()))?;
    Ok(())
}

/// Copy `src` to `dest` and mark it executable.
pub fn copy_executable(src: &Path, dest: &Path) -> Result<()> {
    fs::copy(src, dest)
        .with_context(|| format!("Failed to copy {} -> {}", src.display(), dest.display()))?;
    make_executable(dest)
}

/// Copy a library unless `dest` already holds a file of the same size.
pub fn copy_library_if_changed(src: &Path, dest: &Path) -> Result<CopyStatus> {
    let src_len = fs::metadata(src)
        .with_context(|| format!("Failed to read metadata: {}", src.display()))?
        .len();

    if let Ok(existing) = fs::metadata(dest) {
        if existing.len() == src_len {
            return Ok(CopyStatus::Unchanged);
        }
    }

    copy_executable(src, dest)?;
    Ok(CopyStatus::Copied)
}

/// Create `link` pointing at `target` unless something already sits at
/// `link`, including a dangling symlink left by an earlier run.
///
/// Returns `Ok(true)` only when a new link was made.
pub fn create_symlink_if_missing(target: &Path, link: &Path) -> Result<bool> {
    if link.exists() || link.is_symlink() {
        return Ok(false);
    }
    std::os::unix::fs::symlink(target, link).with_context(|| {
        format!(
            "Failed to create symlink {} -> {}",
            link.display(),
            target.display()
        )
    })?;
    Ok(true)
}

/// Link `libsharpyuv.0.dylib` to the versioned file when only the latter
/// was bundled. The link target is relative.
pub fn apply_sharpyuv_alias(frameworks: &Path) -> Result<bool> {
    if !frameworks.join(SHARPYUV_VERSIONED).exists() {
        return Ok(false);
    }
    create_symlink_if_missing(
        Path::new(SHARPYUV_VERSIONED),
        &frameworks.join(SHARPYUV_ALIAS),
    )
}
