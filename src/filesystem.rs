//! Filesystem helpers shared by the drivers.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Remove `dir` if present and create it empty.
pub fn recreate_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)
            .with_context(|| format!("Failed to remove directory: {}", dir.display()))?;
    }
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))
}

/// Create `dir` and its parents if missing.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))
}

/// Join an absolute install path under a staging root.
///
/// `under_root("/tmp/build", "/Library/ITOps")` is `/tmp/build/Library/ITOps`.
pub fn under_root(root: &Path, absolute: &str) -> PathBuf {
    root.join(absolute.trim_start_matches('/'))
}

/// Recursively copy a directory, preserving symlinks.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    ensure_dir(dst)?;

    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry =
            entry.with_context(|| format!("Failed to read directory: {}", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("{} is outside {}", entry.path().display(), src.display()))?;
        let dst_path = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            if dst_path.exists() || dst_path.is_symlink() {
                fs::remove_file(&dst_path)?;
            }
            std::os::unix::fs::symlink(&target, &dst_path)
                .with_context(|| format!("Failed to create symlink: {}", dst_path.display()))?;
        } else if file_type.is_dir() {
            ensure_dir(&dst_path)?;
        } else {
            fs::copy(entry.path(), &dst_path)
                .with_context(|| format!("Failed to copy file: {}", entry.path().display()))?;
        }
    }

    Ok(())
}

/// Copy a single file into `dst_dir`, keeping its name.
pub fn copy_into(src: &Path, dst_dir: &Path) -> Result<PathBuf> {
    let name = src
        .file_name()
        .with_context(|| format!("{} has no file name", src.display()))?;
    ensure_dir(dst_dir)?;
    let dst = dst_dir.join(name);
    fs::copy(src, &dst)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
    Ok(dst)
}

/// Add or remove the owner write bit on `path`.
pub fn set_owner_writable(path: &Path, writable: bool) -> Result<()> {
    let mut perms = fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .permissions();
    let mode = perms.mode();
    perms.set_mode(if writable { mode | 0o200 } else { mode & !0o200 });
    fs::set_permissions(path, perms)
        .with_context(|| format!("Failed to change permissions of {}", path.display()))
}

/// Move a file by renaming, falling back to copy+delete across filesystems.
pub fn atomic_move(src: &Path, dst: &Path) -> Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(src, dst)
                .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
            fs::remove_file(src)
                .with_context(|| format!("Failed to remove {}", src.display()))?;
            Ok(())
        }
    }
}
