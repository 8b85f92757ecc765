//! Source patching: appended lines, `ed` scripts and unified diffs.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::process::{ensure_exists, Cmd};

/// Append `lines` to `file`, one per line.
pub fn append_lines(file: &Path, lines: &[String]) -> Result<()> {
    let mut f = OpenOptions::new()
        .append(true)
        .open(file)
        .with_context(|| format!("opening {} for appending", file.display()))?;
    for line in lines {
        writeln!(f, "{line}").with_context(|| format!("appending to {}", file.display()))?;
    }
    Ok(())
}

/// Run an `ed` script against `target`, feeding the script on stdin.
pub fn apply_ed_script(ed: &Path, target: &Path, script: &Path) -> Result<()> {
    ensure_exists(script, "ed script")?;
    tracing::trace!("ed {} < {}", target.display(), script.display());
    Cmd::new(ed)
        .arg("-")
        .arg(target)
        .stdin_file(script)
        .error_msg(format!("applying {} to {}", script.display(), target.display()))
        .run()?;
    Ok(())
}

/// Patch `target` in place with `diff`.
pub fn apply_patch(patch: &Path, target: &Path, diff: &Path) -> Result<()> {
    ensure_exists(diff, "patch file")?;
    tracing::trace!("patch {} {}", target.display(), diff.display());
    Cmd::new(patch)
        .arg(target)
        .arg(diff)
        .error_msg(format!("applying {} to {}", diff.display(), target.display()))
        .run()?;
    Ok(())
}

/// A patched copy: `dest` is produced from `source` and `diff`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedFile {
    pub source: PathBuf,
    pub diff: PathBuf,
    pub dest: PathBuf,
}

impl PatchedFile {
    /// Write `dest` with `patch <source> <diff> -o <dest>`.
    ///
    /// Does nothing when `dest` already exists. Returns whether the patch ran.
    pub fn apply(&self, patch: &Path) -> Result<bool> {
        if self.dest.is_file() {
            tracing::trace!("'{}' already patched", self.dest.display());
            return Ok(false);
        }
        ensure_exists(&self.source, "patch source")?;
        ensure_exists(&self.diff, "patch file")?;
        if let Some(parent) = self.dest.parent() {
            crate::filesystem::ensure_dir(parent)?;
        }

        tracing::debug!("Patching '{}'", self.dest.display());
        Cmd::new(patch)
            .arg(&self.source)
            .arg(&self.diff)
            .arg("-o")
            .arg(&self.dest)
            .error_msg(format!("creating {}", self.dest.display()))
            .run()?;
        Ok(true)
    }
}
