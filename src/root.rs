//! Superuser check.

use anyhow::Result;

use crate::error::BuildError;

/// Whether the process runs with an effective uid of 0.
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Fail with [`BuildError::NotRoot`] unless running as root.
pub fn require_root() -> Result<()> {
    check_uid(is_root())
}

fn check_uid(root: bool) -> Result<()> {
    if root {
        Ok(())
    } else {
        Err(BuildError::NotRoot.into())
    }
}
