//! Error taxonomy for the build drivers.
//!
//! Library functions return `anyhow::Result` with context attached at each
//! step. Where a failure belongs to one of the categories below, a
//! [`BuildError`] sits at the root of the chain so the entry point and tests
//! can tell them apart with `downcast_ref`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("download of '{url}' failed with exit code {code}")]
    Transfer { url: String, code: i32 },

    #[error(
        "hash verification of '{name}' failed: download hash '{actual}' does not match config hash '{expected}'"
    )]
    HashMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("{tool} failed with exit code {code}: {detail}")]
    ToolFailed {
        tool: String,
        code: i32,
        detail: String,
    },

    #[error("You must run this as root!")]
    NotRoot,

    #[error("configuration key '{0}' is not defined in the DEFAULT section")]
    MissingKey(String),

    #[error("configuration key '{0}' must not be empty")]
    EmptyKey(String),

    #[error("{what} must exist at '{}' before this step", path.display())]
    MissingPrerequisite { what: String, path: PathBuf },
}

impl BuildError {
    pub(crate) fn tool(tool: impl Into<String>, code: i32, detail: impl Into<String>) -> Self {
        BuildError::ToolFailed {
            tool: tool.into(),
            code,
            detail: detail.into(),
        }
    }
}
