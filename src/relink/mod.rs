//! Rewriting Mach-O install names.
//!
//! Libraries built into a staging prefix record that prefix as their own id
//! and in every reference between them. Before packaging, the ids and
//! references are pointed at the final install location with
//! `install_name_tool`. `otool -L` is used to discover existing references.

use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::process::Cmd;

/// One `install_name_tool` edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relink {
    /// Set the recorded id of a shared library.
    Id { lib: PathBuf, id: String },
    /// Replace a dependency reference inside `target`.
    Change {
        target: PathBuf,
        old: String,
        new: String,
    },
}

impl Relink {
    pub fn id(lib: impl Into<PathBuf>, id: impl Into<String>) -> Self {
        Relink::Id {
            lib: lib.into(),
            id: id.into(),
        }
    }

    pub fn change(target: impl Into<PathBuf>, old: impl Into<String>, new: impl Into<String>) -> Self {
        Relink::Change {
            target: target.into(),
            old: old.into(),
            new: new.into(),
        }
    }

    fn command(&self, install_name_tool: &Path) -> Cmd {
        match self {
            Relink::Id { lib, id } => Cmd::new(install_name_tool).arg("-id").arg(id).arg(lib),
            Relink::Change { target, old, new } => Cmd::new(install_name_tool)
                .arg("-change")
                .arg(old)
                .arg(new)
                .arg(target),
        }
    }
}

impl fmt::Display for Relink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relink::Id { lib, id } => write!(f, "id of {} -> {}", lib.display(), id),
            Relink::Change { target, old, new } => {
                write!(f, "reference in {}: {} -> {}", target.display(), old, new)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Relinker {
    install_name_tool: PathBuf,
    otool: PathBuf,
}

impl Relinker {
    pub fn new(install_name_tool: impl Into<PathBuf>, otool: impl Into<PathBuf>) -> Self {
        Self {
            install_name_tool: install_name_tool.into(),
            otool: otool.into(),
        }
    }

    /// Apply `edits` in order, stopping at the first failure.
    pub fn apply(&self, edits: &[Relink]) -> Result<()> {
        let total = edits.len();
        for (i, edit) in edits.iter().enumerate() {
            tracing::debug!("Linking {}/{}...", i + 1, total);
            tracing::trace!("{edit}");
            edit.command(&self.install_name_tool)
                .error_msg(format!("relinking {edit}"))
                .run()?;
        }
        Ok(())
    }

    /// Libraries `binary` links against, as reported by `otool -L`.
    pub fn linked_libraries(&self, binary: &Path) -> Result<Vec<String>> {
        let out = Cmd::new(&self.otool)
            .arg("-L")
            .arg(binary)
            .error_msg(format!("listing libraries of {}", binary.display()))
            .run()?;
        Ok(parse_otool_libraries(out.stdout.as_deref().unwrap_or("")))
    }

    /// The first library of `binary` whose file name starts with `prefix`.
    pub fn find_dependency(&self, binary: &Path, prefix: &str) -> Result<String> {
        let libs = self.linked_libraries(binary)?;
        find_library(&libs, prefix)
            .map(str::to_string)
            .with_context(|| format!("{} does not link against {prefix}", binary.display()))
    }
}

/// Parse `otool -L` output into the listed library paths.
///
/// The first line names the inspected file; each dependency follows on its
/// own tab-indented line as `<path> (compatibility version ...)`.
pub fn parse_otool_libraries(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.starts_with('\t') || line.starts_with(' '))
        .filter_map(|line| {
            let line = line.trim();
            let path = match line.find(" (") {
                Some(idx) => &line[..idx],
                None => line,
            };
            (!path.is_empty()).then(|| path.to_string())
        })
        .collect()
}

/// Absolute library path whose file name starts with `prefix` and ends in `.dylib`.
pub fn find_library<'a>(libs: &'a [String], prefix: &str) -> Option<&'a str> {
    libs.iter().map(String::as_str).find(|lib| {
        let name = Path::new(lib)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("");
        lib.starts_with('/') && name.starts_with(prefix) && name.ends_with(".dylib")
    })
}
