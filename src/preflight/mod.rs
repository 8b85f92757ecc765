//! Host tool resolution and preflight checks.
//!
//! Every external program a driver runs is looked up here. The default
//! locations are the macOS system paths; each can be replaced through an
//! optional settings key (`curl_bin`, `make_bin`, ...), which is also how the
//! integration tests substitute recording stubs.
//!
//! # Example
//!
//! ```rust,ignore
//! use vendor_builder::preflight::{Tool, Tools};
//!
//! let tools = Tools::from_settings(&settings);
//! tools.check(&[Tool::Curl, Tool::Tar, Tool::Make])?;
//! ```

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::Settings;

/// External programs used by the drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tool {
    Curl,
    Tar,
    Make,
    InstallNameTool,
    Otool,
    Pkgbuild,
    Patch,
    Ed,
    Cc,
    /// Python 2 interpreter that generates tlsssl's `_ssl_data.h`.
    Python,
}

impl Tool {
    pub const ALL: [Tool; 10] = [
        Tool::Curl,
        Tool::Tar,
        Tool::Make,
        Tool::InstallNameTool,
        Tool::Otool,
        Tool::Pkgbuild,
        Tool::Patch,
        Tool::Ed,
        Tool::Cc,
        Tool::Python,
    ];

    /// Default location on the target system.
    pub fn default_path(self) -> &'static str {
        match self {
            Tool::Curl => "/usr/bin/curl",
            Tool::Tar => "/usr/bin/tar",
            Tool::Make => "/usr/bin/make",
            Tool::InstallNameTool => "/usr/bin/install_name_tool",
            Tool::Otool => "/usr/bin/otool",
            Tool::Pkgbuild => "/usr/bin/pkgbuild",
            Tool::Patch => "/usr/bin/patch",
            Tool::Ed => "/bin/ed",
            Tool::Cc => "/usr/bin/cc",
            Tool::Python => "/usr/bin/python",
        }
    }

    /// Optional settings key overriding the location.
    pub fn settings_key(self) -> &'static str {
        match self {
            Tool::Curl => "curl_bin",
            Tool::Tar => "tar_bin",
            Tool::Make => "make_bin",
            Tool::InstallNameTool => "install_name_tool_bin",
            Tool::Otool => "otool_bin",
            Tool::Pkgbuild => "pkgbuild_bin",
            Tool::Patch => "patch_bin",
            Tool::Ed => "ed_bin",
            Tool::Cc => "cc_bin",
            Tool::Python => "tlsssl_python_bin",
        }
    }

    /// Where the tool usually comes from.
    pub fn provided_by(self) -> &'static str {
        match self {
            Tool::Curl | Tool::Tar | Tool::Ed | Tool::Pkgbuild | Tool::Python => {
                "macOS base system"
            }
            Tool::Make
            | Tool::InstallNameTool
            | Tool::Otool
            | Tool::Patch
            | Tool::Cc => "xcode-select --install",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = Path::new(self.default_path())
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");
        write!(f, "{name}")
    }
}

/// Resolved tool locations.
#[derive(Debug, Clone)]
pub struct Tools {
    paths: BTreeMap<Tool, PathBuf>,
}

impl Default for Tools {
    fn default() -> Self {
        let paths = Tool::ALL
            .iter()
            .map(|tool| (*tool, PathBuf::from(tool.default_path())))
            .collect();
        Self { paths }
    }
}

impl Tools {
    /// Default locations, replaced by any `<tool>_bin` settings present.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut tools = Self::default();
        for tool in Tool::ALL {
            if let Some(path) = settings.get_optional(tool.settings_key()) {
                tools.set(tool, path);
            }
        }
        tools
    }

    pub fn set(&mut self, tool: Tool, path: impl Into<PathBuf>) {
        self.paths.insert(tool, path.into());
    }

    pub fn path(&self, tool: Tool) -> &Path {
        self.paths
            .get(&tool)
            .map(PathBuf::as_path)
            .unwrap_or_else(|| Path::new(tool.default_path()))
    }

    /// Check that every tool in `needed` can be executed.
    pub fn check(&self, needed: &[Tool]) -> Result<()> {
        let missing: Vec<Tool> = needed
            .iter()
            .copied()
            .filter(|tool| !command_exists(self.path(*tool)))
            .collect();

        if !missing.is_empty() {
            let msg = missing
                .iter()
                .map(|t| format!("  {} at {} (install: {})", t, self.path(*t).display(), t.provided_by()))
                .collect::<Vec<_>>()
                .join("\n");
            bail!("Missing required host tools:\n{}", msg);
        }

        Ok(())
    }
}

/// Check if a command exists, either as a path or on `PATH`.
pub fn command_exists(cmd: &Path) -> bool {
    if cmd.components().count() > 1 {
        return cmd.is_file();
    }
    which::which(cmd).is_ok()
}
