//! Installer packaging with `pkgbuild`.

use anyhow::Result;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::process::Cmd;

/// Ownership mode passed to `pkgbuild`.
pub const OWNERSHIP: &str = "recommended";

/// Everything `pkgbuild` needs to bundle one root tree.
#[derive(Debug, Clone)]
pub struct PkgSpec {
    pub root: PathBuf,
    pub version: String,
    pub output: PathBuf,
    pub identifier: String,
    pub install_location: String,
    /// Signing identity; `None` or blank means an unsigned package.
    pub sign: Option<String>,
}

impl PkgSpec {
    /// Arguments in `pkgbuild` order. The output path is always last.
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--root".into(),
            self.root.clone().into(),
            "--install-location".into(),
            self.install_location.clone().into(),
            "--identifier".into(),
            self.identifier.clone().into(),
            "--version".into(),
            self.version.clone().into(),
            "--ownership".into(),
            OWNERSHIP.into(),
        ];
        if let Some(identity) = self.sign.as_deref().filter(|s| !s.trim().is_empty()) {
            args.push("--sign".into());
            args.push(identity.into());
        }
        args.push(self.output.clone().into());
        args
    }

    pub fn command(&self, pkgbuild: &Path) -> Cmd {
        Cmd::new(pkgbuild).args(self.args())
    }

    /// Run `pkgbuild` and hand back its exit code unchanged.
    pub fn build(&self, pkgbuild: &Path) -> Result<i32> {
        tracing::debug!(
            "packaging {} as {}",
            self.root.display(),
            self.output.display()
        );
        self.command(pkgbuild).status()
    }
}
