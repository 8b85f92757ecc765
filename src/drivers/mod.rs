//! Per-dependency build drivers.
//!
//! Each vendored dependency is one [`Driver`]: a strictly linear sequence of
//! download, verify, extract, patch, compile, relink and (optionally)
//! package. Drivers only describe their own steps; [`run`] does the shared
//! sequencing, preflight and privilege checks.
//!
//! # Example
//!
//! ```rust,ignore
//! use vendor_builder::drivers::{self, BuildContext, DriverOptions, OpenSsl};
//!
//! let ctx = BuildContext::new(settings);
//! let opts = DriverOptions { build: true, install: true, ..Default::default() };
//! drivers::run(&[&OpenSsl], &ctx, opts)?;
//! ```

mod openssl;
mod python;
mod tlsssl;

pub use openssl::OpenSsl;
pub use python::{AppleFixes, Python, PythonTarget};
pub use tlsssl::TlsSsl;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::error::BuildError;
use crate::fetch::Fetcher;
use crate::filesystem::ensure_dir;
use crate::package::PkgSpec;
use crate::preflight::{Tool, Tools};
use crate::process::Cmd;
use crate::relink::Relinker;
use crate::root::require_root;

/// What a driver invocation should do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverOptions {
    /// Download, compile and relink.
    pub build: bool,
    /// Reuse previous build output when present.
    pub skip: bool,
    /// Install the build output on this machine for later drivers.
    pub install: bool,
    /// Produce the installer package.
    pub package: bool,
}

impl DriverOptions {
    /// Full build, install and package, as the top-level driver runs it.
    pub fn all() -> Self {
        Self {
            build: true,
            skip: false,
            install: true,
            package: true,
        }
    }
}

/// One vendored dependency.
pub trait Driver {
    /// Name for logging, the driver directory and package file names.
    fn name(&self) -> &'static str;

    /// Whether the build writes to protected locations.
    fn requires_root(&self) -> bool {
        false
    }

    /// Host tools needed for `opts`.
    fn required_tools(&self, opts: DriverOptions) -> Vec<Tool>;

    /// Build into the driver's build directory. With `skip`, existing build
    /// output is reused, but relinking always runs.
    fn build(&self, ctx: &BuildContext, skip: bool) -> Result<()>;

    /// Install the build output into its final location on this machine,
    /// for drivers that build against it. Most drivers have nothing to
    /// install.
    fn install(&self, _ctx: &BuildContext) -> Result<()> {
        Ok(())
    }

    /// Describe the installer package for the build output.
    fn package_spec(&self, ctx: &BuildContext) -> Result<PkgSpec>;

    /// Build the installer package.
    fn package(&self, ctx: &BuildContext) -> Result<()> {
        let spec = self.package_spec(ctx)?;
        tracing::info!("Building a package for {}...", self.name());
        let code = spec.build(ctx.tools().path(Tool::Pkgbuild))?;
        if code != 0 {
            return Err(BuildError::tool(
                "pkgbuild",
                code,
                format!("package creation for {} failed", self.name()),
            )
            .into());
        }
        tracing::info!("{} packaged properly", self.name());
        Ok(())
    }
}

/// Everything a driver reads: merged settings and tool locations.
#[derive(Debug, Clone)]
pub struct BuildContext {
    settings: Settings,
    tools: Tools,
}

impl BuildContext {
    pub fn new(settings: Settings) -> Self {
        let tools = Tools::from_settings(&settings);
        Self { settings, tools }
    }

    pub fn with_tools(settings: Settings, tools: Tools) -> Self {
        Self { settings, tools }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn tools(&self) -> &Tools {
        &self.tools
    }

    /// Shorthand for a required setting.
    pub fn get(&self, key: &str) -> Result<&str> {
        self.settings.get(key)
    }

    /// Directory holding a driver's patches, staged sources and packages.
    pub fn driver_dir(&self, name: &str) -> PathBuf {
        self.settings.root().join(name)
    }

    /// Final install base, e.g. `/Library/ITOps`.
    pub fn base_install_path(&self) -> Result<&str> {
        let base = self.get("base_install_path")?;
        Ok(base.trim_end_matches('/'))
    }

    pub fn fetcher(&self) -> Fetcher {
        Fetcher::new(self.tools.path(Tool::Curl), self.tools.path(Tool::Tar))
            .temp_root(self.settings.optional_path("download_dir"))
    }

    pub fn relinker(&self) -> Relinker {
        Relinker::new(
            self.tools.path(Tool::InstallNameTool),
            self.tools.path(Tool::Otool),
        )
    }

    pub fn make(&self, dir: &Path) -> Cmd {
        Cmd::new(self.tools.path(Tool::Make)).current_dir(dir)
    }

    /// Signing identity for packages, if configured.
    pub fn signing_identity(&self) -> Option<String> {
        self.settings.get_optional("sign_cert_cn").map(str::to_string)
    }

    /// Package spec with the shared fields filled in. The package file is
    /// written to the driver directory as `<name>-<version>.pkg`.
    pub fn pkg_spec(
        &self,
        name: &str,
        root: PathBuf,
        version: &str,
        install_location: impl Into<String>,
    ) -> Result<PkgSpec> {
        let driver_dir = self.driver_dir(name);
        ensure_dir(&driver_dir)?;
        Ok(PkgSpec {
            root,
            version: version.to_string(),
            output: driver_dir.join(format!("{name}-{version}.pkg")),
            identifier: format!("{}.{}", self.get("pkgid")?, name),
            install_location: install_location.into(),
            sign: self.signing_identity(),
        })
    }
}

/// Run `drivers` in order with the same options.
///
/// The superuser check happens once, before anything runs, when any driver
/// needs it. The first failure stops the sequence.
pub fn run(drivers: &[&dyn Driver], ctx: &BuildContext, opts: DriverOptions) -> Result<()> {
    if opts.build && drivers.iter().any(|d| d.requires_root()) {
        require_root()?;
    }

    let mut needed: Vec<Tool> = drivers
        .iter()
        .flat_map(|d| d.required_tools(opts))
        .collect();
    needed.sort();
    needed.dedup();
    ctx.tools().check(&needed)?;

    for driver in drivers {
        run_one(*driver, ctx, opts).with_context(|| format!("{} driver failed", driver.name()))?;
    }
    Ok(())
}

fn run_one(driver: &dyn Driver, ctx: &BuildContext, opts: DriverOptions) -> Result<()> {
    if opts.build {
        tracing::info!("Building {}...", driver.name());
        driver.build(ctx, opts.skip)?;
    }
    if opts.install {
        driver.install(ctx)?;
    }
    if opts.package {
        driver.package(ctx)?;
    }
    Ok(())
}

/// Build tools every compiling driver needs.
fn build_tools(opts: DriverOptions) -> Vec<Tool> {
    let mut tools = Vec::new();
    if opts.build {
        tools.extend([Tool::Curl, Tool::Tar, Tool::Make, Tool::InstallNameTool]);
    }
    if opts.package {
        tools.push(Tool::Pkgbuild);
    }
    tools
}

/// `major.minor` of a version string such as `2.7.13`.
pub(crate) fn short_version(version: &str) -> Result<String> {
    let mut parts = version.split('.');
    match (parts.next(), parts.next()) {
        (Some(major), Some(minor)) if !major.is_empty() && !minor.is_empty() => {
            Ok(format!("{major}.{minor}"))
        }
        _ => anyhow::bail!("version '{version}' is not of the form <major>.<minor>[.<patch>]"),
    }
}
