//! OpenSSL: built into a staging copy of the install prefix, then relinked
//! to the final prefix, optionally installed there, and packaged.
//!
//! OpenSSL records versioned install names (`libssl.1.1.dylib`), so the
//! references to rewrite are read back with `otool -L` rather than guessed.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

use super::{build_tools, BuildContext, Driver, DriverOptions};
use crate::filesystem::{copy_dir_recursive, recreate_dir, under_root};
use crate::package::PkgSpec;
use crate::preflight::Tool;
use crate::process::{ensure_exists, Cmd};
use crate::relink::Relink;

const LIBS: [&str; 2] = ["libssl.dylib", "libcrypto.dylib"];

pub struct OpenSsl;

impl OpenSsl {
    fn build_dir(ctx: &BuildContext) -> Result<PathBuf> {
        ctx.settings().path("openssl_build_dir")
    }

    /// `<build>/<base>/openssl`: where `make install` puts everything.
    pub fn staging_prefix(ctx: &BuildContext) -> Result<PathBuf> {
        Ok(under_root(&Self::build_dir(ctx)?, ctx.base_install_path()?).join("openssl"))
    }

    /// `<base>/openssl` on the target machine.
    pub fn final_prefix(ctx: &BuildContext) -> Result<String> {
        Ok(format!("{}/openssl", ctx.base_install_path()?))
    }

    pub fn configure_args(prefix: &Path) -> Vec<String> {
        vec![
            format!("--prefix={}", prefix.display()),
            format!("--openssldir={}", prefix.display()),
            "no-ssl3".to_string(),
            "no-idea".to_string(),
            "no-zlib".to_string(),
            "no-comp".to_string(),
            "shared".to_string(),
            "darwin64-x86_64-cc".to_string(),
            "enable-ec_nistp_64_gcc_128".to_string(),
        ]
    }

    /// The versioned libraries behind `lib/libssl.dylib` and
    /// `lib/libcrypto.dylib`.
    pub fn library_files(staging: &Path) -> Vec<PathBuf> {
        let lib_dir = staging.join("lib");
        LIBS.iter()
            .map(|lib| resolve_symlink(&lib_dir.join(lib)))
            .collect()
    }

    /// Point each library's id at the final prefix, keeping its versioned
    /// file name.
    pub fn id_edits(staging: &Path, final_prefix: &str) -> Vec<Relink> {
        Self::library_files(staging)
            .into_iter()
            .filter_map(|lib| {
                let name = lib.file_name()?.to_str()?.to_string();
                Some(Relink::id(lib, format!("{final_prefix}/lib/{name}")))
            })
            .collect()
    }

    /// Rewrite every reference of `target` into the staging `lib` directory.
    ///
    /// `linked` is the `otool -L` listing of `target`. The entry naming
    /// `target` itself is left alone.
    pub fn reference_edits(
        target: &Path,
        linked: &[String],
        staging: &Path,
        final_prefix: &str,
    ) -> Vec<Relink> {
        let stage_lib = format!("{}/", staging.join("lib").display());
        let own = target.display().to_string();
        linked
            .iter()
            .filter(|lib| lib.starts_with(&stage_lib) && **lib != own)
            .map(|lib| {
                let name = &lib[stage_lib.len()..];
                Relink::change(target, lib.clone(), format!("{final_prefix}/lib/{name}"))
            })
            .collect()
    }

    fn relink(ctx: &BuildContext, staging: &Path, final_prefix: &str) -> Result<()> {
        let relinker = ctx.relinker();
        relinker.apply(&Self::id_edits(staging, final_prefix))?;

        let mut targets = Self::library_files(staging);
        targets.push(staging.join("bin/openssl"));
        for target in targets {
            let linked = relinker.linked_libraries(&target)?;
            let edits = Self::reference_edits(&target, &linked, staging, final_prefix);
            if edits.is_empty() {
                tracing::trace!("{} has no staging references", target.display());
            }
            relinker.apply(&edits)?;
        }
        Ok(())
    }

    fn compile(ctx: &BuildContext, build_dir: &Path, prefix: &Path) -> Result<()> {
        tracing::info!("Configuring OpenSSL...");
        Cmd::new(build_dir.join("Configure"))
            .args(Self::configure_args(prefix))
            .current_dir(build_dir)
            .error_msg("Configuring OpenSSL failed")
            .run_interactive()?;

        tracing::info!("Compiling OpenSSL. This will take a while...");
        tracing::debug!("Running make depend routine...");
        ctx.make(build_dir)
            .args(["-s", "depend"])
            .error_msg("make depend failed")
            .run_interactive()?;

        tracing::debug!("Running make all routine...");
        ctx.make(build_dir)
            .args(["-s", "all"])
            .error_msg("make all failed")
            .run_interactive()?;

        tracing::debug!("Running make install routine. This command is the longest...");
        ctx.make(build_dir)
            .arg("install")
            .error_msg("make install failed")
            .run_interactive()
    }
}

/// The file a symlink points at, or `path` itself.
fn resolve_symlink(path: &Path) -> PathBuf {
    match fs::read_link(path) {
        Ok(target) => match path.parent() {
            Some(dir) => dir.join(target),
            None => target,
        },
        Err(_) => path.to_path_buf(),
    }
}

impl Driver for OpenSsl {
    fn name(&self) -> &'static str {
        "openssl"
    }

    fn required_tools(&self, opts: DriverOptions) -> Vec<Tool> {
        let mut tools = build_tools(opts);
        if opts.build {
            tools.push(Tool::Otool);
        }
        tools
    }

    fn build(&self, ctx: &BuildContext, skip: bool) -> Result<()> {
        let build_dir = Self::build_dir(ctx)?;
        let staging = Self::staging_prefix(ctx)?;

        if skip && staging.is_dir() {
            tracing::debug!("Skip flag was provided. OpenSSL will not be compiled on this run.");
            tracing::info!("OpenSSL compile skipped due to --skip option");
        } else {
            ctx.fetcher().fetch_archive(
                ctx.get("openssl_dist")?,
                ctx.get("openssl_dist_hash")?,
                "OpenSSL",
                &build_dir,
            )?;
            Self::compile(ctx, &build_dir, &staging)?;
        }

        tracing::info!("Linking libraries and binaries to the correct path...");
        Self::relink(ctx, &staging, &Self::final_prefix(ctx)?)
    }

    /// Replace `<base>/openssl` with the relinked staging prefix.
    fn install(&self, ctx: &BuildContext) -> Result<()> {
        let staging = Self::staging_prefix(ctx)?;
        ensure_exists(&staging, "OpenSSL build output")?;

        let final_prefix = PathBuf::from(Self::final_prefix(ctx)?);
        tracing::info!("Installing OpenSSL to {}...", final_prefix.display());
        recreate_dir(&final_prefix)?;
        copy_dir_recursive(&staging, &final_prefix)
    }

    fn package_spec(&self, ctx: &BuildContext) -> Result<PkgSpec> {
        ctx.pkg_spec(
            self.name(),
            Self::staging_prefix(ctx)?,
            ctx.get("openssl_version")?,
            Self::final_prefix(ctx)?,
        )
    }
}
