//! tlsssl: CPython 2.7's `ssl` module rebuilt as a standalone extension
//! against a private copy of OpenSSL.
//!
//! Sources are single files from a pinned CPython commit. The OpenSSL
//! dylibs are copied under new names so they never clash with the system
//! libraries, and the extension links against those copies.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::{BuildContext, Driver, DriverOptions};
use crate::filesystem::{copy_into, recreate_dir, set_owner_writable, under_root};
use crate::package::PkgSpec;
use crate::patch::PatchedFile;
use crate::preflight::Tool;
use crate::process::{ensure_exists, Cmd};
use crate::relink::Relink;

const CPYTHON_RAW_URL: &str = "https://raw.githubusercontent.com/python/cpython";

/// (staged name, path in the CPython tree, settings key of its SHA-256)
const SOURCES: [(&str, &str, &str); 4] = [
    ("ssl.py", "Lib/ssl.py", "ssl_py_hash"),
    ("_ssl.c", "Modules/_ssl.c", "ssl_c_hash"),
    (
        "make_ssl_data.py",
        "Tools/ssl/make_ssl_data.py",
        "make_ssl_data_py_hash",
    ),
    ("socketmodule.h", "Modules/socketmodule.h", "socketmodule_h_hash"),
];

/// (patched name, staged source)
const PATCHES: [(&str, &str); 3] = [
    ("_tlsssl.c", "_ssl.c"),
    ("make_tlsssl_data.py", "make_ssl_data.py"),
    ("tlsssl.py", "ssl.py"),
];

const SSL_LIB: &str = "libtlsssl.dylib";
const CRYPTO_LIB: &str = "libtlscrypto.dylib";

/// Paths for one tlsssl build.
#[derive(Debug, Clone)]
pub struct TlsSslLayout {
    pub driver_dir: PathBuf,
    pub build_dir: PathBuf,
    pub openssl_lib_dir: PathBuf,
    pub openssl_include_dir: PathBuf,
    /// Where the renamed dylibs live on the target machine.
    pub lib_dest: String,
    pub site_packages: String,
}

impl TlsSslLayout {
    pub fn new(ctx: &BuildContext) -> Result<Self> {
        let settings = ctx.settings();
        let driver_dir = ctx.driver_dir("tlsssl");
        let build_dir = settings
            .optional_path("tlsssl_build_dir")
            .unwrap_or_else(|| driver_dir.join("build"));
        Ok(Self {
            build_dir,
            openssl_lib_dir: settings.path("tlsssl_openssl_lib_dir")?,
            openssl_include_dir: settings.path("tlsssl_openssl_include_dir")?,
            lib_dest: ctx.get("tlsssl_lib_dest")?.trim_end_matches('/').to_string(),
            site_packages: ctx.get("tlsssl_site_packages")?.to_string(),
            driver_dir,
        })
    }

    pub fn src_dir(&self) -> PathBuf {
        self.driver_dir.join("_src")
    }

    pub fn patch_dir(&self) -> PathBuf {
        self.driver_dir.join("_patch")
    }

    pub fn ssl_data_header(&self) -> PathBuf {
        self.driver_dir.join("_ssl_data.h")
    }

    pub fn temp_libs(&self) -> PathBuf {
        self.build_dir.join("_temp_libs")
    }

    pub fn extension(&self) -> PathBuf {
        self.build_dir.join("_tlsssl.so")
    }

    pub fn payload(&self) -> PathBuf {
        self.build_dir.join("payload")
    }

    pub fn patches(&self) -> Vec<PatchedFile> {
        PATCHES
            .iter()
            .map(|(dest, source)| PatchedFile {
                source: self.src_dir().join(source),
                diff: self.driver_dir.join("_diffs").join(format!("{dest}.diff")),
                dest: self.patch_dir().join(dest),
            })
            .collect()
    }
}

pub struct TlsSsl;

impl TlsSsl {
    fn stage_sources(ctx: &BuildContext, layout: &TlsSslLayout) -> Result<()> {
        let commit = ctx.settings().get_nonempty("cpython_2_7_git_commit")?;
        let expected = SOURCES
            .iter()
            .map(|(_, _, hash_key)| ctx.settings().get_nonempty(hash_key))
            .collect::<Result<Vec<_>>>()?;

        let fetcher = ctx.fetcher();
        tracing::debug!("Downloading & checking hash of python source files...");
        for ((name, upstream, _), sha256) in SOURCES.iter().zip(expected) {
            let url = format!("{CPYTHON_RAW_URL}/{commit}/{upstream}");
            fetcher.stage_file(&url, sha256, &layout.src_dir().join(name))?;
        }
        Ok(())
    }

    fn create_patched_files(ctx: &BuildContext, layout: &TlsSslLayout) -> Result<()> {
        tracing::info!("Create our patched files...");
        let patch = ctx.tools().path(Tool::Patch);
        for patched in layout.patches() {
            patched.apply(patch)?;
        }

        if !layout.patch_dir().join("socketmodule.h").is_file() {
            tracing::debug!("Copying 'socketmodule.h' to the _patch dir");
            copy_into(&layout.src_dir().join("socketmodule.h"), &layout.patch_dir())?;
        }
        Ok(())
    }

    fn generate_ssl_data(ctx: &BuildContext, layout: &TlsSslLayout) -> Result<()> {
        let header = layout.ssl_data_header();
        if header.is_file() {
            return Ok(());
        }
        tracing::debug!("Generating {}", header.display());
        Cmd::new(ctx.tools().path(Tool::Python))
            .arg(layout.patch_dir().join("make_tlsssl_data.py"))
            .arg(&layout.openssl_include_dir)
            .arg(&header)
            .error_msg("generating _ssl_data.h failed")
            .run()?;
        Ok(())
    }

    /// Copy OpenSSL's dylibs under their private names and point them at
    /// `lib_dest`.
    fn prepare_libs(ctx: &BuildContext, layout: &TlsSslLayout) -> Result<()> {
        let temp_libs = layout.temp_libs();
        recreate_dir(&temp_libs)?;

        let ssl_tmp = temp_libs.join(SSL_LIB);
        let crypto_tmp = temp_libs.join(CRYPTO_LIB);
        for (src, dst) in [("libssl.dylib", &ssl_tmp), ("libcrypto.dylib", &crypto_tmp)] {
            let src = layout.openssl_lib_dir.join(src);
            std::fs::copy(&src, dst)
                .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
            set_owner_writable(dst, true)?;
        }

        let ssl_dest = format!("{}/{SSL_LIB}", layout.lib_dest);
        let crypto_dest = format!("{}/{CRYPTO_LIB}", layout.lib_dest);
        let relinker = ctx.relinker();
        relinker.apply(&[
            Relink::id(&ssl_tmp, ssl_dest),
            Relink::id(&crypto_tmp, crypto_dest.clone()),
        ])?;

        let old_crypto = relinker.find_dependency(&ssl_tmp, "libcrypto")?;
        tracing::trace!("libtlsssl links against {old_crypto}");
        relinker.apply(&[Relink::change(&ssl_tmp, old_crypto, crypto_dest)])?;

        set_owner_writable(&ssl_tmp, false)?;
        set_owner_writable(&crypto_tmp, false)
    }

    pub fn compile_command(ctx: &BuildContext, layout: &TlsSslLayout) -> Result<Cmd> {
        let include = |dir: &Path| format!("-I{}", dir.display());
        Ok(Cmd::new(ctx.tools().path(Tool::Cc))
            .args(["-bundle", "-undefined", "dynamic_lookup"])
            .arg(include(&layout.patch_dir()))
            .arg(include(&layout.driver_dir))
            .arg(include(&layout.openssl_include_dir))
            .arg(format!("-I{}", ctx.get("tlsssl_python_include_dir")?))
            .arg(format!("-L{}", layout.temp_libs().display()))
            .args(["-ltlsssl", "-ltlscrypto"])
            .arg(layout.patch_dir().join("_tlsssl.c"))
            .arg("-o")
            .arg(layout.extension()))
    }

    fn assemble_payload(layout: &TlsSslLayout) -> Result<()> {
        let payload = layout.payload();
        recreate_dir(&payload)?;

        let package_dir = under_root(&payload, &layout.site_packages).join("tlsssl");
        copy_into(&layout.patch_dir().join("tlsssl.py"), &package_dir)?;
        copy_into(&layout.extension(), &package_dir)?;

        let lib_dir = under_root(&payload, &layout.lib_dest);
        for lib in [SSL_LIB, CRYPTO_LIB] {
            copy_into(&layout.temp_libs().join(lib), &lib_dir)?;
        }
        Ok(())
    }
}

impl Driver for TlsSsl {
    fn name(&self) -> &'static str {
        "tlsssl"
    }

    fn required_tools(&self, opts: DriverOptions) -> Vec<Tool> {
        let mut tools = Vec::new();
        if opts.build {
            tools.extend([
                Tool::Curl,
                Tool::Patch,
                Tool::InstallNameTool,
                Tool::Otool,
                Tool::Cc,
                Tool::Python,
            ]);
        }
        if opts.package {
            tools.push(Tool::Pkgbuild);
        }
        tools
    }

    fn build(&self, ctx: &BuildContext, skip: bool) -> Result<()> {
        let layout = TlsSslLayout::new(ctx)?;
        ensure_exists(&layout.openssl_lib_dir, "OpenSSL libraries")?;

        tracing::info!("Downloading and verifying python source files...");
        Self::stage_sources(ctx, &layout)?;
        Self::create_patched_files(ctx, &layout)?;
        Self::generate_ssl_data(ctx, &layout)?;

        tracing::info!("Linking private OpenSSL libraries...");
        Self::prepare_libs(ctx, &layout)?;

        if skip && layout.extension().is_file() {
            tracing::info!("tlsssl compile skipped due to --skip option");
        } else {
            tracing::info!("Compiling tlsssl...");
            Self::compile_command(ctx, &layout)?
                .error_msg("compiling _tlsssl.so failed")
                .run()?;
        }

        Self::assemble_payload(&layout)
    }

    fn package_spec(&self, ctx: &BuildContext) -> Result<PkgSpec> {
        let layout = TlsSslLayout::new(ctx)?;
        ctx.pkg_spec(self.name(), layout.payload(), ctx.get("tlsssl_version")?, "/")
    }
}
