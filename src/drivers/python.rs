//! Python 2 or 3, linked against the vendored OpenSSL.
//!
//! The interpreter is installed into `<build>/payload/<base>/Python/<X.Y>`
//! and the payload tree is packaged to install at `/`.

use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::{build_tools, short_version, BuildContext, Driver, DriverOptions};
use crate::error::BuildError;
use crate::filesystem::{recreate_dir, under_root};
use crate::package::PkgSpec;
use crate::patch::{append_lines, apply_ed_script, apply_patch};
use crate::preflight::Tool;
use crate::process::{ensure_exists, Cmd};
use crate::relink::Relink;

const APPLE_FIX_URL: &str = "https://opensource.apple.com/source/python/python-97/2.7/fix/";

const APPLE_FIXES: [(&str, &str); 4] = [
    (
        "configure.ed",
        "3580144bc552fd9b70160b540b35af8ab18e15b592235e4c0731090c6dd98895",
    ),
    (
        "setup.py.ed",
        "9db0803df2d816facf03b7879a5f6cca425b3e9513b60023323676d8c612d93d",
    ),
    (
        "readline.c.ed",
        "96ff20308b223e22739f9942683bf8f36825e2bf0c426a2edcb6d741b56ff06f",
    ),
    (
        "setup.py.patch",
        "c6bcd396cab445c3c7aed293720c7936ef773f0649849b658bba177046412f97",
    ),
];

/// Which interpreter line to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PythonTarget {
    #[default]
    Two,
    Three,
}

impl PythonTarget {
    pub fn major(self) -> u8 {
        match self {
            PythonTarget::Two => 2,
            PythonTarget::Three => 3,
        }
    }

    /// Settings key for this target, e.g. `python2_dist`.
    pub fn key(self, suffix: &str) -> String {
        format!("python{}_{}", self.major(), suffix)
    }

    /// Module setup files the extra stanzas may go to, most preferred
    /// first. Python 3.8 renamed `Setup.dist` to `Setup`.
    pub fn setup_files(self) -> &'static [&'static str] {
        match self {
            PythonTarget::Two => &["Modules/Setup.dist"],
            PythonTarget::Three => &["Modules/Setup", "Modules/Setup.dist"],
        }
    }

    /// The first of [`PythonTarget::setup_files`] present in `build_dir`.
    pub fn find_setup_file(self, build_dir: &Path) -> Result<PathBuf> {
        let candidates = self.setup_files();
        candidates
            .iter()
            .map(|name| build_dir.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| {
                BuildError::MissingPrerequisite {
                    what: "Python module setup file".to_string(),
                    path: build_dir.join(candidates[0]),
                }
                .into()
            })
    }
}

/// Apple's build fixes for Python 2.7 on macOS: `ed` scripts and a patch,
/// applied in order.
///
/// Each file is named after the source file it edits plus `.ed` or
/// `.patch`. That source is looked up at the top of the tree, then under
/// `Modules/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppleFixes {
    pub url: String,
    /// (file name, SHA-256)
    pub files: Vec<(String, String)>,
}

impl Default for AppleFixes {
    fn default() -> Self {
        Self {
            url: APPLE_FIX_URL.to_string(),
            files: APPLE_FIXES
                .iter()
                .map(|(name, sha256)| (name.to_string(), sha256.to_string()))
                .collect(),
        }
    }
}

impl AppleFixes {
    /// Source file a fix applies to, or `None` for an unknown kind.
    pub fn target(build_dir: &Path, fix: &str) -> Option<PathBuf> {
        let stem = fix
            .strip_suffix(".ed")
            .or_else(|| fix.strip_suffix(".patch"))?;
        let top = build_dir.join(stem);
        if top.exists() {
            Some(top)
        } else {
            Some(build_dir.join("Modules").join(stem))
        }
    }
}

impl FromStr for PythonTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "2" => Ok(PythonTarget::Two),
            "3" => Ok(PythonTarget::Three),
            other => Err(format!("unsupported Python target '{other}', expected 2 or 3")),
        }
    }
}

impl fmt::Display for PythonTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.major())
    }
}

/// Paths for one Python build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonLayout {
    pub build_dir: PathBuf,
    pub payload: PathBuf,
    /// Install prefix inside the payload.
    pub prefix: PathBuf,
    /// Install prefix on the target machine.
    pub final_prefix: String,
    /// `major.minor`
    pub short_version: String,
    pub minor: u32,
    /// `<base>/openssl` on this machine.
    pub openssl: String,
}

impl PythonLayout {
    pub fn new(ctx: &BuildContext, target: PythonTarget) -> Result<Self> {
        let settings = ctx.settings();
        let build_dir = match settings.optional_path(&target.key("build_dir")) {
            Some(dir) => dir,
            None => settings.path("python_build_dir")?,
        };
        let base = ctx.base_install_path()?;
        let short_version = short_version(ctx.get(&target.key("version"))?)?;
        let minor = short_version
            .split('.')
            .nth(1)
            .and_then(|m| m.parse().ok())
            .with_context(|| format!("minor version of '{short_version}' is not a number"))?;
        let payload = build_dir.join("payload");
        let prefix = under_root(&payload, base)
            .join("Python")
            .join(&short_version);

        Ok(Self {
            final_prefix: format!("{base}/Python/{short_version}"),
            openssl: format!("{base}/openssl"),
            build_dir,
            payload,
            prefix,
            short_version,
            minor,
        })
    }

    fn interpreter(&self) -> PathBuf {
        self.prefix
            .join("bin")
            .join(format!("python{}", self.short_version))
    }

    fn libpython(&self) -> String {
        format!("libpython{}.dylib", self.short_version)
    }
}

pub struct Python {
    pub target: PythonTarget,
    pub apple_fixes: AppleFixes,
}

impl Python {
    pub fn new(target: PythonTarget) -> Self {
        Self {
            target,
            apple_fixes: AppleFixes::default(),
        }
    }

    /// Fetch Apple's fixes from elsewhere, e.g. a local mirror.
    pub fn with_apple_fixes(mut self, fixes: AppleFixes) -> Self {
        self.apple_fixes = fixes;
        self
    }

    /// `_socket` and `_ssl` built in, against the vendored OpenSSL.
    pub fn setup_stanzas(openssl: &str) -> Vec<String> {
        vec![
            "_socket socketmodule.c timemodule.c".to_string(),
            format!(
                "_ssl _ssl.c -DUSE_SSL -I{openssl}/include -I{openssl}/include/openssl \
                 -L{openssl}/lib -lssl -lcrypto"
            ),
        ]
    }

    pub fn configure_args(&self, layout: &PythonLayout) -> Vec<String> {
        let prefix = layout.prefix.display();
        let mut args = vec![format!("--prefix={prefix}"), "--enable-shared".to_string()];
        match self.target {
            PythonTarget::Two => {
                args.push("--enable-toolbox-glue".to_string());
                args.push("--with-threads".to_string());
            }
            // Older releases only see OpenSSL through the Setup stanza.
            PythonTarget::Three if layout.minor >= 7 => {
                args.push(format!("--with-openssl={}", layout.openssl))
            }
            PythonTarget::Three => {}
        }
        args.extend([
            "--with-ensurepip=install".to_string(),
            "--enable-ipv6".to_string(),
            format!("--datarootdir={prefix}/share"),
            format!("--datadir={prefix}/share"),
        ]);
        args
    }

    pub fn relink_edits(layout: &PythonLayout) -> Vec<Relink> {
        let lib = layout.libpython();
        let staged = layout.prefix.join("lib").join(&lib);
        let final_lib = format!("{}/lib/{lib}", layout.final_prefix);
        vec![
            Relink::id(&staged, final_lib.clone()),
            Relink::change(
                layout.interpreter(),
                staged.display().to_string(),
                final_lib,
            ),
        ]
    }

    fn apply_apple_fixes(&self, ctx: &BuildContext, build_dir: &Path) -> Result<()> {
        let src_dir = ctx.driver_dir("python").join("_src");
        tracing::info!("Downloading and verifying python source files...");
        let fetcher = ctx.fetcher();
        for (name, sha256) in &self.apple_fixes.files {
            let url = format!("{}{name}", self.apple_fixes.url);
            fetcher.stage_file(&url, sha256, &src_dir.join(name))?;
        }

        tracing::debug!("Patching files into source...");
        for (name, _) in &self.apple_fixes.files {
            let fix = src_dir.join(name);
            let target = AppleFixes::target(build_dir, name)
                .with_context(|| format!("{name} is neither an ed script nor a patch"))?;
            if name.ends_with(".ed") {
                apply_ed_script(ctx.tools().path(Tool::Ed), &target, &fix)?;
            } else {
                apply_patch(ctx.tools().path(Tool::Patch), &target, &fix)?;
            }
        }
        Ok(())
    }

    fn compile(&self, ctx: &BuildContext, layout: &PythonLayout) -> Result<()> {
        let build_dir = &layout.build_dir;

        tracing::debug!("Adding additional modules to be included...");
        append_lines(
            &self.target.find_setup_file(build_dir)?,
            &Self::setup_stanzas(&layout.openssl),
        )?;

        if self.target == PythonTarget::Two {
            self.apply_apple_fixes(ctx, build_dir)?;
        }

        recreate_dir(&layout.prefix)?;
        tracing::info!("Configuring Python...");
        Cmd::new(build_dir.join("configure"))
            .args(self.configure_args(layout))
            .current_dir(build_dir)
            .error_msg("Configuring Python failed")
            .run_interactive()?;

        tracing::info!("Compiling Python. This will take a while...");
        tracing::debug!("Running Python make routine...");
        ctx.make(build_dir)
            .error_msg("make failed")
            .run_interactive()?;
        tracing::debug!("Running Python make install routine...");
        ctx.make(build_dir)
            .arg("install")
            .error_msg("make install failed")
            .run_interactive()?;

        let python = layout.interpreter();
        tracing::info!("Upgrading pip...");
        Cmd::new(&python)
            .args(["-m", "pip", "install", "--upgrade", "pip"])
            .error_msg("upgrading pip failed")
            .run_interactive()?;

        let requirements = ctx.driver_dir("python").join("requirements.txt");
        if requirements.is_file() {
            tracing::info!("Install requirements...");
            Cmd::new(&python)
                .args(["-m", "pip", "install", "-r"])
                .arg(&requirements)
                .error_msg("installing requirements failed")
                .run_interactive()?;
        }
        Ok(())
    }
}

impl Driver for Python {
    fn name(&self) -> &'static str {
        "python"
    }

    fn requires_root(&self) -> bool {
        true
    }

    fn required_tools(&self, opts: DriverOptions) -> Vec<Tool> {
        let mut tools = build_tools(opts);
        if opts.build && self.target == PythonTarget::Two {
            tools.extend([Tool::Ed, Tool::Patch]);
        }
        tools
    }

    fn build(&self, ctx: &BuildContext, skip: bool) -> Result<()> {
        let layout = PythonLayout::new(ctx, self.target)?;
        ensure_exists(Path::new(&layout.openssl), "OpenSSL")?;

        if skip && layout.payload.is_dir() {
            tracing::debug!("Skip flag was provided. Python will not be compiled on this run.");
            tracing::info!("Python compile skipped due to --skip option");
        } else {
            ctx.fetcher().fetch_archive(
                ctx.get(&self.target.key("dist"))?,
                ctx.get(&self.target.key("dist_hash"))?,
                "Python",
                &layout.build_dir,
            )?;
            self.compile(ctx, &layout)?;
        }

        tracing::info!("Linking libpython to the install path...");
        ctx.relinker().apply(&Self::relink_edits(&layout))
    }

    fn package_spec(&self, ctx: &BuildContext) -> Result<PkgSpec> {
        let layout = PythonLayout::new(ctx, self.target)?;
        ctx.pkg_spec(
            self.name(),
            layout.payload,
            ctx.get(&self.target.key("version"))?,
            "/",
        )
    }
}
