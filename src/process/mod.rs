//! External command execution.
//!
//! [`Cmd`] is a small builder over [`std::process::Command`] with two modes:
//!
//! - **captured** ([`Cmd::output`], [`Cmd::run`]): stdout and stderr are
//!   collected into a [`CommandOutput`].
//! - **live** ([`Cmd::status`], [`Cmd::run_interactive`]): the child inherits
//!   the terminal so long compiles and downloads show progress.
//!
//! `output` and `status` never fail on a non-zero exit; the caller decides.
//! `run` and `run_interactive` turn a non-zero exit into
//! [`BuildError::ToolFailed`].

use anyhow::{Context, Result};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use crate::error::BuildError;

/// Result of a captured command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured standard output, `None` when empty.
    pub stdout: Option<String>,
    /// Captured standard error, `None` when empty.
    pub stderr: Option<String>,
    /// Exit code, `-1` when the child was killed by a signal.
    pub code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Stdout and stderr joined, for error messages.
    pub fn combined(&self) -> String {
        let mut text = String::new();
        for part in [&self.stdout, &self.stderr].into_iter().flatten() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(part.trim());
        }
        text
    }
}

fn non_empty(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(bytes).into_owned())
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Command builder.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    dir: Option<PathBuf>,
    envs: Vec<(OsString, OsString)>,
    stdin_file: Option<PathBuf>,
    error_msg: Option<String>,
}

impl Cmd {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            dir: None,
            envs: Vec::new(),
            stdin_file: None,
            error_msg: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Feed the contents of `path` to the child's stdin.
    pub fn stdin_file(mut self, path: impl AsRef<Path>) -> Self {
        self.stdin_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Message used when the command exits non-zero under `run`/`run_interactive`.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    fn program_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .unwrap_or(&self.program)
            .to_string_lossy()
            .into_owned()
    }

    fn command(&self) -> Result<Command> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        match &self.stdin_file {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("opening stdin file '{}'", path.display()))?;
                cmd.stdin(Stdio::from(file));
            }
            None => {
                cmd.stdin(Stdio::null());
            }
        }
        Ok(cmd)
    }

    /// Run with captured output. Only a failure to start the program is an error.
    pub fn output(&self) -> Result<CommandOutput> {
        tracing::trace!("running: {self}");
        let output = self
            .command()?
            .output()
            .with_context(|| format!("failed to execute {}", self.program_name()))?;
        Ok(CommandOutput {
            stdout: non_empty(&output.stdout),
            stderr: non_empty(&output.stderr),
            code: exit_code(output.status),
        })
    }

    /// Run with captured output and fail on a non-zero exit.
    pub fn run(&self) -> Result<CommandOutput> {
        let output = self.output()?;
        if let Some(out) = &output.stdout {
            tracing::trace!("{}", out.trim_end());
        }
        if let Some(err) = &output.stderr {
            tracing::trace!("{}", err.trim_end());
        }
        if !output.success() {
            let err = BuildError::tool(self.program_name(), output.code, output.combined());
            return Err(self.with_msg(err));
        }
        Ok(output)
    }

    /// Run with the child attached to the terminal, returning its exit code.
    pub fn status(&self) -> Result<i32> {
        tracing::trace!("running: {self}");
        let status = self
            .command()?
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("failed to execute {}", self.program_name()))?;
        Ok(exit_code(status))
    }

    /// Run attached to the terminal and fail on a non-zero exit.
    pub fn run_interactive(&self) -> Result<()> {
        let code = self.status()?;
        if code != 0 {
            let err = BuildError::tool(self.program_name(), code, "see output above");
            return Err(self.with_msg(err));
        }
        Ok(())
    }

    fn with_msg(&self, err: BuildError) -> anyhow::Error {
        match &self.error_msg {
            Some(msg) => anyhow::Error::new(err).context(msg.clone()),
            None => err.into(),
        }
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        if let Some(path) = &self.stdin_file {
            write!(f, " < {}", path.display())?;
        }
        Ok(())
    }
}

/// Fail with [`BuildError::MissingPrerequisite`] unless `path` exists.
pub fn ensure_exists(path: &Path, what: &str) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    Err(BuildError::MissingPrerequisite {
        what: what.to_string(),
        path: path.to_path_buf(),
    }
    .into())
}
