//! Download, verify and unpack upstream sources.
//!
//! Downloads go through `curl` with live progress into a scratch directory
//! that is removed when the [`Download`] is dropped, so the temporary file
//! disappears on every path out of a step, including hash and extraction
//! failures.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::BuildError;
use crate::filesystem::{atomic_move, ensure_dir, recreate_dir};
use crate::hash::{matches_sha256, verify_sha256};
use crate::process::Cmd;

const TEMP_FILE_NAME: &str = "tempdata";

/// A downloaded file living in its own scratch directory.
#[derive(Debug)]
pub struct Download {
    _dir: TempDir,
    path: PathBuf,
}

impl Download {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `curl` + `tar` front end.
#[derive(Debug, Clone)]
pub struct Fetcher {
    curl: PathBuf,
    tar: PathBuf,
    temp_root: Option<PathBuf>,
}

impl Fetcher {
    pub fn new(curl: impl Into<PathBuf>, tar: impl Into<PathBuf>) -> Self {
        Self {
            curl: curl.into(),
            tar: tar.into(),
            temp_root: None,
        }
    }

    /// Create scratch directories under `dir` instead of the system temp dir.
    pub fn temp_root(mut self, dir: Option<PathBuf>) -> Self {
        self.temp_root = dir;
        self
    }

    pub fn curl_command(&self, url: &str, output: &Path) -> Cmd {
        Cmd::new(&self.curl)
            .args([
                "--show-error",
                "--no-buffer",
                "--fail",
                "--progress-bar",
                "--speed-time",
                "30",
                "--location",
                "--url",
                url,
                "--output",
            ])
            .arg(output)
    }

    pub fn tar_command(&self, archive: &Path, dest: &Path) -> Cmd {
        Cmd::new(&self.tar)
            .arg("-xf")
            .arg(archive)
            .arg("-C")
            .arg(dest)
            .args(["--strip-components", "1"])
    }

    fn scratch_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("vendor-builder-");
        match &self.temp_root {
            Some(root) => {
                ensure_dir(root)?;
                builder
                    .tempdir_in(root)
                    .with_context(|| format!("creating download dir in {}", root.display()))
            }
            None => builder.tempdir().context("creating download dir"),
        }
    }

    /// Download `url` into a fresh scratch directory.
    ///
    /// A non-zero `curl` exit is a [`BuildError::Transfer`].
    pub fn download(&self, url: &str) -> Result<Download> {
        let dir = self.scratch_dir()?;
        let path = dir.path().join(TEMP_FILE_NAME);

        tracing::trace!("Download url: {url}");
        let code = self.curl_command(url, &path).status()?;
        if code != 0 {
            return Err(BuildError::Transfer {
                url: url.to_string(),
                code,
            }
            .into());
        }
        tracing::trace!("Download of {url} successful");
        Ok(Download { _dir: dir, path })
    }

    /// Download `url` and check its SHA-256 against `expected`.
    pub fn download_verified(&self, url: &str, expected: &str, name: &str) -> Result<Download> {
        let download = self.download(url)?;
        verify_sha256(download.path(), expected, name)?;
        Ok(download)
    }

    /// Unpack `archive` into `dest`, dropping the archive's top-level directory.
    pub fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        self.tar_command(archive, dest)
            .error_msg(format!("Extraction into {} has failed", dest.display()))
            .run()?;
        tracing::trace!("Extraction completed successfully");
        Ok(())
    }

    /// Recreate `build_dir`, then download, verify and extract `url` into it.
    ///
    /// Nothing is extracted when the digest does not match. The downloaded
    /// archive is removed whatever the outcome.
    pub fn fetch_archive(
        &self,
        url: &str,
        expected: &str,
        name: &str,
        build_dir: &Path,
    ) -> Result<()> {
        recreate_dir(build_dir)?;

        tracing::info!("Downloading {name} from: {url}");
        let download = self.download_verified(url, expected, name)?;

        tracing::info!("Extracting {name}...");
        let result = self.extract(download.path(), build_dir);
        drop(download);
        result
    }

    /// Place a single file at `dest`, reusing an existing copy whose digest
    /// already matches `expected`.
    ///
    /// Returns `true` when the file was downloaded.
    pub fn stage_file(&self, url: &str, expected: &str, dest: &Path) -> Result<bool> {
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dest.display().to_string());

        tracing::trace!("Checking source file: {name}...");
        if matches_sha256(dest, expected)? {
            tracing::trace!("'{name}' already matches the expected hash of '{expected}'");
            return Ok(false);
        }

        tracing::info!("Downloading '{name}' source file...");
        let download = self.download_verified(url, expected, &name)?;
        if let Some(parent) = dest.parent() {
            ensure_dir(parent)?;
        }
        atomic_move(download.path(), dest)
            .with_context(|| format!("staging '{name}' at {}", dest.display()))?;
        Ok(true)
    }
}
