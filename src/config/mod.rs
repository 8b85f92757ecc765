//! Settings file loading.
//!
//! The settings file is TOML with two tables of string values:
//!
//! ```toml
//! [DEFAULT]
//! base_install_path = "/Library/ITOps"
//! openssl_build_dir = "/tmp/build-openssl"
//!
//! [override]
//! openssl_build_dir = "build/openssl"
//! ```
//!
//! Only keys declared in `DEFAULT` exist. For each of them the effective value
//! is the `override` value when present, else the `DEFAULT` value.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::BuildError;

/// Default settings file name, looked up in the working directory.
pub const DEFAULT_SETTINGS_FILE: &str = "config.toml";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsToml {
    #[serde(rename = "DEFAULT")]
    defaults: BTreeMap<String, String>,
    #[serde(rename = "override", default)]
    overrides: BTreeMap<String, String>,
}

/// Flat, merged view of the settings file.
#[derive(Debug, Clone)]
pub struct Settings {
    root: PathBuf,
    values: BTreeMap<String, String>,
}

impl Settings {
    /// Read and merge the settings file at `path`.
    ///
    /// The directory containing the file becomes the project root that
    /// relative paths resolve against.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading settings file '{}'", path.display()))?;
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let root = fs::canonicalize(parent)
            .with_context(|| format!("resolving project root '{}'", parent.display()))?;
        Self::parse(&contents, root)
            .with_context(|| format!("parsing settings file '{}'", path.display()))
    }

    /// Merge settings from TOML text with an explicit project root.
    pub fn parse(contents: &str, root: PathBuf) -> Result<Self> {
        let parsed: SettingsToml = toml::from_str(contents)?;
        Ok(Self::merge(parsed, root))
    }

    fn merge(parsed: SettingsToml, root: PathBuf) -> Self {
        let SettingsToml {
            defaults,
            mut overrides,
        } = parsed;

        let mut values = BTreeMap::new();
        for (key, default) in defaults {
            let value = overrides.remove(&key).unwrap_or(default);
            values.insert(key, value);
        }
        for key in overrides.keys() {
            tracing::warn!("ignoring override key '{key}': it is not declared in DEFAULT");
        }

        Self { root, values }
    }

    /// Project root (directory of the settings file).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Effective value of `key`. A key absent from `DEFAULT` is an error.
    pub fn get(&self, key: &str) -> Result<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| BuildError::MissingKey(key.to_string()).into())
    }

    /// Like [`Settings::get`], but a blank value is an error too.
    pub fn get_nonempty(&self, key: &str) -> Result<&str> {
        let value = self.get(key)?.trim();
        if value.is_empty() {
            return Err(BuildError::EmptyKey(key.to_string()).into());
        }
        Ok(value)
    }

    /// Effective value of an optional key; blank values count as unset.
    pub fn get_optional(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Effective value of `key` as a path, resolved against the project root
    /// when relative.
    pub fn path(&self, key: &str) -> Result<PathBuf> {
        Ok(resolve_project_path(&self.root, self.get(key)?))
    }

    /// Like [`Settings::path`] for an optional key.
    pub fn optional_path(&self, key: &str) -> Option<PathBuf> {
        self.get_optional(key)
            .map(|value| resolve_project_path(&self.root, value))
    }

    /// All effective key/value pairs, sorted by key.
    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}

pub(crate) fn resolve_project_path(root: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    }
}
