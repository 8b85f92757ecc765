//! File digests.

use anyhow::{Context, Result};
use sha2::digest::Output;
use sha2::{Digest, Sha256};
use std::fmt::LowerHex;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::BuildError;

/// Returned instead of a digest when the path is not a regular file.
pub const NOT_A_FILE: &str = "NOT A FILE";

const CHUNK_SIZE: usize = 64 * 1024;

/// Lowercase hex digest of the file at `path` under `D`.
///
/// Returns [`NOT_A_FILE`] when `path` does not name a regular file.
pub fn file_digest<D>(path: &Path) -> Result<String>
where
    D: Digest,
    Output<D>: LowerHex,
{
    if !path.is_file() {
        return Ok(NOT_A_FILE.to_string());
    }

    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = D::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 of the file at `path`, or [`NOT_A_FILE`].
pub fn sha256_file(path: &Path) -> Result<String> {
    file_digest::<Sha256>(path)
}

/// Compare the file's SHA-256 with `expected`.
///
/// The comparison is exact on the hex strings; a mismatch is a
/// [`BuildError::HashMismatch`] naming `name`.
pub fn verify_sha256(path: &Path, expected: &str, name: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    if actual != expected {
        return Err(BuildError::HashMismatch {
            name: name.to_string(),
            expected: expected.to_string(),
            actual,
        }
        .into());
    }
    tracing::debug!("Hash verification of {name} successful");
    Ok(())
}

/// Whether `path` is a regular file whose SHA-256 equals `expected`.
pub fn matches_sha256(path: &Path, expected: &str) -> Result<bool> {
    Ok(sha256_file(path)? == expected)
}
