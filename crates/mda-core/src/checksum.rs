//! SHA-256 verification of the finished file.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;

/// Lowercase hex SHA-256 of the file at `path`.
pub fn sha256_path(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut f, &mut hasher).with_context(|| format!("read {}", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Fails unless the file's digest equals `expected` (hex, case-insensitive).
pub fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let expected = expected.trim().to_ascii_lowercase();
    let decoded = hex::decode(&expected).context("checksum is not valid hex")?;
    if decoded.len() != 32 {
        anyhow::bail!("SHA-256 checksum must be 64 hex digits, got {}", expected.len());
    }
    let actual = sha256_path(path)?;
    if actual != expected {
        anyhow::bail!(
            "checksum mismatch for {}: expected {}, got {}",
            path.display(),
            expected,
            actual
        );
    }
    tracing::info!(path = %path.display(), "sha256 verified");
    Ok(())
}
