//! SHA-256 of finished output files, computed on demand off the fetch path.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const BUF_SIZE: usize = 256 * 1024;

/// Lowercase hex SHA-256 of everything `reader` yields.
pub fn sha256_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Lowercase hex SHA-256 of the file at `path`.
pub fn sha256_path(path: &Path) -> Result<String> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    sha256_reader(BufReader::new(f)).with_context(|| format!("read {}", path.display()))
}

/// Compare the file's digest against `expected` (hex, any case).
pub fn verify_sha256(path: &Path, expected: &str) -> Result<bool> {
    let expected = expected.trim();
    if expected.len() != 64 || hex::decode(expected).is_err() {
        anyhow::bail!("expected digest is not 64 hex digits: {}", expected);
    }
    Ok(sha256_path(path)?.eq_ignore_ascii_case(expected))
}
