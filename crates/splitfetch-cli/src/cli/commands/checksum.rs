//! `splitfetch checksum` – SHA-256 of a finished file.

use anyhow::Result;
use splitfetch_core::checksum;
use std::path::{Path, PathBuf};

/// Print the digest, or with `expect` verify it and fail on mismatch.
pub async fn run_checksum(path: &Path, expect: Option<&str>) -> Result<()> {
    let owned: PathBuf = path.to_path_buf();
    match expect.map(str::to_string) {
        None => {
            let digest =
                tokio::task::spawn_blocking(move || checksum::sha256_path(&owned)).await??;
            println!("{}  {}", digest, path.display());
        }
        Some(expected) => {
            let ok = tokio::task::spawn_blocking(move || checksum::verify_sha256(&owned, &expected))
                .await??;
            if !ok {
                anyhow::bail!("checksum mismatch for {}", path.display());
            }
            println!("{}: OK", path.display());
        }
    }
    Ok(())
}
