//! `splitfetch inspect` – show what a sidecar still has pending.

use anyhow::Result;
use splitfetch_core::checkpoint::{self, format_size};
use splitfetch_core::ledger::UNKNOWN_END;
use std::path::{Path, PathBuf};

/// Accept either the sidecar itself or the output file it belongs to.
fn sidecar_for(path: &Path) -> PathBuf {
    let is_sidecar = path
        .to_str()
        .map(|s| s.ends_with(checkpoint::SIDECAR_SUFFIX))
        .unwrap_or(false);
    if is_sidecar {
        path.to_path_buf()
    } else {
        checkpoint::sidecar_path(path)
    }
}

pub fn run_inspect(path: &Path) -> Result<()> {
    let sidecar = sidecar_for(path);
    if !sidecar.exists() {
        println!("{}: no sidecar (complete or never started)", sidecar.display());
        return Ok(());
    }
    let spans = checkpoint::read_spans(&sidecar)?;
    if spans.is_empty() {
        println!("{}: no pending ranges", sidecar.display());
        return Ok(());
    }

    let mut missing: u64 = 0;
    let mut open_ended = false;
    println!("{}:", sidecar.display());
    for (start, end) in &spans {
        if *end == UNKNOWN_END {
            open_ended = true;
            println!("  {}..  (length unknown)", start);
        } else {
            missing += end - start;
            println!("  {}..{}  {}", start, end, format_size(end - start));
        }
    }
    println!(
        "{} range(s), {}{} missing",
        spans.len(),
        format_size(missing),
        if open_ended { " + open tail" } else { "" }
    );
    Ok(())
}
