use anyhow::Result;
use clap::Command;

/// Render the man page to stdout.
pub fn run_man(cmd: Command) -> Result<()> {
    clap_mangen::Man::new(cmd).render(&mut std::io::stdout())?;
    Ok(())
}
