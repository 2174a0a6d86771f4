use clap::Command;
use clap_complete::{generate, Shell};

/// Write completions for `shell` to stdout.
pub fn run_completions(shell: Shell, cmd: &mut Command) {
    let name = cmd.get_name().to_string();
    generate(shell, cmd, name, &mut std::io::stdout());
}
