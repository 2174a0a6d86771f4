//! CLI for the splitfetch range downloader.

mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use splitfetch_core::config::{self, ResolverKind, TransferBackend};
use std::path::PathBuf;

use commands::{run_checksum, run_completions, run_downloader, run_inspect, run_man, RunOverrides};

/// Top-level CLI for splitfetch.
#[derive(Debug, Parser)]
#[command(name = "splitfetch")]
#[command(about = "Resumable range downloader that spreads one file over many network paths", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

/// `--backend` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Buffered,
    Splice,
}

impl From<BackendArg> for TransferBackend {
    fn from(b: BackendArg) -> Self {
        match b {
            BackendArg::Buffered => TransferBackend::Buffered,
            BackendArg::Splice => TransferBackend::Splice,
        }
    }
}

/// `--resolver` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResolverArg {
    Direct,
    Redirect,
}

impl From<ResolverArg> for ResolverKind {
    fn from(r: ResolverArg) -> Self {
        match r {
            ResolverArg::Direct => ResolverKind::Direct,
            ResolverArg::Redirect => ResolverKind::Redirect,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download every descriptor in the task list over all upstream paths.
    Run {
        /// Task list (one descriptor per line); overrides `tasks_file`.
        #[arg(long, value_name = "FILE")]
        tasks: Option<PathBuf>,
        /// Upstream path list; overrides `upstreams_file`.
        #[arg(long, value_name = "FILE")]
        upstreams: Option<PathBuf>,
        /// Directory for output files; overrides `download_dir`.
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
        /// Body copy backend.
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,
        /// How descriptors become locators.
        #[arg(long, value_enum)]
        resolver: Option<ResolverArg>,
    },

    /// Show the pending ranges recorded in a sidecar file.
    Inspect {
        /// Sidecar (`<file>.ranges`) or the output file it belongs to.
        path: PathBuf,
    },

    /// Compute SHA-256 of a file (e.g. after download).
    Checksum {
        /// Path to the file.
        path: PathBuf,
        /// Fail unless the digest equals this hex value.
        #[arg(long, value_name = "HEX")]
        expect: Option<String>,
    },

    /// Print shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print the man page (roff).
    Man,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Run {
                tasks,
                upstreams,
                dir,
                backend,
                resolver,
            } => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                let overrides = RunOverrides {
                    tasks,
                    upstreams,
                    dir,
                    backend: backend.map(Into::into),
                    resolver: resolver.map(Into::into),
                };
                run_downloader(overrides.apply(cfg)).await?;
            }
            CliCommand::Inspect { path } => run_inspect(&path)?,
            CliCommand::Checksum { path, expect } => run_checksum(&path, expect.as_deref()).await?,
            CliCommand::Completions { shell } => run_completions(shell, &mut Cli::command()),
            CliCommand::Man => run_man(Cli::command())?,
        }

        Ok(())
    }
}
