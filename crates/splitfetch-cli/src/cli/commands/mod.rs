//! CLI command handlers, one file per command.

mod checksum;
mod completions;
mod inspect;
mod man;
mod run;

pub use checksum::run_checksum;
pub use completions::run_completions;
pub use inspect::run_inspect;
pub use man::run_man;
pub use run::{run_downloader, RunOverrides};
