//! Transfer engine: one leased range over one upstream path.
//!
//! A transfer connects, optionally tunnels through a proxy, sends an
//! open-ended ranged `GET`, validates the response head against the ledger's
//! length, and streams the body into the output file at the range's offset
//! until the range is finished. Body copying is pluggable so the Linux
//! zero-copy path and the portable buffered path share everything else.

mod buffered;
mod engine;
mod error;
#[cfg(target_os = "linux")]
mod splice;

pub use buffered::BufferedCopy;
pub use engine::{run_lease, Timeouts};
pub use error::TransferError;
#[cfg(target_os = "linux")]
pub use splice::SpliceCopy;

use crate::config::TransferBackend;
use crate::ledger::Range;
use crate::storage::StorageWriter;
use std::io::BufReader;
use std::net::TcpStream;
use std::time::Duration;

/// Streams response body bytes into the output file.
///
/// Implementations write at `range.cur()`, advance the range after every
/// write, and stop once `cur >= end`. `end` may change concurrently.
pub trait BodyCopier: Send + Sync {
    fn name(&self) -> &'static str;

    fn copy(
        &self,
        reader: &mut BufReader<TcpStream>,
        range: &Range,
        output: &StorageWriter,
        stall: Duration,
    ) -> Result<u64, TransferError>;
}

/// Copier for the configured backend.
pub fn copier_for(backend: TransferBackend) -> Box<dyn BodyCopier> {
    match backend {
        TransferBackend::Buffered => Box::new(BufferedCopy),
        #[cfg(target_os = "linux")]
        TransferBackend::Splice => Box::new(SpliceCopy),
        #[cfg(not(target_os = "linux"))]
        TransferBackend::Splice => {
            tracing::warn!("splice backend needs Linux, using buffered copies");
            Box::new(BufferedCopy)
        }
    }
}

#[cfg(test)]
mod tests;
