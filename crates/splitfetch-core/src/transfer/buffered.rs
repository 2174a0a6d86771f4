use super::{BodyCopier, TransferError};
use crate::ledger::Range;
use crate::storage::StorageWriter;
use std::io::{BufRead, BufReader};
use std::net::TcpStream;
use std::time::Duration;

/// Portable copier: read into userspace through the response reader, then
/// write at the range's offset.
#[derive(Debug, Default, Clone, Copy)]
pub struct BufferedCopy;

impl BodyCopier for BufferedCopy {
    fn name(&self) -> &'static str {
        "buffered"
    }

    fn copy(
        &self,
        reader: &mut BufReader<TcpStream>,
        range: &Range,
        output: &StorageWriter,
        stall: Duration,
    ) -> Result<u64, TransferError> {
        let mut copied = 0u64;
        loop {
            // `end` may move while we stream; re-read it every round.
            let cur = range.cur();
            let end = range.end();
            if cur >= end {
                return Ok(copied);
            }
            let chunk = match reader.fill_buf() {
                Ok(c) => c,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransferError::from_read(e, stall.as_secs())),
            };
            if chunk.is_empty() {
                return Err(TransferError::UnexpectedEof { at: cur, end });
            }
            let n = chunk.len().min(usize::try_from(end - cur).unwrap_or(usize::MAX));
            output
                .write_at(cur, &chunk[..n])
                .map_err(TransferError::Storage)?;
            reader.consume(n);
            range.advance(n as u64);
            copied += n as u64;
        }
    }
}
