use super::{BodyCopier, TransferError};
use crate::ledger::{LengthUpdate, Range, RangeLedger};
use crate::storage::StorageWriter;
use crate::upstream::Upstream;
use crate::wire::{read_response_head, RequestTemplate};
use std::io::BufReader;
use std::time::Duration;

const READ_BUFFER: usize = 64 * 1024;

/// Connection-level timeouts of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    /// Longest wait for any single read.
    pub stall: Duration,
}

/// Fetch the leased `range` through `upstream`, writing into `output`.
///
/// Returns the number of body bytes written. A `200` answer means the
/// locator expired and is reported as [`TransferError::LinkExpired`]; the
/// caller owns re-resolution. The first `206` that reveals the resource
/// length establishes it in the ledger and pre-sizes the output.
pub fn run_lease(
    upstream: &Upstream,
    template: &RequestTemplate,
    range: &Range,
    ledger: &RangeLedger,
    output: &StorageWriter,
    copier: &dyn BodyCopier,
    timeouts: Timeouts,
) -> Result<u64, TransferError> {
    let offset = range.cur();
    if offset >= range.end() {
        return Ok(0);
    }

    let stream = upstream
        .connect(template.target(), timeouts.connect)
        .map_err(TransferError::Connect)?;
    stream
        .set_read_timeout(Some(timeouts.stall))
        .map_err(TransferError::Io)?;
    stream
        .set_write_timeout(Some(timeouts.stall))
        .map_err(TransferError::Io)?;
    let mut reader = BufReader::with_capacity(READ_BUFFER, stream);

    if upstream.is_tunnel() {
        template
            .write_connect(reader.get_mut())
            .map_err(TransferError::Io)?;
        let head = read_response_head(&mut reader)?;
        if head.status != 200 {
            return Err(TransferError::Tunnel {
                status: head.status,
                detail: head.detail().to_string(),
            });
        }
    }

    template
        .write_request(reader.get_mut(), offset)
        .map_err(TransferError::Io)?;
    let head = read_response_head(&mut reader)?;
    match head.status {
        206 => {}
        200 => return Err(TransferError::LinkExpired),
        status => {
            return Err(TransferError::Status {
                status,
                detail: head.detail().to_string(),
            })
        }
    }

    let total = head.total_length(offset).ok_or(TransferError::MissingLength)?;
    if ledger.set_length(total)? == LengthUpdate::Adopted {
        tracing::info!(length = total, "resource length established");
        output.preallocate(total).map_err(TransferError::Storage)?;
    }

    range.mark_receiving();
    tracing::trace!(upstream = %upstream, cur = offset, end = range.end(), "receiving");
    copier.copy(&mut reader, range, output, timeouts.stall)
}
