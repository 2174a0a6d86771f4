//! Classified failure of one lease's transfer.

use crate::ledger::LengthMismatch;
use crate::retry::ErrorKind;
use crate::wire::ParseError;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),
    #[error("network i/o: {0}")]
    Io(#[source] io::Error),
    #[error("no data for {0} seconds")]
    Stalled(u64),
    #[error("connection closed at offset {at}, range ends at {end}")]
    UnexpectedEof { at: u64, end: u64 },
    #[error("bad response head: {0}")]
    Head(#[from] ParseError),
    #[error("proxy refused tunnel: {status} {detail}")]
    Tunnel { status: u16, detail: String },
    #[error("unexpected response: {status} {detail}")]
    Status { status: u16, detail: String },
    #[error("locator expired (full response to a ranged request)")]
    LinkExpired,
    #[error("206 response carries no usable length")]
    MissingLength,
    #[error(transparent)]
    Length(#[from] LengthMismatch),
    #[error("output write failed: {0}")]
    Storage(#[source] io::Error),
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::Connect(_)
            | TransferError::Io(_)
            | TransferError::Stalled(_)
            | TransferError::UnexpectedEof { .. }
            | TransferError::Head(ParseError::Io(_))
            | TransferError::Head(ParseError::Truncated) => ErrorKind::Transport,
            TransferError::Head(_)
            | TransferError::Tunnel { .. }
            | TransferError::Status { .. }
            | TransferError::MissingLength => ErrorKind::Protocol,
            TransferError::LinkExpired => ErrorKind::LinkExpiry,
            TransferError::Length(_) => ErrorKind::Consistency,
            TransferError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Map a socket read failure, recognizing the stall timeout.
    pub(crate) fn from_read(e: io::Error, stall_secs: u64) -> Self {
        match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransferError::Stalled(stall_secs),
            _ => TransferError::Io(e),
        }
    }
}
