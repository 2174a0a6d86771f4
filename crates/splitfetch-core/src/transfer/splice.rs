//! Linux zero-copy copier: socket → pipe → file with splice(2).

use super::{BodyCopier, TransferError};
use crate::ledger::Range;
use crate::storage::StorageWriter;
use std::io::{self, BufRead, BufReader};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;
use std::time::Duration;

/// Requested pipe capacity; the kernel may grant less.
const PIPE_SIZE: libc::c_int = 1 << 20;
/// Largest single socket → pipe move.
const MAX_CHUNK: usize = 1 << 20;

/// Moves body bytes kernel-side. Bytes the head parser already buffered are
/// written from userspace first.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpliceCopy;

struct Pipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl Pipe {
    fn new() -> io::Result<Self> {
        let mut fds = [0 as RawFd; 2];
        if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let pipe = unsafe {
            Pipe {
                read: OwnedFd::from_raw_fd(fds[0]),
                write: OwnedFd::from_raw_fd(fds[1]),
            }
        };
        // Best effort; the default 64 KiB pipe still works.
        unsafe { libc::fcntl(pipe.write.as_raw_fd(), libc::F_SETPIPE_SZ, PIPE_SIZE) };
        Ok(pipe)
    }
}

/// Wait until `fd` is readable. `Ok(false)` on timeout.
fn wait_readable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
    loop {
        let r = unsafe { libc::poll(&mut pfd, 1, ms) };
        if r >= 0 {
            return Ok(r > 0);
        }
        let e = io::Error::last_os_error();
        if e.kind() != io::ErrorKind::Interrupted {
            return Err(e);
        }
    }
}

/// Move exactly `len` bytes from the pipe to `file_fd` at `offset`.
fn drain_pipe(pipe: &Pipe, file_fd: RawFd, offset: u64, len: usize) -> io::Result<()> {
    let mut off = offset as libc::loff_t;
    let mut left = len;
    while left > 0 {
        let n = unsafe {
            libc::splice(
                pipe.read.as_raw_fd(),
                ptr::null_mut(),
                file_fd,
                &mut off,
                left,
                libc::SPLICE_F_MOVE,
            )
        };
        if n < 0 {
            let e = io::Error::last_os_error();
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(e);
        }
        if n == 0 {
            return Err(io::Error::from(io::ErrorKind::WriteZero));
        }
        left -= n as usize;
    }
    Ok(())
}

impl BodyCopier for SpliceCopy {
    fn name(&self) -> &'static str {
        "splice"
    }

    fn copy(
        &self,
        reader: &mut BufReader<TcpStream>,
        range: &Range,
        output: &StorageWriter,
        stall: Duration,
    ) -> Result<u64, TransferError> {
        let mut copied = 0u64;

        // Body prefix already pulled in while parsing the head.
        let buffered = reader.buffer();
        if !buffered.is_empty() {
            let cur = range.cur();
            let end = range.end();
            if cur >= end {
                return Ok(0);
            }
            let n = buffered.len().min(usize::try_from(end - cur).unwrap_or(usize::MAX));
            output
                .write_at(cur, &buffered[..n])
                .map_err(TransferError::Storage)?;
            reader.consume(n);
            range.advance(n as u64);
            copied += n as u64;
        }

        let pipe = Pipe::new().map_err(TransferError::Io)?;
        let sock = reader.get_ref().as_raw_fd();
        let file = output.as_raw_fd();
        loop {
            let cur = range.cur();
            let end = range.end();
            if cur >= end {
                return Ok(copied);
            }
            if !wait_readable(sock, stall).map_err(TransferError::Io)? {
                return Err(TransferError::Stalled(stall.as_secs()));
            }
            let want = MAX_CHUNK.min(usize::try_from(end - cur).unwrap_or(usize::MAX));
            let n = unsafe {
                libc::splice(
                    sock,
                    ptr::null_mut(),
                    pipe.write.as_raw_fd(),
                    ptr::null_mut(),
                    want,
                    libc::SPLICE_F_MOVE | libc::SPLICE_F_NONBLOCK,
                )
            };
            if n < 0 {
                let e = io::Error::last_os_error();
                match e.kind() {
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => continue,
                    _ => return Err(TransferError::from_read(e, stall.as_secs())),
                }
            }
            if n == 0 {
                return Err(TransferError::UnexpectedEof { at: cur, end });
            }
            let n = n as usize;
            drain_pipe(&pipe, file, cur, n).map_err(TransferError::Storage)?;
            range.advance(n as u64);
            copied += n as u64;
        }
    }
}
