//! Full-buffer transmit with a transmit-complete guarantee.

use std::io;
use std::os::fd::{AsFd, BorrowedFd};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::termios;

use super::cancel::CancelChannel;
use crate::error::{Result, SerialError};

/// Hands every byte of `data` to the kernel, then waits until the device has
/// physically sent them.
///
/// The descriptor is non-blocking, so a full output queue is waited out with
/// `poll` rather than treated as an error. A stop signalled on `cancel` ends
/// that wait with an [`io::ErrorKind::ConnectionAborted`] error. On failure some
/// prefix of `data` may already be on the wire.
pub fn write_all(fd: BorrowedFd<'_>, data: &[u8], cancel: Option<&CancelChannel>) -> Result<usize> {
    let written = transmit(
        data,
        |chunk| nix::unistd::write(fd, chunk),
        || wait_writable(fd, cancel),
    )?;

    loop {
        match termios::tcdrain(fd) {
            Ok(()) => break,
            Err(Errno::EINTR) => {}
            Err(e) => return Err(SerialError::io(e)),
        }
    }
    Ok(written)
}

fn transmit(
    data: &[u8],
    mut write: impl FnMut(&[u8]) -> nix::Result<usize>,
    mut wait: impl FnMut() -> Result<()>,
) -> Result<usize> {
    let mut written = 0;
    while written < data.len() {
        match write(&data[written..]) {
            Ok(0) => {
                return Err(SerialError::Io(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "device accepted no bytes",
                )));
            }
            Ok(n) => written += n,
            Err(Errno::EINTR) => {}
            Err(Errno::EAGAIN) => wait()?,
            Err(e) => return Err(SerialError::io(e)),
        }
    }
    Ok(written)
}

fn wait_writable(fd: BorrowedFd<'_>, cancel: Option<&CancelChannel>) -> Result<()> {
    let Some(cancel) = cancel else {
        return wait_ready(&mut [PollFd::new(fd, PollFlags::POLLOUT)]);
    };
    if !cancel.is_cancelled() {
        wait_ready(&mut [
            PollFd::new(fd, PollFlags::POLLOUT),
            PollFd::new(cancel.as_fd(), PollFlags::POLLIN),
        ])?;
    }
    // A stop leaves the wake event signalled, so this cannot be missed.
    if cancel.is_cancelled() {
        return Err(SerialError::Io(io::Error::new(
            io::ErrorKind::ConnectionAborted,
            "link closed during write",
        )));
    }
    Ok(())
}

fn wait_ready(fds: &mut [PollFd<'_>]) -> Result<()> {
    match poll(fds, PollTimeout::NONE) {
        Ok(_) | Err(Errno::EINTR) => {}
        Err(e) => return Err(SerialError::Poll(e)),
    }
    // Hangup or error shows up as a write error on the next attempt.
    Ok(())
}
