//! Cross-thread wake used to interrupt the reader's readiness wait.
//!
//! The channel pairs a stop flag with a non-blocking `eventfd`. The flag is
//! the request itself; the eventfd only makes the request visible to
//! `poll(2)`. Signalling is idempotent and persists until drained; the
//! reader only drains wakes that carry no stop, so a stop stays visible to
//! every waiter.

use std::os::fd::{AsFd, BorrowedFd};
use std::sync::atomic::{AtomicBool, Ordering};

use log::warn;
use nix::errno::Errno;
use nix::sys::eventfd::{EfdFlags, EventFd};

use crate::error::{Result, SerialError};

/// Payload-free stop signal that can sit in a `poll` set.
pub struct CancelChannel {
    event: EventFd,
    requested: AtomicBool,
}

impl CancelChannel {
    /// Creates an unsignalled channel.
    pub fn new() -> Result<Self> {
        let event = EventFd::from_flags(EfdFlags::EFD_NONBLOCK | EfdFlags::EFD_CLOEXEC)
            .map_err(SerialError::Wake)?;
        Ok(CancelChannel {
            event,
            requested: AtomicBool::new(false),
        })
    }

    /// Requests a stop and wakes any waiter. Safe from any thread, any number of times.
    pub fn cancel(&self) {
        self.requested.store(true, Ordering::Release);
        // A saturated counter is already signalled.
        match self.event.write(1) {
            Ok(_) | Err(Errno::EAGAIN) => {}
            Err(e) => warn!("failed to signal wake event: {e}"),
        }
    }

    /// Whether a stop has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Sets the stop flag without waking anyone.
    #[cfg(test)]
    pub(crate) fn request_without_wake(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Consumes every pending wake in one call.
    pub fn drain(&self) {
        loop {
            match self.event.read() {
                Ok(_) | Err(Errno::EINTR) => continue,
                Err(Errno::EAGAIN) => break,
                Err(e) => {
                    warn!("failed to drain wake event: {e}");
                    break;
                }
            }
        }
    }
}

impl AsFd for CancelChannel {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.event.as_fd()
    }
}
