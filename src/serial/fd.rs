//! Single-owner wrapper around an OS descriptor.
//!
//! A [`Descriptor`] is move-only and closes its descriptor exactly once, either
//! when dropped or when [`Descriptor::release`] consumes it. The release
//! policy decides what happens to the device right before the close; the
//! [`Flush`] policy discards both termios queues so leftover bytes from one
//! session never reach the next.

use std::marker::PhantomData;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

use log::warn;
use nix::sys::termios::{self, FlushArg};

/// Action run on the descriptor immediately before it is closed.
pub trait ReleasePolicy {
    fn before_release(fd: BorrowedFd<'_>);
}

/// Close without touching the device.
#[derive(Debug)]
pub enum Plain {}

impl ReleasePolicy for Plain {
    fn before_release(_fd: BorrowedFd<'_>) {}
}

/// Discard queued input and output, then close.
#[derive(Debug)]
pub enum Flush {}

impl ReleasePolicy for Flush {
    fn before_release(fd: BorrowedFd<'_>) {
        if let Err(e) = termios::tcflush(fd, FlushArg::TCIOFLUSH) {
            warn!("tcflush before close failed: {e}");
        }
    }
}

/// Owned OS descriptor with a release policy.
#[derive(Debug)]
pub struct Descriptor<P: ReleasePolicy = Plain> {
    // Only `None` while `self` is being consumed.
    fd: Option<OwnedFd>,
    _policy: PhantomData<fn() -> P>,
}

impl<P: ReleasePolicy> Descriptor<P> {
    /// Takes ownership of `fd`.
    pub fn new(fd: OwnedFd) -> Self {
        Descriptor {
            fd: Some(fd),
            _policy: PhantomData,
        }
    }

    /// Runs the release policy and closes the descriptor now.
    pub fn release(self) {
        drop(self);
    }

    /// Re-types the guard so a different policy runs on release.
    pub fn into_policy<Q: ReleasePolicy>(mut self) -> Descriptor<Q> {
        Descriptor {
            fd: self.fd.take(),
            _policy: PhantomData,
        }
    }
}

impl<P: ReleasePolicy> AsFd for Descriptor<P> {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match &self.fd {
            Some(fd) => fd.as_fd(),
            None => unreachable!("descriptor used after release"),
        }
    }
}

impl<P: ReleasePolicy> AsRawFd for Descriptor<P> {
    fn as_raw_fd(&self) -> RawFd {
        self.as_fd().as_raw_fd()
    }
}

impl<P: ReleasePolicy> Drop for Descriptor<P> {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            P::before_release(fd.as_fd());
            drop(fd);
        }
    }
}
