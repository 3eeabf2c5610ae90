//! # Background Reader
//!
//! One thread per open link. It blocks in `poll(2)` on the device and the
//! [`CancelChannel`] with no timeout, forwards every chunk it reads to the
//! [`LinkSink`] in order, and exits either because a stop was requested or
//! because the device failed. Only the latter produces a
//! [`DisconnectReason`].

use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use log::{debug, error};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

use super::cancel::CancelChannel;
use super::config::READ_CHUNK_SIZE;
use super::data::{DisconnectReason, LinkSink};
use super::fd::{Descriptor, Flush};
use crate::error::{Result, SerialError};

/// reader lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderState {
    /// waiting for or forwarding data
    Running,
    /// a stop was observed; nothing more is forwarded
    StopRequested,
    /// terminal
    Stopped,
}

/// Reader loop over borrowed resources. The thread that runs it owns them.
pub struct Reader<'a> {
    device: BorrowedFd<'a>,
    cancel: &'a CancelChannel,
    sink: &'a dyn LinkSink,
    state: ReaderState,
    buffer: Box<[u8]>,
}

impl<'a> Reader<'a> {
    pub fn new(device: BorrowedFd<'a>, cancel: &'a CancelChannel, sink: &'a dyn LinkSink) -> Self {
        Reader {
            device,
            cancel,
            sink,
            state: ReaderState::Running,
            buffer: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Runs until stopped. `Err` means the device failed, not that a stop was requested.
    pub fn run(&mut self) -> std::result::Result<(), DisconnectReason> {
        while self.state != ReaderState::Stopped {
            if let Err(reason) = self.step() {
                self.state = ReaderState::Stopped;
                return Err(reason);
            }
        }
        Ok(())
    }

    fn step(&mut self) -> std::result::Result<(), DisconnectReason> {
        let (device, wake) = {
            let mut fds = [
                PollFd::new(self.device, PollFlags::POLLIN),
                PollFd::new(self.cancel.as_fd(), PollFlags::POLLIN),
            ];
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => {}
                Err(Errno::EINTR) => return Ok(()),
                Err(e) => return Err(DisconnectReason::Poll(e)),
            }
            (
                fds[0].revents().unwrap_or(PollFlags::empty()),
                fds[1].revents().unwrap_or(PollFlags::empty()),
            )
        };

        if wake.contains(PollFlags::POLLIN) {
            // A stop stays signalled for writers waiting on the same event.
            if self.cancel.is_cancelled() {
                self.state = ReaderState::StopRequested;
            } else {
                self.cancel.drain();
            }
        }
        if self.state == ReaderState::StopRequested {
            self.state = ReaderState::Stopped;
            return Ok(());
        }

        if device.contains(PollFlags::POLLNVAL) {
            return Err(DisconnectReason::InvalidDescriptor);
        }
        let failed = device.intersects(PollFlags::POLLHUP | PollFlags::POLLERR);
        if device.contains(PollFlags::POLLIN) {
            // A hung-up tty fails its reads; report the hangup instead.
            if let Err(e) = self.drain_device() {
                if !failed {
                    return Err(DisconnectReason::Read(e));
                }
            }
            if self.state == ReaderState::StopRequested {
                self.state = ReaderState::Stopped;
                return Ok(());
            }
        }
        if device.contains(PollFlags::POLLHUP) {
            return Err(DisconnectReason::Hangup);
        }
        if device.contains(PollFlags::POLLERR) {
            return Err(DisconnectReason::DeviceError);
        }
        Ok(())
    }

    /// Reads until the device has nothing more right now.
    fn drain_device(&mut self) -> std::result::Result<(), Errno> {
        loop {
            if self.cancel.is_cancelled() {
                self.state = ReaderState::StopRequested;
                return Ok(());
            }
            match nix::unistd::read(self.device.as_raw_fd(), &mut self.buffer) {
                Ok(0) | Err(Errno::EAGAIN) => return Ok(()),
                Ok(n) => self.sink.on_data(&self.buffer[..n]),
                Err(Errno::EINTR) => {}
                Err(e) => return Err(e),
            }
        }
    }
}

/// Starts the reader thread for one session.
///
/// On a device failure the thread clears `connected` and then reports the
/// reason to `sink`; on a requested stop it exits silently.
pub fn spawn(
    name: String,
    device: Arc<Descriptor<Flush>>,
    cancel: Arc<CancelChannel>,
    sink: Arc<dyn LinkSink>,
    connected: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(name)
        .spawn(move || {
            let result = Reader::new(device.as_fd(), &cancel, sink.as_ref()).run();
            match result {
                Ok(()) => debug!("serial reader stopped"),
                Err(reason) => {
                    error!("serial reader exited: {reason}");
                    connected.store(false, Ordering::Release);
                    sink.on_disconnect(&reason);
                }
            }
        })
        .map_err(SerialError::Spawn)
}
