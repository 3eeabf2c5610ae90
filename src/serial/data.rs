//! Inbound delivery from the background reader to the consumer.

use log::debug;
use nix::errno::Errno;
use thiserror::Error;
use tokio::sync::mpsc;

/// Why a background reader stopped on its own.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The device hung up.
    #[error("device hung up")]
    Hangup,
    /// The device reported an error condition.
    #[error("device reported an error condition")]
    DeviceError,
    /// The descriptor is not open.
    #[error("device descriptor is not open")]
    InvalidDescriptor,
    /// A read failed.
    #[error("read failed: {0}")]
    Read(Errno),
    /// The readiness wait failed.
    #[error("poll failed: {0}")]
    Poll(Errno),
}

/// serial link data, used to communicate with different threads
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// bytes read from the device, in arrival order
    Data(Vec<u8>),
    /// the reader exited without being asked to; no further events follow
    Disconnected(DisconnectReason),
}

/// Receiver of everything a background reader produces.
///
/// Both methods run on the reader thread and must not block for long, or
/// they delay `close()`.
#[cfg_attr(test, mockall::automock)]
pub trait LinkSink: Send + Sync + 'static {
    /// One chunk of received bytes.
    fn on_data(&self, chunk: &[u8]);

    /// Terminal status; called at most once per session.
    fn on_disconnect(&self, reason: &DisconnectReason);
}

impl LinkSink for mpsc::UnboundedSender<LinkEvent> {
    fn on_data(&self, chunk: &[u8]) {
        if self.send(LinkEvent::Data(chunk.to_vec())).is_err() {
            debug!("link event receiver dropped, discarding {} bytes", chunk.len());
        }
    }

    fn on_disconnect(&self, reason: &DisconnectReason) {
        if self.send(LinkEvent::Disconnected(*reason)).is_err() {
            debug!("link event receiver dropped, discarding disconnect: {reason}");
        }
    }
}
