//! # Polling Device
//!
//! [`SerialDevice`] is the synchronous counterpart of
//! [`SerialLink`](super::SerialLink): no background thread, the caller pulls
//! bytes with [`read_some`](SerialDevice::read_some). `read_some` parks the
//! calling thread for up to its timeout, so a UI loop should pass
//! `Some(Duration::ZERO)` once per frame.

use std::os::fd::{AsFd, AsRawFd};
use std::time::{Duration, Instant};

use log::info;
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

use super::config;
use super::fd::{Descriptor, Flush};
use super::write;
use crate::error::{Result, SerialError};

/// serial device read by polling
#[derive(Debug, Default)]
pub struct SerialDevice {
    device: Option<Descriptor<Flush>>,
}

impl SerialDevice {
    /// closed device
    pub fn new() -> Self {
        SerialDevice::default()
    }

    /// Opens `path` at `baud`, closing any previous device first.
    pub fn open(&mut self, path: &str, baud: u32) -> Result<()> {
        self.close();
        self.device = Some(config::configure(path, baud)?);
        info!("opened serial device {path} at {baud} baud");
        Ok(())
    }

    /// Flushes and closes the device. Does nothing when closed.
    pub fn close(&mut self) {
        if let Some(device) = self.device.take() {
            device.release();
        }
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Transmits all of `data` and waits until it has left the device.
    pub fn write_all(&mut self, data: &[u8]) -> Result<usize> {
        let device = self.device.as_ref().ok_or(SerialError::NotOpen)?;
        write::write_all(device.as_fd(), data, None)
    }

    /// Reads whatever is available into `buf`, waiting up to `timeout`.
    ///
    /// `None` waits indefinitely and `Some(Duration::ZERO)` only polls.
    /// Returns 0 when the wait timed out or the device had nothing to give.
    pub fn read_some(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize> {
        let device = self.device.as_ref().ok_or(SerialError::NotOpen)?;
        if buf.is_empty() {
            return Ok(0);
        }
        if !wait_readable(device, timeout)? {
            return Ok(0);
        }
        loop {
            match nix::unistd::read(device.as_raw_fd(), buf) {
                Ok(n) => return Ok(n),
                Err(Errno::EAGAIN) => return Ok(0),
                Err(Errno::EINTR) => {}
                Err(e) => return Err(SerialError::io(e)),
            }
        }
    }
}

/// Waits for input; `false` on timeout. Long timeouts are split into
/// slices `poll` can express.
fn wait_readable(device: &Descriptor<Flush>, timeout: Option<Duration>) -> Result<bool> {
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        let slice = match deadline {
            None => PollTimeout::NONE,
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let ms = remaining.as_nanos().div_ceil(1_000_000);
                PollTimeout::from(u16::try_from(ms).unwrap_or(u16::MAX))
            }
        };

        let mut fds = [PollFd::new(device.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, slice) {
            Ok(0) => {}
            // Hangup and error are reported by the read that follows.
            Ok(_) => return Ok(true),
            Err(Errno::EINTR) => {}
            Err(e) => return Err(SerialError::Poll(e)),
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Ok(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::test_support::PtyPair;
    use std::thread;

    #[test]
    fn test_closed_device_rejects_io() {
        let mut device = SerialDevice::new();
        let mut buf = [0u8; 8];
        assert!(!device.is_open());
        assert!(matches!(device.write_all(b"x"), Err(SerialError::NotOpen)));
        assert!(matches!(
            device.read_some(&mut buf, Some(Duration::ZERO)),
            Err(SerialError::NotOpen)
        ));
    }

    #[test]
    fn test_zero_timeout_polls() {
        let pty = PtyPair::new();
        let mut device = SerialDevice::new();
        device.open(&pty.path, 115200).unwrap();

        let mut buf = [0u8; 16];
        let start = Instant::now();
        assert_eq!(device.read_some(&mut buf, Some(Duration::ZERO)).unwrap(), 0);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_bounded_timeout_elapses() {
        let pty = PtyPair::new();
        let mut device = SerialDevice::new();
        device.open(&pty.path, 115200).unwrap();

        let mut buf = [0u8; 16];
        let start = Instant::now();
        assert_eq!(
            device.read_some(&mut buf, Some(Duration::from_millis(50))).unwrap(),
            0
        );
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_read_some_returns_available_bytes() {
        let pty = PtyPair::new();
        let mut device = SerialDevice::new();
        device.open(&pty.path, 115200).unwrap();

        pty.send(b"abcdef");
        let mut buf = [0u8; 4];
        let mut got = Vec::new();
        while got.len() < 6 {
            let n = device
                .read_some(&mut buf, Some(Duration::from_secs(5)))
                .unwrap();
            assert!(n > 0 && n <= buf.len());
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, b"abcdef");
    }

    #[test]
    fn test_indefinite_wait_wakes_on_data() {
        let pty = PtyPair::new();
        let mut device = SerialDevice::new();
        device.open(&pty.path, 115200).unwrap();

        let mut buf = [0u8; 16];
        let n = thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(30));
                pty.send(b"late");
            });
            device.read_some(&mut buf, None).unwrap()
        });
        assert!(n > 0);
        assert_eq!(&buf[..n], &b"late"[..n]);
    }

    #[test]
    fn test_write_and_reopen() {
        let pty = PtyPair::new();
        let mut device = SerialDevice::new();
        device.open(&pty.path, 9600).unwrap();
        assert_eq!(device.write_all(b"hi").unwrap(), 2);
        assert_eq!(pty.recv(2, Duration::from_secs(5)), b"hi");

        device.open(&pty.path, 19200).unwrap();
        assert!(device.is_open());
        device.close();
        device.close();
        assert!(!device.is_open());
        assert!(pty.slave_closed(Duration::from_secs(5)));
    }
}
