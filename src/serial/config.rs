//! # Device Configuration
//!
//! Opens a character device and puts it into raw 8N1 mode with no flow
//! control. Any failure releases the partially configured descriptor before
//! the error reaches the caller.

use std::fs::OpenOptions;
use std::os::fd::OwnedFd;
use std::os::unix::fs::OpenOptionsExt;

use log::debug;
use nix::fcntl::OFlag;
use nix::sys::termios::{
    self, BaudRate, ControlFlags, FlushArg, InputFlags, SetArg, SpecialCharacterIndices, Termios,
};

use super::baud;
use super::fd::{Descriptor, Flush, Plain};
use crate::error::{ConfigOp, Result, SerialError};

/// Size of each read issued by the background reader.
pub const READ_CHUNK_SIZE: usize = 4096;

/// serial link settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkSettings {
    pub port_name: String,
    pub baud_rate: u32,
}

impl LinkSettings {
    /// settings for `port_name` at `baud_rate`
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        LinkSettings {
            port_name: port_name.into(),
            baud_rate,
        }
    }

    /// Rejects settings that can never open, without touching the device.
    pub fn validate(&self) -> Result<()> {
        if self.port_name.is_empty() {
            return Err(SerialError::open(
                "",
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty device path"),
            ));
        }
        if !baud::is_supported(self.baud_rate) {
            return Err(SerialError::UnsupportedBaudRate(self.baud_rate));
        }
        Ok(())
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        LinkSettings {
            port_name: String::new(),
            baud_rate: 115200,
        }
    }
}

/// Opens `path` and applies raw mode at `baud`.
///
/// The device is opened read-write, non-blocking, close-on-exec and without
/// becoming the controlling terminal. Both queues are flushed right before
/// the new attributes are committed.
pub fn configure(path: &str, baud: u32) -> Result<Descriptor<Flush>> {
    let speed = baud::resolve(baud)?;

    // std always adds O_CLOEXEC.
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags((OFlag::O_NOCTTY | OFlag::O_NONBLOCK).bits())
        .open(path)
        .map_err(|e| SerialError::open(path, e))?;
    let device: Descriptor<Plain> = Descriptor::new(OwnedFd::from(file));

    let mut tio = termios::tcgetattr(&device).map_err(|e| SerialError::config(ConfigOp::Get, e))?;
    make_raw(&mut tio, speed)?;

    termios::tcflush(&device, FlushArg::TCIOFLUSH)
        .map_err(|e| SerialError::config(ConfigOp::Flush, e))?;
    termios::tcsetattr(&device, SetArg::TCSANOW, &tio)
        .map_err(|e| SerialError::config(ConfigOp::Set, e))?;

    debug!("configured {path} at {baud} baud");
    Ok(device.into_policy())
}

/// Raw mode, 8 data bits, no parity, 1 stop bit, receiver on, modem lines
/// ignored, no hardware or software flow control, non-blocking reads.
fn make_raw(tio: &mut Termios, speed: BaudRate) -> Result<()> {
    termios::cfmakeraw(tio);

    tio.control_flags |= ControlFlags::CLOCAL | ControlFlags::CREAD;
    tio.control_flags &= !ControlFlags::CSIZE;
    tio.control_flags |= ControlFlags::CS8;
    tio.control_flags &= !(ControlFlags::PARENB | ControlFlags::PARODD | ControlFlags::CSTOPB);
    tio.control_flags &= !ControlFlags::CRTSCTS;
    tio.input_flags &= !(InputFlags::IXON | InputFlags::IXOFF | InputFlags::IXANY);

    tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    tio.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;

    termios::cfsetispeed(tio, speed).map_err(|e| SerialError::config(ConfigOp::Set, e))?;
    termios::cfsetospeed(tio, speed).map_err(|e| SerialError::config(ConfigOp::Set, e))?;
    Ok(())
}
