//! # Error Module
//!
//! This module provides the error types for the `serial_link` crate.
//! It uses the `thiserror` crate for ergonomic error handling.
//!
//! Only synchronous failures live here. Failures observed by the background
//! reader after a link is open are delivered to the consumer as
//! [`DisconnectReason`](crate::serial::data::DisconnectReason) instead.

use std::fmt;
use std::io;

use nix::errno::Errno;
use thiserror::Error;

/// Result type alias for `serial_link` operations.
pub type Result<T> = std::result::Result<T, SerialError>;

/// Line attribute operation that failed while configuring a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigOp {
    /// Reading the current attributes.
    Get,
    /// Applying new attributes or line speeds.
    Set,
    /// Discarding queued input and output.
    Flush,
}

impl fmt::Display for ConfigOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigOp::Get => write!(f, "get"),
            ConfigOp::Set => write!(f, "set"),
            ConfigOp::Flush => write!(f, "flush"),
        }
    }
}

/// Main error type for serial link operations.
#[derive(Debug, Error)]
pub enum SerialError {
    /// The device path could not be opened.
    #[error("Failed to open serial device '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Querying, applying or flushing line attributes failed.
    #[error("Failed to {op} line attributes: {source}")]
    Config {
        op: ConfigOp,
        #[source]
        source: Errno,
    },

    /// The requested bit rate has no line-speed code on this platform.
    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    /// A write, drain or read failed for a reason other than would-block or interruption.
    #[error("Serial I/O error: {0}")]
    Io(#[from] io::Error),

    /// The readiness wait itself failed.
    #[error("Failed to wait for device readiness: {0}")]
    Poll(#[source] Errno),

    /// The wake event used to interrupt the reader could not be created.
    #[error("Failed to create wake event: {0}")]
    Wake(#[source] Errno),

    /// The background reader thread could not be started.
    #[error("Failed to spawn reader thread: {0}")]
    Spawn(#[source] io::Error),

    /// The link is closed.
    #[error("Serial link is not open")]
    NotOpen,
}

impl SerialError {
    /// Creates a new open error.
    #[must_use]
    pub fn open(path: impl Into<String>, source: io::Error) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn config(op: ConfigOp, source: Errno) -> Self {
        Self::Config { op, source }
    }

    /// Creates an I/O error from a raw errno.
    #[must_use]
    pub fn io(errno: Errno) -> Self {
        Self::Io(io::Error::from(errno))
    }
}
